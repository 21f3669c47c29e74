//! Process configuration, read once from the environment at start-up.

use std::str::FromStr;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_JWT_HOURS: i64 = 24;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_CORS_MAX_AGE_HOURS: u64 = 6;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Url(String),
    Parts {
        host: String,
        port: u16,
        username: String,
        password: String,
        database: String,
    },
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            Self::Url(url) => PgConnectOptions::from_str(url).map_err(|e| ConfigError::Invalid {
                name: "DATABASE_URL",
                reason: e.to_string(),
            }),
            Self::Parts {
                host,
                port,
                username,
                password,
                database,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(username)
                .password(password)
                .database(database)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub db_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    /// Token lifetime in hours; always positive.
    pub jwt_ttl_hours: i64,
    pub frontend_urls: Vec<String>,
    pub cors_max_age_hours: u64,
    pub admin_email: String,
    /// Admin user seeding is skipped when unset.
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => DatabaseConfig::Parts {
                host: get("DB_HOST").ok_or(ConfigError::Missing("DATABASE_URL or DB_HOST"))?,
                port: match get("DB_PORT") {
                    Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                        name: "DB_PORT",
                        reason: format!("{raw:?} is not a port number"),
                    })?,
                    None => 5432,
                },
                username: get("DB_USERNAME").ok_or(ConfigError::Missing("DB_USERNAME"))?,
                password: get("DB_PASSWORD").unwrap_or_default(),
                database: get("DB_NAME").ok_or(ConfigError::Missing("DB_NAME"))?,
            },
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("{raw:?} is not a port number"),
            })?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt_ttl_hours = get("JWT_TIME")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_JWT_HOURS);

        let frontend_urls = get("FRONTEND_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|urls| !urls.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_FRONTEND_URL.to_string()]);

        let cors_max_age_hours = get("CORS_MAX_AGE")
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CORS_MAX_AGE_HOURS);

        let db_max_connections = get("DB_MAX_CONNECTIONS")
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

        Ok(Self {
            database,
            db_max_connections,
            port,
            jwt_secret,
            jwt_ttl_hours,
            frontend_urls,
            cors_max_age_hours,
            admin_email: get("ADMIN_EMAIL").unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
            admin_password: get("ADMIN_PASSWORD"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn minimal_env_uses_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u:p@localhost/eproc"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.jwt_ttl_hours, 24);
        assert_eq!(cfg.frontend_urls, vec!["http://localhost:3000".to_string()]);
        assert_eq!(cfg.cors_max_age_hours, 6);
        assert_eq!(cfg.admin_email, "admin@example.com");
        assert_eq!(cfg.admin_password, None);
        assert_eq!(cfg.db_max_connections, 10);
        assert!(cfg.database.connect_options().is_ok());
    }

    #[test]
    fn jwt_secret_is_required() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eproc"),
            ("JWT_SECRET", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn bad_jwt_time_falls_back() {
        for raw in ["0", "-3", "soon"] {
            let cfg = AppConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/eproc"),
                ("JWT_SECRET", "k"),
                ("JWT_TIME", raw),
            ]))
            .unwrap();
            assert_eq!(cfg.jwt_ttl_hours, 24, "JWT_TIME={raw}");
        }
    }

    #[test]
    fn database_from_parts() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DB_HOST", "db"),
            ("DB_PORT", "6543"),
            ("DB_USERNAME", "eproc"),
            ("DB_PASSWORD", "pw"),
            ("DB_NAME", "eproc"),
            ("JWT_SECRET", "k"),
            ("FRONTEND_URLS", "http://a.test, http://b.test,"),
        ]))
        .unwrap();

        assert!(matches!(cfg.database, DatabaseConfig::Parts { port: 6543, .. }));
        assert_eq!(cfg.frontend_urls, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn no_database_settings_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eproc"),
            ("JWT_SECRET", "k"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
