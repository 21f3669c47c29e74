//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services/`: input rules and storage orchestration per resource
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: request bodies and response payloads
//! - `errors.rs`: the response envelope and error mapping

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use eproc_auth::{Hs256JwtValidator, TokenIssuer};
use eproc_infra::{AppConfig, Stores};

use crate::context::RequestId;
use crate::middleware::{self, X_REQUEST_ID};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// The part of the configuration the HTTP layer needs.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub frontend_urls: Vec<String>,
    pub cors_max_age_hours: u64,
}

impl From<&AppConfig> for HttpSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_ttl_hours: config.jwt_ttl_hours,
            frontend_urls: config.frontend_urls.clone(),
            cors_max_age_hours: config.cors_max_age_hours,
        }
    }
}

/// Load the `.env` file at `path` into the process environment.
///
/// A missing or unreadable file is a start-up error.
pub fn load_env_file(path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    dotenv::from_path(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(settings: &HttpSettings, stores: Stores) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(settings.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let tokens = TokenIssuer::new(settings.jwt_secret.as_bytes(), settings.jwt_ttl_hours);
    let services = Arc::new(services::AppServices::new(stores, tokens));

    // Protected routes: require a verified bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.as_str().to_owned())
            .unwrap_or_default();
        tracing::info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/login", post(routes::auth::login))
        .merge(protected)
        .fallback(routes::system::not_found)
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer(settings))
                .layer(axum::middleware::from_fn(middleware::request_id))
                .layer(trace)
                .layer(CatchPanicLayer::custom(middleware::handle_panic)),
        )
}

fn cors_layer(settings: &HttpSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .frontend_urls
        .iter()
        .filter_map(|url| match HeaderValue::from_str(url) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %url, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            X_REQUEST_ID.clone(),
        ])
        .expose_headers([X_REQUEST_ID.clone()])
        .allow_credentials(true)
        .max_age(Duration::from_secs(settings.cors_max_age_hours * 3600))
}
