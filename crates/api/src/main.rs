use std::net::SocketAddr;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use eproc_api::app::{HttpSettings, build_app, load_env_file};
use eproc_infra::seed::{AdminSeed, seed};
use eproc_infra::{AppConfig, Stores, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_file(".env")?;
    eproc_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_with(
            config
                .database
                .connect_options()
                .context("invalid database configuration")?,
        )
        .await
        .context("failed to connect to the database")?;

    schema::ensure_schema(&pool)
        .await
        .context("schema bootstrap failed")?;

    let stores = Stores::postgres(pool);
    seed(
        &stores,
        &AdminSeed {
            email: config.admin_email.clone(),
            password: config.admin_password.clone(),
        },
    )
    .await
    .context("seeding failed")?;

    let app = build_app(&HttpSettings::from(&config), stores);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
