//! Idempotent schema bootstrap, run at start-up.

use sqlx::PgPool;
use tracing::info;

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

/// Names of the partial unique indexes over active rows. The in-memory
/// backend reports the same names so conflicts map identically.
pub mod index {
    pub const MODULE_NAME: &str = "usr_modules_name_active_key";
    pub const FEATURE_NAME: &str = "usr_features_name_active_key";
    pub const ROLE_NAME: &str = "usr_roles_name_active_key";
    pub const USER_EMAIL: &str = "usr_users_email_active_key";
    pub const USER_USERNAME: &str = "usr_users_username_active_key";
    pub const VEHICLE_TYPE_NAME: &str = "vehicle_types_name_active_key";
    pub const VEHICLE_POLICE_NUMBER: &str = "vehicles_police_number_active_key";
}

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS usr_modules (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        parent_id BIGINT REFERENCES usr_modules(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usr_features (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        module_id BIGINT NOT NULL REFERENCES usr_modules(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usr_roles (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        is_administrative BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usr_role_features (
        role_id BIGINT NOT NULL REFERENCES usr_roles(id),
        feature_id BIGINT NOT NULL REFERENCES usr_features(id),
        PRIMARY KEY (role_id, feature_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usr_users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role_id BIGINT NOT NULL REFERENCES usr_roles(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vehicle_types (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        id BIGSERIAL PRIMARY KEY,
        type_id BIGINT NOT NULL REFERENCES vehicle_types(id),
        name TEXT NOT NULL,
        police_number TEXT NOT NULL,
        is_available BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loans (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES usr_users(id),
        vehicle_id BIGINT NOT NULL REFERENCES vehicles(id),
        purpose TEXT NOT NULL,
        return_time TIMESTAMPTZ,
        returned_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS usr_modules_parent_idx ON usr_modules (parent_id)",
    "CREATE INDEX IF NOT EXISTS usr_features_module_idx ON usr_features (module_id)",
    "CREATE INDEX IF NOT EXISTS usr_users_role_idx ON usr_users (role_id)",
    "CREATE INDEX IF NOT EXISTS vehicles_type_idx ON vehicles (type_id)",
    "CREATE INDEX IF NOT EXISTS loans_vehicle_idx ON loans (vehicle_id)",
];

fn unique_indexes() -> [(&'static str, &'static str, &'static str); 7] {
    [
        (index::MODULE_NAME, "usr_modules", "name"),
        (index::FEATURE_NAME, "usr_features", "name"),
        (index::ROLE_NAME, "usr_roles", "name"),
        (index::USER_EMAIL, "usr_users", "email"),
        (index::USER_USERNAME, "usr_users", "username"),
        (index::VEHICLE_TYPE_NAME, "vehicle_types", "name"),
        (index::VEHICLE_POLICE_NUMBER, "vehicles", "police_number"),
    ]
}

/// Create tables and indexes if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }

    for (name, table, column) in unique_indexes() {
        let statement = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table} ({column}) \
             WHERE deleted_at IS NULL"
        );
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }

    info!(tables = 8, "schema ready");
    Ok(())
}
