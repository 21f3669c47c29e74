//! Postgres-backed stores (sqlx).
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (unique violation) | `23505` | `Conflict(<index name>)` |
//! | anything else | * | `Storage` |
//!
//! Sort columns come from the per-record whitelists, so the `ORDER BY` body is
//! interpolated; every value is bound.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use eproc_core::{
    FeatureId, ListQuery, LoanId, ModuleId, RoleId, UserId, VehicleId, VehicleTypeId,
};

use super::StoreError;
use super::records::*;

mod access;
mod fleet;

/// One handle implementing every storage trait over a shared pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let index = db_err.constraint().unwrap_or("unique").to_string();
                return StoreError::Conflict(index);
            }
            StoreError::Storage(format!(
                "database error in {}: {}",
                operation,
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed during {}", operation))
        }
        other => StoreError::Storage(format!("error in {}: {}", operation, other)),
    }
}

/// `LIMIT`/`OFFSET` binds; `NULL` means no limit and no offset.
fn window(query: &ListQuery) -> (Option<i64>, Option<i64>) {
    match query.page {
        Some(page) => (
            Some(i64::from(page.limit())),
            Some(i64::try_from(page.offset()).unwrap_or(i64::MAX)),
        ),
        None => (None, None),
    }
}

fn total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

const MODULE_COLUMNS: &str = "id, name, parent_id, created_at, updated_at";

impl<'r> sqlx::FromRow<'r, PgRow> for ModuleRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ModuleRecord {
            id: ModuleId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(ModuleId::new),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const FEATURE_COLUMNS: &str = "id, name, module_id, created_at, updated_at";

impl<'r> sqlx::FromRow<'r, PgRow> for FeatureRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(FeatureRecord {
            id: FeatureId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            module_id: ModuleId::new(row.try_get("module_id")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const ROLE_COLUMNS: &str = "id, name, is_administrative, created_at, updated_at";

impl<'r> sqlx::FromRow<'r, PgRow> for RoleRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRecord {
            id: RoleId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            is_administrative: row.try_get("is_administrative")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Users joined with their role name; `u` is the users relation.
const USER_SELECT: &str = "SELECT u.id, u.username, u.name, u.email, u.password_hash, u.role_id, \
     r.name AS role_name, u.created_at, u.updated_at \
     FROM usr_users u JOIN usr_roles r ON r.id = u.role_id";

impl<'r> sqlx::FromRow<'r, PgRow> for UserRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRecord {
            id: UserId::new(row.try_get("id")?),
            username: row.try_get("username")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role_id: RoleId::new(row.try_get("role_id")?),
            role_name: row.try_get("role_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const VEHICLE_TYPE_COLUMNS: &str = "id, name, created_at, updated_at";

impl<'r> sqlx::FromRow<'r, PgRow> for VehicleTypeRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(VehicleTypeRecord {
            id: VehicleTypeId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Vehicles joined with their type name; `v` is the vehicles relation.
const VEHICLE_SELECT: &str = "SELECT v.id, v.type_id, t.name AS type_name, v.name, v.police_number, \
     v.is_available, v.created_at, v.updated_at \
     FROM vehicles v JOIN vehicle_types t ON t.id = v.type_id";

impl<'r> sqlx::FromRow<'r, PgRow> for VehicleRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(VehicleRecord {
            id: VehicleId::new(row.try_get("id")?),
            type_id: VehicleTypeId::new(row.try_get("type_id")?),
            type_name: row.try_get("type_name")?,
            name: row.try_get("name")?,
            police_number: row.try_get("police_number")?,
            is_available: row.try_get("is_available")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Loans joined with borrower and vehicle; `l` is the loans relation.
const LOAN_SELECT: &str = "SELECT l.id, l.user_id, u.name AS user_name, l.vehicle_id, \
     v.name AS vehicle_name, v.police_number, l.purpose, l.return_time, l.returned_at, \
     l.created_at, l.updated_at \
     FROM loans l \
     JOIN usr_users u ON u.id = l.user_id \
     JOIN vehicles v ON v.id = l.vehicle_id";

impl<'r> sqlx::FromRow<'r, PgRow> for LoanRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LoanRecord {
            id: LoanId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            user_name: row.try_get("user_name")?,
            vehicle_id: VehicleId::new(row.try_get("vehicle_id")?),
            vehicle_name: row.try_get("vehicle_name")?,
            police_number: row.try_get("police_number")?,
            purpose: row.try_get("purpose")?,
            return_time: row.try_get::<Option<DateTime<Utc>>, _>("return_time")?,
            returned_at: row.try_get::<Option<DateTime<Utc>>, _>("returned_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
