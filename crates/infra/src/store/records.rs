//! Rows as the storage layer hands them out, plus the inputs it accepts.
//!
//! Reads only ever see active rows (`deleted_at IS NULL`), so no record
//! carries a deletion timestamp.

use chrono::{DateTime, Utc};

use eproc_core::{FeatureId, LoanId, ModuleId, RoleId, UserId, VehicleId, VehicleTypeId};

/// One window of a list plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Access management
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub name: String,
    pub parent_id: Option<ModuleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModuleRecord {
    pub const SORTABLE: &'static [&'static str] = &["id", "name", "created_at", "updated_at"];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInput {
    pub name: String,
    pub parent_id: Option<ModuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    pub id: FeatureId,
    pub name: String,
    pub module_id: ModuleId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureRecord {
    pub const SORTABLE: &'static [&'static str] = &["id", "name", "created_at", "updated_at"];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureInput {
    pub name: String,
    pub module_id: ModuleId,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FeatureFilter {
    pub module_id: Option<ModuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub is_administrative: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleRecord {
    pub const SORTABLE: &'static [&'static str] =
        &["id", "name", "is_administrative", "created_at", "updated_at"];
}

/// Create/update payload for a role. `features` is the complete granted set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInput {
    pub name: String,
    pub is_administrative: bool,
    pub features: Vec<FeatureId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: RoleId,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub const SORTABLE: &'static [&'static str] = &[
        "id",
        "name",
        "username",
        "email",
        "role_id",
        "created_at",
        "updated_at",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: RoleId,
}

/// Profile fields a user update may change. The password has its own path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChanges {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role_id: RoleId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleTypeRecord {
    pub id: VehicleTypeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleTypeRecord {
    pub const SORTABLE: &'static [&'static str] = &["id", "name", "created_at", "updated_at"];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub type_id: VehicleTypeId,
    pub type_name: String,
    pub name: String,
    pub police_number: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleRecord {
    pub const SORTABLE: &'static [&'static str] = &[
        "id",
        "name",
        "police_number",
        "type_id",
        "is_available",
        "created_at",
        "updated_at",
    ];
}

/// `is_available: None` keeps the stored flag on update and means `true` on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInput {
    pub type_id: VehicleTypeId,
    pub name: String,
    pub police_number: String,
    pub is_available: Option<bool>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct VehicleFilter {
    pub type_id: Option<VehicleTypeId>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRecord {
    pub id: LoanId,
    pub user_id: UserId,
    pub user_name: String,
    pub vehicle_id: VehicleId,
    pub vehicle_name: String,
    pub police_number: String,
    pub purpose: String,
    /// Planned return.
    pub return_time: Option<DateTime<Utc>>,
    /// Actual return; `None` while the vehicle is out.
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRecord {
    pub const SORTABLE: &'static [&'static str] = &[
        "id",
        "user_id",
        "vehicle_id",
        "return_time",
        "created_at",
        "updated_at",
    ];

    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanInput {
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub purpose: String,
    pub return_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub user_id: Option<UserId>,
    pub vehicle_id: Option<VehicleId>,
}
