//! Storage abstraction: one async trait per aggregate, an in-memory backend
//! for tests/dev and a Postgres backend.
//!
//! Every read and every uniqueness rule only considers active rows; `delete`
//! is a soft delete. Unique indexes are the final arbiter for duplicates and
//! surface as [`StoreError::Conflict`] carrying the index name.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use eproc_core::{
    FeatureId, ListQuery, LoanId, ModuleId, RoleId, UserId, VehicleId, VehicleTypeId,
};

pub mod memory;
pub mod postgres;
pub mod records;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::*;

/// Storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write; carries the index name.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("vehicle {0} is not available")]
    VehicleUnavailable(VehicleId),
    #[error("loan {0} was already returned")]
    AlreadyReturned(LoanId),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<ModuleRecord>>;
    async fn get(&self, id: ModuleId) -> StoreResult<Option<ModuleRecord>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<ModuleRecord>>;
    /// Direct children, ordered by id.
    async fn children(&self, id: ModuleId) -> StoreResult<Vec<ModuleRecord>>;
    async fn create(&self, input: ModuleInput) -> StoreResult<ModuleRecord>;
    async fn update(&self, id: ModuleId, input: ModuleInput) -> StoreResult<ModuleRecord>;
    async fn delete(&self, id: ModuleId) -> StoreResult<()>;
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn list(&self, filter: FeatureFilter, query: ListQuery)
    -> StoreResult<Listing<FeatureRecord>>;
    async fn get(&self, id: FeatureId) -> StoreResult<Option<FeatureRecord>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<FeatureRecord>>;
    /// The active features among `ids`, ordered by id. Unknown ids are skipped.
    async fn get_many(&self, ids: &[FeatureId]) -> StoreResult<Vec<FeatureRecord>>;
    async fn by_module(&self, module_id: ModuleId) -> StoreResult<Vec<FeatureRecord>>;
    /// Whether any active role grants the feature.
    async fn is_granted(&self, id: FeatureId) -> StoreResult<bool>;
    async fn create(&self, input: FeatureInput) -> StoreResult<FeatureRecord>;
    async fn update(&self, id: FeatureId, input: FeatureInput) -> StoreResult<FeatureRecord>;
    async fn delete(&self, id: FeatureId) -> StoreResult<()>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<RoleRecord>>;
    async fn get(&self, id: RoleId) -> StoreResult<Option<RoleRecord>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>>;
    /// Active features granted to the role, ordered by id.
    async fn features(&self, id: RoleId) -> StoreResult<Vec<FeatureRecord>>;
    async fn create(&self, input: RoleInput) -> StoreResult<RoleRecord>;
    /// Updates the role and replaces its granted set atomically.
    async fn update(&self, id: RoleId, input: RoleInput) -> StoreResult<RoleRecord>;
    async fn delete(&self, id: RoleId) -> StoreResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<UserRecord>>;
    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;
    /// Login lookup: matches either the username or the email.
    async fn find_by_login(&self, username_or_email: &str) -> StoreResult<Option<UserRecord>>;
    async fn count_by_role(&self, role_id: RoleId) -> StoreResult<u64>;
    async fn create(&self, input: NewUser) -> StoreResult<UserRecord>;
    async fn update(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord>;
    async fn set_password(&self, id: UserId, password_hash: String) -> StoreResult<()>;
    async fn delete(&self, id: UserId) -> StoreResult<()>;
}

#[async_trait]
pub trait VehicleTypeStore: Send + Sync {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<VehicleTypeRecord>>;
    async fn get(&self, id: VehicleTypeId) -> StoreResult<Option<VehicleTypeRecord>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<VehicleTypeRecord>>;
    async fn create(&self, name: String) -> StoreResult<VehicleTypeRecord>;
    async fn update(&self, id: VehicleTypeId, name: String) -> StoreResult<VehicleTypeRecord>;
    async fn delete(&self, id: VehicleTypeId) -> StoreResult<()>;
}

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn list(&self, filter: VehicleFilter, query: ListQuery)
    -> StoreResult<Listing<VehicleRecord>>;
    async fn get(&self, id: VehicleId) -> StoreResult<Option<VehicleRecord>>;
    async fn find_by_police_number(&self, police_number: &str)
    -> StoreResult<Option<VehicleRecord>>;
    async fn count_by_type(&self, type_id: VehicleTypeId) -> StoreResult<u64>;
    async fn create(&self, input: VehicleInput) -> StoreResult<VehicleRecord>;
    async fn update(&self, id: VehicleId, input: VehicleInput) -> StoreResult<VehicleRecord>;
    async fn delete(&self, id: VehicleId) -> StoreResult<()>;
}

/// Loans move vehicle availability in the same unit of work as the loan row.
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn list(&self, filter: LoanFilter, query: ListQuery) -> StoreResult<Listing<LoanRecord>>;
    async fn get(&self, id: LoanId) -> StoreResult<Option<LoanRecord>>;
    async fn has_open_loan(&self, vehicle_id: VehicleId) -> StoreResult<bool>;
    /// Takes the vehicle; [`StoreError::VehicleUnavailable`] if it is missing or out.
    async fn create(&self, input: LoanInput) -> StoreResult<LoanRecord>;
    /// A changed vehicle on an open loan frees the old one and takes the new one.
    async fn update(&self, id: LoanId, input: LoanInput) -> StoreResult<LoanRecord>;
    /// Frees the vehicle when the loan is still open.
    async fn delete(&self, id: LoanId) -> StoreResult<()>;
    async fn mark_returned(&self, id: LoanId, at: DateTime<Utc>) -> StoreResult<LoanRecord>;
}

/// Handle bundling every store, cheap to clone into request handlers.
#[derive(Clone)]
pub struct Stores {
    pub modules: Arc<dyn ModuleStore>,
    pub features: Arc<dyn FeatureStore>,
    pub roles: Arc<dyn RoleStore>,
    pub users: Arc<dyn UserStore>,
    pub vehicle_types: Arc<dyn VehicleTypeStore>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub loans: Arc<dyn LoanStore>,
}

impl Stores {
    /// Every trait backed by one shared in-memory state.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemoryStore::new()))
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::from_backend(Arc::new(PostgresStore::new(pool)))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ModuleStore
            + FeatureStore
            + RoleStore
            + UserStore
            + VehicleTypeStore
            + VehicleStore
            + LoanStore
            + 'static,
    {
        Self {
            modules: backend.clone(),
            features: backend.clone(),
            roles: backend.clone(),
            users: backend.clone(),
            vehicle_types: backend.clone(),
            vehicles: backend.clone(),
            loans: backend,
        }
    }
}
