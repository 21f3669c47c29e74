//! In-memory backend for tests and local runs.
//!
//! One `RwLock`-guarded state backs every store trait, so cross-table rules
//! (joined names, role grants, vehicle availability) behave as they do in
//! Postgres. Unique checks mirror the partial unique indexes and report the
//! same index names.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use eproc_core::{
    FeatureId, ListQuery, LoanId, ModuleId, RoleId, UserId, VehicleId, VehicleTypeId,
};

use super::records::*;
use super::{
    FeatureStore, LoanStore, ModuleStore, RoleStore, StoreError, StoreResult, UserStore,
    VehicleStore, VehicleTypeStore,
};
use crate::schema::index;

/// A row plus its soft-delete marker.
#[derive(Debug, Clone)]
struct Row<T> {
    record: T,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, Row<T>>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    fn insert(&mut self, build: impl FnOnce(i64) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let record = build(id);
        self.rows.insert(
            id,
            Row {
                record: record.clone(),
                deleted_at: None,
            },
        );
        record
    }

    fn active(&self) -> impl Iterator<Item = &T> {
        self.rows
            .values()
            .filter(|row| row.deleted_at.is_none())
            .map(|row| &row.record)
    }

    fn get(&self, id: i64) -> Option<&T> {
        self.rows
            .get(&id)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| &row.record)
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut T> {
        self.rows
            .get_mut(&id)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| &mut row.record)
    }

    fn soft_delete(&mut self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        match self.rows.get_mut(&id) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    modules: Table<ModuleRecord>,
    features: Table<FeatureRecord>,
    roles: Table<RoleRecord>,
    role_features: HashMap<RoleId, BTreeSet<FeatureId>>,
    users: Table<UserRecord>,
    vehicle_types: Table<VehicleTypeRecord>,
    vehicles: Table<VehicleRecord>,
    loans: Table<LoanRecord>,
}

impl State {
    fn user_view(&self, mut user: UserRecord) -> UserRecord {
        if let Some(role) = self.roles.rows.get(&user.role_id.get()) {
            user.role_name = role.record.name.clone();
        }
        user
    }

    fn vehicle_view(&self, mut vehicle: VehicleRecord) -> VehicleRecord {
        if let Some(kind) = self.vehicle_types.rows.get(&vehicle.type_id.get()) {
            vehicle.type_name = kind.record.name.clone();
        }
        vehicle
    }

    fn loan_view(&self, mut loan: LoanRecord) -> LoanRecord {
        if let Some(user) = self.users.rows.get(&loan.user_id.get()) {
            loan.user_name = user.record.name.clone();
        }
        if let Some(vehicle) = self.vehicles.rows.get(&loan.vehicle_id.get()) {
            loan.vehicle_name = vehicle.record.name.clone();
            loan.police_number = vehicle.record.police_number.clone();
        }
        loan
    }

    fn set_vehicle_available(&mut self, id: VehicleId, available: bool, now: DateTime<Utc>) {
        if let Some(vehicle) = self.vehicles.get_mut(id.get()) {
            vehicle.is_available = available;
            vehicle.updated_at = now;
        }
    }

    /// Marks the vehicle as taken, failing if it is missing or already out.
    fn take_vehicle(&mut self, id: VehicleId, now: DateTime<Utc>) -> StoreResult<()> {
        match self.vehicles.get_mut(id.get()) {
            Some(vehicle) if vehicle.is_available => {
                vehicle.is_available = false;
                vehicle.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::VehicleUnavailable(id)),
        }
    }
}

/// Rejects `candidate` when another active row (other than `except`) has it.
fn ensure_unique<'a, T: 'a>(
    rows: impl Iterator<Item = &'a T>,
    except: Option<i64>,
    id_of: impl Fn(&T) -> i64,
    same: impl Fn(&T) -> bool,
    index_name: &str,
) -> StoreResult<()> {
    let taken = rows
        .filter(|row| Some(id_of(row)) != except)
        .any(|row| same(row));
    if taken {
        Err(StoreError::Conflict(index_name.to_string()))
    } else {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Column-wise comparison for whitelisted sort columns.
trait Sortable {
    fn row_id(&self) -> i64;
    /// Ascending comparison on `column`; unknown columns compare equal.
    fn compare(&self, other: &Self, column: &str) -> CmpOrdering;
}

/// Postgres sorts NULLs last in ascending order.
fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> CmpOrdering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

fn listing<T: Sortable>(mut rows: Vec<T>, query: ListQuery) -> Listing<T> {
    let ordering = query.ordering;
    rows.sort_by(|a, b| {
        if ordering.column() == "id" {
            ordering.directed(a.row_id().cmp(&b.row_id()))
        } else {
            ordering
                .directed(a.compare(b, ordering.column()))
                .then_with(|| a.row_id().cmp(&b.row_id()))
        }
    });
    let total = rows.len() as u64;
    Listing {
        rows: query.window(rows),
        total,
    }
}

impl Sortable for ModuleRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for FeatureRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for RoleRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "is_administrative" => self.is_administrative.cmp(&other.is_administrative),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for UserRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "username" => self.username.cmp(&other.username),
            "email" => self.email.cmp(&other.email),
            "role_id" => self.role_id.cmp(&other.role_id),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for VehicleTypeRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for VehicleRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "name" => self.name.cmp(&other.name),
            "police_number" => self.police_number.cmp(&other.police_number),
            "type_id" => self.type_id.cmp(&other.type_id),
            "is_available" => self.is_available.cmp(&other.is_available),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

impl Sortable for LoanRecord {
    fn row_id(&self) -> i64 {
        self.id.get()
    }

    fn compare(&self, other: &Self, column: &str) -> CmpOrdering {
        match column {
            "user_id" => self.user_id.cmp(&other.user_id),
            "vehicle_id" => self.vehicle_id.cmp(&other.vehicle_id),
            "return_time" => nulls_last(&self.return_time, &other.return_time),
            "created_at" => self.created_at.cmp(&other.created_at),
            "updated_at" => self.updated_at.cmp(&other.updated_at),
            _ => CmpOrdering::Equal,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store implementing every storage trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Storage("in-memory state lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Storage("in-memory state lock poisoned".into()))
    }
}

#[async_trait]
impl ModuleStore for InMemoryStore {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<ModuleRecord>> {
        let state = self.read()?;
        Ok(listing(state.modules.active().cloned().collect(), query))
    }

    async fn get(&self, id: ModuleId) -> StoreResult<Option<ModuleRecord>> {
        Ok(self.read()?.modules.get(id.get()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<ModuleRecord>> {
        let state = self.read()?;
        Ok(state.modules.active().find(|m| m.name == name).cloned())
    }

    async fn children(&self, id: ModuleId) -> StoreResult<Vec<ModuleRecord>> {
        let state = self.read()?;
        Ok(state
            .modules
            .active()
            .filter(|m| m.parent_id == Some(id))
            .cloned()
            .collect())
    }

    async fn create(&self, input: ModuleInput) -> StoreResult<ModuleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.modules.active(),
            None,
            |m| m.id.get(),
            |m| m.name == input.name,
            index::MODULE_NAME,
        )?;
        let now = Utc::now();
        Ok(state.modules.insert(|id| ModuleRecord {
            id: ModuleId::new(id),
            name: input.name,
            parent_id: input.parent_id,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update(&self, id: ModuleId, input: ModuleInput) -> StoreResult<ModuleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.modules.active(),
            Some(id.get()),
            |m| m.id.get(),
            |m| m.name == input.name,
            index::MODULE_NAME,
        )?;
        let module = state.modules.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        module.name = input.name;
        module.parent_id = input.parent_id;
        module.updated_at = Utc::now();
        Ok(module.clone())
    }

    async fn delete(&self, id: ModuleId) -> StoreResult<()> {
        self.write()?.modules.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl FeatureStore for InMemoryStore {
    async fn list(
        &self,
        filter: FeatureFilter,
        query: ListQuery,
    ) -> StoreResult<Listing<FeatureRecord>> {
        let state = self.read()?;
        let rows = state
            .features
            .active()
            .filter(|f| filter.module_id.is_none_or(|m| f.module_id == m))
            .cloned()
            .collect();
        Ok(listing(rows, query))
    }

    async fn get(&self, id: FeatureId) -> StoreResult<Option<FeatureRecord>> {
        Ok(self.read()?.features.get(id.get()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<FeatureRecord>> {
        let state = self.read()?;
        Ok(state.features.active().find(|f| f.name == name).cloned())
    }

    async fn get_many(&self, ids: &[FeatureId]) -> StoreResult<Vec<FeatureRecord>> {
        let state = self.read()?;
        Ok(state
            .features
            .active()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn by_module(&self, module_id: ModuleId) -> StoreResult<Vec<FeatureRecord>> {
        let state = self.read()?;
        Ok(state
            .features
            .active()
            .filter(|f| f.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn is_granted(&self, id: FeatureId) -> StoreResult<bool> {
        let state = self.read()?;
        Ok(state
            .roles
            .active()
            .any(|r| state.role_features.get(&r.id).is_some_and(|set| set.contains(&id))))
    }

    async fn create(&self, input: FeatureInput) -> StoreResult<FeatureRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.features.active(),
            None,
            |f| f.id.get(),
            |f| f.name == input.name,
            index::FEATURE_NAME,
        )?;
        let now = Utc::now();
        Ok(state.features.insert(|id| FeatureRecord {
            id: FeatureId::new(id),
            name: input.name,
            module_id: input.module_id,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update(&self, id: FeatureId, input: FeatureInput) -> StoreResult<FeatureRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.features.active(),
            Some(id.get()),
            |f| f.id.get(),
            |f| f.name == input.name,
            index::FEATURE_NAME,
        )?;
        let feature = state.features.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        feature.name = input.name;
        feature.module_id = input.module_id;
        feature.updated_at = Utc::now();
        Ok(feature.clone())
    }

    async fn delete(&self, id: FeatureId) -> StoreResult<()> {
        self.write()?.features.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<RoleRecord>> {
        let state = self.read()?;
        Ok(listing(state.roles.active().cloned().collect(), query))
    }

    async fn get(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        Ok(self.read()?.roles.get(id.get()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>> {
        let state = self.read()?;
        Ok(state.roles.active().find(|r| r.name == name).cloned())
    }

    async fn features(&self, id: RoleId) -> StoreResult<Vec<FeatureRecord>> {
        let state = self.read()?;
        let Some(granted) = state.role_features.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .features
            .active()
            .filter(|f| granted.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn create(&self, input: RoleInput) -> StoreResult<RoleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.roles.active(),
            None,
            |r| r.id.get(),
            |r| r.name == input.name,
            index::ROLE_NAME,
        )?;
        let now = Utc::now();
        let role = state.roles.insert(|id| RoleRecord {
            id: RoleId::new(id),
            name: input.name,
            is_administrative: input.is_administrative,
            created_at: now,
            updated_at: now,
        });
        state
            .role_features
            .insert(role.id, input.features.into_iter().collect());
        Ok(role)
    }

    async fn update(&self, id: RoleId, input: RoleInput) -> StoreResult<RoleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.roles.active(),
            Some(id.get()),
            |r| r.id.get(),
            |r| r.name == input.name,
            index::ROLE_NAME,
        )?;
        let role = state.roles.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        role.name = input.name;
        role.is_administrative = input.is_administrative;
        role.updated_at = Utc::now();
        let role = role.clone();
        state
            .role_features
            .insert(id, input.features.into_iter().collect());
        Ok(role)
    }

    async fn delete(&self, id: RoleId) -> StoreResult<()> {
        self.write()?.roles.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<UserRecord>> {
        let state = self.read()?;
        let rows = state
            .users
            .active()
            .cloned()
            .map(|u| state.user_view(u))
            .collect();
        Ok(listing(rows, query))
    }

    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let state = self.read()?;
        Ok(state.users.get(id.get()).cloned().map(|u| state.user_view(u)))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let state = self.read()?;
        Ok(state
            .users
            .active()
            .find(|u| u.email == email)
            .cloned()
            .map(|u| state.user_view(u)))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let state = self.read()?;
        Ok(state
            .users
            .active()
            .find(|u| u.username == username)
            .cloned()
            .map(|u| state.user_view(u)))
    }

    async fn find_by_login(&self, username_or_email: &str) -> StoreResult<Option<UserRecord>> {
        let state = self.read()?;
        Ok(state
            .users
            .active()
            .find(|u| u.username == username_or_email || u.email == username_or_email)
            .cloned()
            .map(|u| state.user_view(u)))
    }

    async fn count_by_role(&self, role_id: RoleId) -> StoreResult<u64> {
        let state = self.read()?;
        Ok(state.users.active().filter(|u| u.role_id == role_id).count() as u64)
    }

    async fn create(&self, input: NewUser) -> StoreResult<UserRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.users.active(),
            None,
            |u| u.id.get(),
            |u| u.email == input.email,
            index::USER_EMAIL,
        )?;
        ensure_unique(
            state.users.active(),
            None,
            |u| u.id.get(),
            |u| u.username == input.username,
            index::USER_USERNAME,
        )?;
        let now = Utc::now();
        let user = state.users.insert(|id| UserRecord {
            id: UserId::new(id),
            username: input.username,
            name: input.name,
            email: input.email,
            password_hash: input.password_hash,
            role_id: input.role_id,
            role_name: String::new(),
            created_at: now,
            updated_at: now,
        });
        Ok(state.user_view(user))
    }

    async fn update(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.users.active(),
            Some(id.get()),
            |u| u.id.get(),
            |u| u.email == changes.email,
            index::USER_EMAIL,
        )?;
        ensure_unique(
            state.users.active(),
            Some(id.get()),
            |u| u.id.get(),
            |u| u.username == changes.username,
            index::USER_USERNAME,
        )?;
        let user = state.users.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        user.username = changes.username;
        user.name = changes.name;
        user.email = changes.email;
        user.role_id = changes.role_id;
        user.updated_at = Utc::now();
        let user = user.clone();
        Ok(state.user_view(user))
    }

    async fn set_password(&self, id: UserId, password_hash: String) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state.users.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: UserId) -> StoreResult<()> {
        self.write()?.users.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl VehicleTypeStore for InMemoryStore {
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<VehicleTypeRecord>> {
        let state = self.read()?;
        Ok(listing(state.vehicle_types.active().cloned().collect(), query))
    }

    async fn get(&self, id: VehicleTypeId) -> StoreResult<Option<VehicleTypeRecord>> {
        Ok(self.read()?.vehicle_types.get(id.get()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<VehicleTypeRecord>> {
        let state = self.read()?;
        Ok(state.vehicle_types.active().find(|t| t.name == name).cloned())
    }

    async fn create(&self, name: String) -> StoreResult<VehicleTypeRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.vehicle_types.active(),
            None,
            |t| t.id.get(),
            |t| t.name == name,
            index::VEHICLE_TYPE_NAME,
        )?;
        let now = Utc::now();
        Ok(state.vehicle_types.insert(|id| VehicleTypeRecord {
            id: VehicleTypeId::new(id),
            name,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn update(&self, id: VehicleTypeId, name: String) -> StoreResult<VehicleTypeRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.vehicle_types.active(),
            Some(id.get()),
            |t| t.id.get(),
            |t| t.name == name,
            index::VEHICLE_TYPE_NAME,
        )?;
        let kind = state
            .vehicle_types
            .get_mut(id.get())
            .ok_or(StoreError::NotFound)?;
        kind.name = name;
        kind.updated_at = Utc::now();
        Ok(kind.clone())
    }

    async fn delete(&self, id: VehicleTypeId) -> StoreResult<()> {
        self.write()?.vehicle_types.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn list(
        &self,
        filter: VehicleFilter,
        query: ListQuery,
    ) -> StoreResult<Listing<VehicleRecord>> {
        let state = self.read()?;
        let rows = state
            .vehicles
            .active()
            .filter(|v| filter.type_id.is_none_or(|t| v.type_id == t))
            .filter(|v| filter.is_available.is_none_or(|a| v.is_available == a))
            .cloned()
            .map(|v| state.vehicle_view(v))
            .collect();
        Ok(listing(rows, query))
    }

    async fn get(&self, id: VehicleId) -> StoreResult<Option<VehicleRecord>> {
        let state = self.read()?;
        Ok(state
            .vehicles
            .get(id.get())
            .cloned()
            .map(|v| state.vehicle_view(v)))
    }

    async fn find_by_police_number(
        &self,
        police_number: &str,
    ) -> StoreResult<Option<VehicleRecord>> {
        let state = self.read()?;
        Ok(state
            .vehicles
            .active()
            .find(|v| v.police_number == police_number)
            .cloned()
            .map(|v| state.vehicle_view(v)))
    }

    async fn count_by_type(&self, type_id: VehicleTypeId) -> StoreResult<u64> {
        let state = self.read()?;
        Ok(state.vehicles.active().filter(|v| v.type_id == type_id).count() as u64)
    }

    async fn create(&self, input: VehicleInput) -> StoreResult<VehicleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.vehicles.active(),
            None,
            |v| v.id.get(),
            |v| v.police_number == input.police_number,
            index::VEHICLE_POLICE_NUMBER,
        )?;
        let now = Utc::now();
        let vehicle = state.vehicles.insert(|id| VehicleRecord {
            id: VehicleId::new(id),
            type_id: input.type_id,
            type_name: String::new(),
            name: input.name,
            police_number: input.police_number,
            is_available: input.is_available.unwrap_or(true),
            created_at: now,
            updated_at: now,
        });
        Ok(state.vehicle_view(vehicle))
    }

    async fn update(&self, id: VehicleId, input: VehicleInput) -> StoreResult<VehicleRecord> {
        let mut state = self.write()?;
        ensure_unique(
            state.vehicles.active(),
            Some(id.get()),
            |v| v.id.get(),
            |v| v.police_number == input.police_number,
            index::VEHICLE_POLICE_NUMBER,
        )?;
        let vehicle = state.vehicles.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        vehicle.type_id = input.type_id;
        vehicle.name = input.name;
        vehicle.police_number = input.police_number;
        if let Some(available) = input.is_available {
            vehicle.is_available = available;
        }
        vehicle.updated_at = Utc::now();
        let vehicle = vehicle.clone();
        Ok(state.vehicle_view(vehicle))
    }

    async fn delete(&self, id: VehicleId) -> StoreResult<()> {
        self.write()?.vehicles.soft_delete(id.get(), Utc::now())
    }
}

#[async_trait]
impl LoanStore for InMemoryStore {
    async fn list(&self, filter: LoanFilter, query: ListQuery) -> StoreResult<Listing<LoanRecord>> {
        let state = self.read()?;
        let rows = state
            .loans
            .active()
            .filter(|l| filter.user_id.is_none_or(|u| l.user_id == u))
            .filter(|l| filter.vehicle_id.is_none_or(|v| l.vehicle_id == v))
            .cloned()
            .map(|l| state.loan_view(l))
            .collect();
        Ok(listing(rows, query))
    }

    async fn get(&self, id: LoanId) -> StoreResult<Option<LoanRecord>> {
        let state = self.read()?;
        Ok(state.loans.get(id.get()).cloned().map(|l| state.loan_view(l)))
    }

    async fn has_open_loan(&self, vehicle_id: VehicleId) -> StoreResult<bool> {
        let state = self.read()?;
        Ok(state
            .loans
            .active()
            .any(|l| l.vehicle_id == vehicle_id && l.is_open()))
    }

    async fn create(&self, input: LoanInput) -> StoreResult<LoanRecord> {
        let mut state = self.write()?;
        let now = Utc::now();
        state.take_vehicle(input.vehicle_id, now)?;
        let loan = state.loans.insert(|id| LoanRecord {
            id: LoanId::new(id),
            user_id: input.user_id,
            user_name: String::new(),
            vehicle_id: input.vehicle_id,
            vehicle_name: String::new(),
            police_number: String::new(),
            purpose: input.purpose,
            return_time: input.return_time,
            returned_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(state.loan_view(loan))
    }

    async fn update(&self, id: LoanId, input: LoanInput) -> StoreResult<LoanRecord> {
        let mut state = self.write()?;
        let now = Utc::now();
        let current = state.loans.get(id.get()).cloned().ok_or(StoreError::NotFound)?;

        if current.is_open() && current.vehicle_id != input.vehicle_id {
            state.take_vehicle(input.vehicle_id, now)?;
            state.set_vehicle_available(current.vehicle_id, true, now);
        }

        let loan = state.loans.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        loan.user_id = input.user_id;
        loan.vehicle_id = input.vehicle_id;
        loan.purpose = input.purpose;
        loan.return_time = input.return_time;
        loan.updated_at = now;
        let loan = loan.clone();
        Ok(state.loan_view(loan))
    }

    async fn delete(&self, id: LoanId) -> StoreResult<()> {
        let mut state = self.write()?;
        let now = Utc::now();
        let loan = state.loans.get(id.get()).cloned().ok_or(StoreError::NotFound)?;
        state.loans.soft_delete(id.get(), now)?;
        if loan.is_open() {
            state.set_vehicle_available(loan.vehicle_id, true, now);
        }
        Ok(())
    }

    async fn mark_returned(&self, id: LoanId, at: DateTime<Utc>) -> StoreResult<LoanRecord> {
        let mut state = self.write()?;
        let loan = state.loans.get_mut(id.get()).ok_or(StoreError::NotFound)?;
        if !loan.is_open() {
            return Err(StoreError::AlreadyReturned(id));
        }
        loan.returned_at = Some(at);
        loan.updated_at = at;
        let loan = loan.clone();
        state.set_vehicle_available(loan.vehicle_id, true, at);
        Ok(state.loan_view(loan))
    }
}

#[cfg(test)]
mod tests {
    use eproc_core::{Ordering, PageRequest};

    use super::*;
    use crate::Stores;

    async fn role(stores: &Stores, name: &str, features: Vec<FeatureId>) -> RoleRecord {
        stores
            .roles
            .create(RoleInput {
                name: name.into(),
                is_administrative: false,
                features,
            })
            .await
            .unwrap()
    }

    async fn vehicle(stores: &Stores, police_number: &str) -> VehicleRecord {
        let kind = match stores.vehicle_types.find_by_name("Van").await.unwrap() {
            Some(kind) => kind,
            None => stores.vehicle_types.create("Van".into()).await.unwrap(),
        };
        stores
            .vehicles
            .create(VehicleInput {
                type_id: kind.id,
                name: "Carry".into(),
                police_number: police_number.into(),
                is_available: None,
            })
            .await
            .unwrap()
    }

    async fn user(stores: &Stores, role_id: RoleId) -> UserRecord {
        stores
            .users
            .create(NewUser {
                username: "jane".into(),
                name: "Jane Doe".into(),
                email: "jane@example.com".into(),
                password_hash: "x".into(),
                role_id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_names_conflict_on_active_rows_only() {
        let stores = Stores::in_memory();
        let first = role(&stores, "Admin", vec![]).await;

        let err = stores
            .roles
            .create(RoleInput {
                name: "Admin".into(),
                is_administrative: false,
                features: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict(index::ROLE_NAME.to_string()));

        // renaming to its own name is not a conflict
        stores
            .roles
            .update(
                first.id,
                RoleInput {
                    name: "Admin".into(),
                    is_administrative: true,
                    features: vec![],
                },
            )
            .await
            .unwrap();

        stores.roles.delete(first.id).await.unwrap();
        role(&stores, "Admin", vec![]).await;
    }

    #[tokio::test]
    async fn soft_deleted_rows_disappear_from_reads() {
        let stores = Stores::in_memory();
        let module = stores
            .modules
            .create(ModuleInput {
                name: "Fleet".into(),
                parent_id: None,
            })
            .await
            .unwrap();

        stores.modules.delete(module.id).await.unwrap();
        assert_eq!(stores.modules.get(module.id).await.unwrap(), None);
        assert_eq!(stores.modules.list(ListQuery::all()).await.unwrap().total, 0);
        assert_eq!(
            stores.modules.delete(module.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn role_features_are_replaced_wholesale() {
        let stores = Stores::in_memory();
        let module = stores
            .modules
            .create(ModuleInput {
                name: "Role".into(),
                parent_id: None,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for name in ["View Role", "Create Role", "Delete Role"] {
            let f = stores
                .features
                .create(FeatureInput {
                    name: name.into(),
                    module_id: module.id,
                })
                .await
                .unwrap();
            ids.push(f.id);
        }

        let r = role(&stores, "Staff", vec![ids[0], ids[1]]).await;
        stores
            .roles
            .update(
                r.id,
                RoleInput {
                    name: "Staff".into(),
                    is_administrative: false,
                    features: vec![ids[2]],
                },
            )
            .await
            .unwrap();

        let granted: Vec<FeatureId> = stores
            .roles
            .features(r.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(granted, vec![ids[2]]);
        assert!(stores.features.is_granted(ids[2]).await.unwrap());
        assert!(!stores.features.is_granted(ids[0]).await.unwrap());
    }

    #[tokio::test]
    async fn user_reads_carry_current_role_name() {
        let stores = Stores::in_memory();
        let r = role(&stores, "Staff", vec![]).await;
        let u = user(&stores, r.id).await;
        assert_eq!(u.role_name, "Staff");

        stores
            .roles
            .update(
                r.id,
                RoleInput {
                    name: "Crew".into(),
                    is_administrative: false,
                    features: vec![],
                },
            )
            .await
            .unwrap();
        let u = stores.users.find_by_login("jane@example.com").await.unwrap().unwrap();
        assert_eq!(u.role_name, "Crew");
        assert_eq!(stores.users.count_by_role(r.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn loan_lifecycle_moves_availability() {
        let stores = Stores::in_memory();
        let r = role(&stores, "Staff", vec![]).await;
        let u = user(&stores, r.id).await;
        let car = vehicle(&stores, "B 1 AA").await;
        let spare = vehicle(&stores, "B 2 BB").await;

        let loan = stores
            .loans
            .create(LoanInput {
                user_id: u.id,
                vehicle_id: car.id,
                purpose: "site visit".into(),
                return_time: None,
            })
            .await
            .unwrap();
        assert_eq!(loan.police_number, "B 1 AA");
        assert!(!stores.vehicles.get(car.id).await.unwrap().unwrap().is_available);

        let second = stores
            .loans
            .create(LoanInput {
                user_id: u.id,
                vehicle_id: car.id,
                purpose: "again".into(),
                return_time: None,
            })
            .await
            .unwrap_err();
        assert_eq!(second, StoreError::VehicleUnavailable(car.id));

        // swap to the spare vehicle
        stores
            .loans
            .update(
                loan.id,
                LoanInput {
                    user_id: u.id,
                    vehicle_id: spare.id,
                    purpose: "site visit".into(),
                    return_time: None,
                },
            )
            .await
            .unwrap();
        assert!(stores.vehicles.get(car.id).await.unwrap().unwrap().is_available);
        assert!(!stores.vehicles.get(spare.id).await.unwrap().unwrap().is_available);

        let returned = stores.loans.mark_returned(loan.id, Utc::now()).await.unwrap();
        assert!(returned.returned_at.is_some());
        assert!(stores.vehicles.get(spare.id).await.unwrap().unwrap().is_available);
        assert_eq!(
            stores.loans.mark_returned(loan.id, Utc::now()).await.unwrap_err(),
            StoreError::AlreadyReturned(loan.id)
        );
        assert!(!stores.loans.has_open_loan(spare.id).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_an_open_loan_frees_the_vehicle() {
        let stores = Stores::in_memory();
        let r = role(&stores, "Staff", vec![]).await;
        let u = user(&stores, r.id).await;
        let car = vehicle(&stores, "B 1 AA").await;
        let loan = stores
            .loans
            .create(LoanInput {
                user_id: u.id,
                vehicle_id: car.id,
                purpose: "errand".into(),
                return_time: None,
            })
            .await
            .unwrap();
        assert!(stores.loans.has_open_loan(car.id).await.unwrap());

        stores.loans.delete(loan.id).await.unwrap();
        assert!(stores.vehicles.get(car.id).await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    async fn listing_orders_filters_and_windows() {
        let stores = Stores::in_memory();
        let kind = stores.vehicle_types.create("Truck".into()).await.unwrap();
        let other = stores.vehicle_types.create("Bus".into()).await.unwrap();
        for (name, plate, type_id) in [
            ("Charlie", "P3", kind.id),
            ("Alpha", "P1", kind.id),
            ("Bravo", "P2", other.id),
        ] {
            stores
                .vehicles
                .create(VehicleInput {
                    type_id,
                    name: name.into(),
                    police_number: plate.into(),
                    is_available: None,
                })
                .await
                .unwrap();
        }

        let query = ListQuery::new(
            Some(PageRequest::new(1, 1)),
            Ordering::resolve(Some("name"), Some("asc"), VehicleRecord::SORTABLE),
        );
        let page = stores
            .vehicles
            .list(
                VehicleFilter {
                    type_id: Some(kind.id),
                    is_available: None,
                },
                query,
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].name, "Alpha");
        assert_eq!(page.rows[0].type_name, "Truck");

        let desc = ListQuery::new(
            None,
            Ordering::resolve(Some("id"), Some("desc"), VehicleRecord::SORTABLE),
        );
        let all = stores
            .vehicles
            .list(VehicleFilter::default(), desc)
            .await
            .unwrap();
        let names: Vec<&str> = all.rows.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Bravo", "Alpha", "Charlie"]);
    }
}
