//! Fleet: vehicle types, vehicles and loans.

use chrono::Utc;
use tracing::{info, instrument};

use eproc_core::{FieldErrors, LoanId, VehicleId, VehicleTypeId};
use eproc_infra::store::{LoanFilter, LoanInput, VehicleFilter, VehicleInput};
use eproc_infra::{StoreError, Stores};

use crate::app::dto::{LoanDraft, LoanView, Listed, VehicleTypeView, VehicleView};
use crate::app::errors::{Entity, MSG_VEHICLE_UNAVAILABLE, ServiceError, ServiceResult};
use crate::context::UserContext;

use super::ListRequest;

pub const MSG_TYPE_NOT_FOUND: &str = "Vehicle Type Not Found";
pub const MSG_USER_NOT_FOUND: &str = "User Not Found";
pub const MSG_TYPE_IN_USE: &str = "Vehicle Type cannot be deleted, because there are vehicles with that type";
pub const MSG_VEHICLE_IN_USE: &str = "Vehicle cannot be deleted, because it is currently loaned";

// ─────────────────────────────────────────────────────────────────────────────
// Vehicle types
// ─────────────────────────────────────────────────────────────────────────────

pub struct VehicleTypeService {
    stores: Stores,
}

fn type_taken(name: &str) -> FieldErrors {
    FieldErrors::single("name", format!("Vehicle Type name {name} already exist"))
}

impl VehicleTypeService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: StoreError) -> ServiceError {
        ServiceError::from_read(Entity::VehicleType, e)
    }

    pub async fn list(&self, req: &ListRequest) -> ServiceResult<Listed<VehicleTypeView>> {
        let listing = self
            .stores
            .vehicle_types
            .list(req.query)
            .await
            .map_err(Self::read_err)?;
        Ok(req.shape(listing, VehicleTypeView::from))
    }

    pub async fn get(&self, id: VehicleTypeId) -> ServiceResult<VehicleTypeView> {
        self.stores
            .vehicle_types
            .get(id)
            .await
            .map_err(Self::read_err)?
            .map(VehicleTypeView::from)
            .ok_or_else(|| Entity::VehicleType.not_found())
    }

    pub async fn create(&self, name: String) -> ServiceResult<VehicleTypeView> {
        self.check(None, &name).await?;
        let created = self
            .stores
            .vehicle_types
            .create(name.clone())
            .await
            .map_err(|e| ServiceError::from_store(Entity::VehicleType, e, |_| type_taken(&name)))?;
        info!(type_id = %created.id, "vehicle type created");
        Ok(created.into())
    }

    pub async fn update(&self, id: VehicleTypeId, name: String) -> ServiceResult<VehicleTypeView> {
        self.get(id).await?;
        self.check(Some(id), &name).await?;
        let updated = self
            .stores
            .vehicle_types
            .update(id, name.clone())
            .await
            .map_err(|e| ServiceError::from_store(Entity::VehicleType, e, |_| type_taken(&name)))?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: VehicleTypeId) -> ServiceResult<()> {
        self.get(id).await?;
        if self
            .stores
            .vehicles
            .count_by_type(id)
            .await
            .map_err(Self::read_err)?
            > 0
        {
            return Err(ServiceError::Forbidden(MSG_TYPE_IN_USE.to_string()));
        }
        self.stores
            .vehicle_types
            .delete(id)
            .await
            .map_err(Self::read_err)
    }

    async fn check(&self, current: Option<VehicleTypeId>, name: &str) -> ServiceResult<()> {
        let existing = self
            .stores
            .vehicle_types
            .find_by_name(name)
            .await
            .map_err(Self::read_err)?;
        match existing {
            Some(found) if Some(found.id) != current => {
                Err(ServiceError::Duplicate(type_taken(name)))
            }
            _ => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vehicles
// ─────────────────────────────────────────────────────────────────────────────

pub struct VehicleService {
    stores: Stores,
}

fn police_number_taken(police_number: &str) -> FieldErrors {
    FieldErrors::single(
        "police_number",
        format!("Vehicle police number {police_number} already exist"),
    )
}

impl VehicleService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: StoreError) -> ServiceError {
        ServiceError::from_read(Entity::Vehicle, e)
    }

    pub async fn list(
        &self,
        filter: VehicleFilter,
        req: &ListRequest,
    ) -> ServiceResult<Listed<VehicleView>> {
        let listing = self
            .stores
            .vehicles
            .list(filter, req.query)
            .await
            .map_err(Self::read_err)?;
        Ok(req.shape(listing, VehicleView::from))
    }

    pub async fn get(&self, id: VehicleId) -> ServiceResult<VehicleView> {
        self.stores
            .vehicles
            .get(id)
            .await
            .map_err(Self::read_err)?
            .map(VehicleView::from)
            .ok_or_else(|| Entity::Vehicle.not_found())
    }

    #[instrument(skip(self, input), fields(police_number = %input.police_number))]
    pub async fn create(&self, input: VehicleInput) -> ServiceResult<VehicleView> {
        self.check(None, &input).await?;
        let police_number = input.police_number.clone();
        let created = self
            .stores
            .vehicles
            .create(input)
            .await
            .map_err(|e| {
                ServiceError::from_store(Entity::Vehicle, e, |_| police_number_taken(&police_number))
            })?;
        info!(vehicle_id = %created.id, "vehicle created");
        Ok(created.into())
    }

    /// An absent `is_available` keeps the current availability.
    pub async fn update(&self, id: VehicleId, input: VehicleInput) -> ServiceResult<VehicleView> {
        self.get(id).await?;
        self.check(Some(id), &input).await?;
        let police_number = input.police_number.clone();
        let updated = self
            .stores
            .vehicles
            .update(id, input)
            .await
            .map_err(|e| {
                ServiceError::from_store(Entity::Vehicle, e, |_| police_number_taken(&police_number))
            })?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: VehicleId) -> ServiceResult<()> {
        self.get(id).await?;
        if self
            .stores
            .loans
            .has_open_loan(id)
            .await
            .map_err(Self::read_err)?
        {
            return Err(ServiceError::Forbidden(MSG_VEHICLE_IN_USE.to_string()));
        }
        self.stores.vehicles.delete(id).await.map_err(Self::read_err)
    }

    async fn check(&self, current: Option<VehicleId>, input: &VehicleInput) -> ServiceResult<()> {
        if self
            .stores
            .vehicle_types
            .get(input.type_id)
            .await
            .map_err(Self::read_err)?
            .is_none()
        {
            return Err(ServiceError::field("type_id", MSG_TYPE_NOT_FOUND));
        }

        let existing = self
            .stores
            .vehicles
            .find_by_police_number(&input.police_number)
            .await
            .map_err(Self::read_err)?;
        match existing {
            Some(found) if Some(found.id) != current => {
                Err(ServiceError::Duplicate(police_number_taken(&input.police_number)))
            }
            _ => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loans
// ─────────────────────────────────────────────────────────────────────────────

pub struct LoanService {
    stores: Stores,
}

impl LoanService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: StoreError) -> ServiceError {
        ServiceError::from_read(Entity::Loan, e)
    }

    pub async fn list(&self, filter: LoanFilter, req: &ListRequest) -> ServiceResult<Listed<LoanView>> {
        let listing = self
            .stores
            .loans
            .list(filter, req.query)
            .await
            .map_err(Self::read_err)?;
        Ok(req.shape(listing, LoanView::from))
    }

    pub async fn get(&self, id: LoanId) -> ServiceResult<LoanView> {
        self.stores
            .loans
            .get(id)
            .await
            .map_err(Self::read_err)?
            .map(LoanView::from)
            .ok_or_else(|| Entity::Loan.not_found())
    }

    /// Borrow a vehicle. The borrower defaults to the caller.
    #[instrument(skip(self, caller, draft), fields(vehicle_id = %draft.vehicle_id, caller = %caller.user_id()))]
    pub async fn create(&self, caller: &UserContext, draft: LoanDraft) -> ServiceResult<LoanView> {
        let user_id = draft.user_id.unwrap_or_else(|| caller.user_id());
        self.ensure_user(user_id).await?;
        self.ensure_available(draft.vehicle_id).await?;

        let created = self
            .stores
            .loans
            .create(LoanInput {
                user_id,
                vehicle_id: draft.vehicle_id,
                purpose: draft.purpose,
                return_time: draft.return_time,
            })
            .await
            .map_err(Self::read_err)?;
        info!(loan_id = %created.id, user_id = %user_id, "vehicle loaned");
        Ok(created.into())
    }

    /// Edit a loan; moving an open loan to another vehicle frees the old one.
    #[instrument(skip(self, draft), fields(loan_id = %id, vehicle_id = %draft.vehicle_id))]
    pub async fn update(&self, id: LoanId, draft: LoanDraft) -> ServiceResult<LoanView> {
        let current = self
            .stores
            .loans
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Loan.not_found())?;

        let user_id = draft.user_id.unwrap_or(current.user_id);
        self.ensure_user(user_id).await?;
        if current.is_open() && current.vehicle_id != draft.vehicle_id {
            self.ensure_available(draft.vehicle_id).await?;
        }

        let updated = self
            .stores
            .loans
            .update(
                id,
                LoanInput {
                    user_id,
                    vehicle_id: draft.vehicle_id,
                    purpose: draft.purpose,
                    return_time: draft.return_time,
                },
            )
            .await
            .map_err(Self::read_err)?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: LoanId) -> ServiceResult<()> {
        self.stores.loans.delete(id).await.map_err(Self::read_err)
    }

    #[instrument(skip(self), fields(loan_id = %id))]
    pub async fn return_loan(&self, id: LoanId) -> ServiceResult<LoanView> {
        let returned = self
            .stores
            .loans
            .mark_returned(id, Utc::now())
            .await
            .map_err(Self::read_err)?;
        info!(vehicle_id = %returned.vehicle_id, "vehicle returned");
        Ok(returned.into())
    }

    async fn ensure_user(&self, id: eproc_core::UserId) -> ServiceResult<()> {
        match self.stores.users.get(id).await.map_err(Self::read_err)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::field("user_id", MSG_USER_NOT_FOUND)),
        }
    }

    /// Pre-check only; the store re-checks atomically when taking the vehicle.
    async fn ensure_available(&self, id: VehicleId) -> ServiceResult<()> {
        match self.stores.vehicles.get(id).await.map_err(Self::read_err)? {
            Some(vehicle) if vehicle.is_available => Ok(()),
            _ => Err(ServiceError::NotFound(MSG_VEHICLE_UNAVAILABLE.to_string())),
        }
    }
}
