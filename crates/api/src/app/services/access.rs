//! Access management: modules, features, roles and users.

use std::collections::HashSet;

use tracing::{info, instrument};

use eproc_auth::{OwnershipAction, ensure_self_or_admin};
use eproc_core::{FeatureId, FieldErrors, ModuleId, RoleId, UserId};
use eproc_infra::Stores;
use eproc_infra::schema::index;
use eproc_infra::store::{
    FeatureFilter, FeatureInput, ModuleInput, NewUser, RoleInput, UserChanges,
};

use crate::app::dto::{
    FeatureDetail, FeatureView, Listed, ModuleDetail, ModuleView, RoleDetail, RoleView,
    UserDetail, UserDraft, UserView,
};
use crate::app::errors::{Entity, ServiceError, ServiceResult};
use crate::context::{RoleContext, UserContext};

use super::{ListRequest, hash_blocking, verify_blocking};

pub const MSG_PARENT_NOT_FOUND: &str = "Parent Module Not Found";
pub const MSG_PARENT_CYCLE: &str = "Parent Module cannot be the module itself or one of its descendants";
pub const MSG_MODULE_NOT_FOUND: &str = "Module Not Found";
pub const MSG_MODULE_IN_USE: &str = "Module cannot be deleted, because it still has child modules or features";
pub const MSG_FEATURE_IN_USE: &str = "Feature cannot be deleted, because it is granted to a role";
pub const MSG_ROLE_IN_USE: &str = "Role cannot be deleted, because there are users with that role";
pub const MSG_INVALID_PASSWORD_DATA: &str = "Invalid Data";
pub const MSG_OLD_PASSWORD: &str = "The old password is incorrect";

fn name_taken(entity: Entity, name: &str) -> FieldErrors {
    FieldErrors::single("name", format!("{} name {name} already exist", entity.label()))
}

/// Whether a row found by a unique field is some other row than `current`.
fn is_other<T: PartialEq>(found: Option<T>, current: Option<T>) -> bool {
    match found {
        Some(found) => Some(found) != current,
        None => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

pub struct ModuleService {
    stores: Stores,
}

impl ModuleService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: eproc_infra::StoreError) -> ServiceError {
        ServiceError::from_read(Entity::Module, e)
    }

    pub async fn list(&self, req: &ListRequest) -> ServiceResult<Listed<ModuleView>> {
        let listing = self.stores.modules.list(req.query).await.map_err(Self::read_err)?;
        Ok(req.shape(listing, ModuleView::from))
    }

    pub async fn get(&self, id: ModuleId) -> ServiceResult<ModuleDetail> {
        let module = self
            .stores
            .modules
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Module.not_found())?;
        let children = self.stores.modules.children(id).await.map_err(Self::read_err)?;
        let features = self
            .stores
            .features
            .by_module(id)
            .await
            .map_err(Self::read_err)?;

        Ok(ModuleDetail {
            id: module.id,
            name: module.name,
            parent_id: module.parent_id,
            children: children.into_iter().map(ModuleView::from).collect(),
            features: features.into_iter().map(FeatureView::from).collect(),
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: ModuleInput) -> ServiceResult<ModuleView> {
        self.check(None, &input).await?;
        let name = input.name.clone();
        let created = self
            .stores
            .modules
            .create(input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Module, e, |_| name_taken(Entity::Module, &name)))?;
        info!(module_id = %created.id, "module created");
        Ok(created.into())
    }

    #[instrument(skip(self, input), fields(module_id = %id))]
    pub async fn update(&self, id: ModuleId, input: ModuleInput) -> ServiceResult<ModuleView> {
        self.stores
            .modules
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Module.not_found())?;
        self.check(Some(id), &input).await?;
        let name = input.name.clone();
        let updated = self
            .stores
            .modules
            .update(id, input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Module, e, |_| name_taken(Entity::Module, &name)))?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: ModuleId) -> ServiceResult<()> {
        self.stores
            .modules
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Module.not_found())?;

        let children = self.stores.modules.children(id).await.map_err(Self::read_err)?;
        let features = self
            .stores
            .features
            .by_module(id)
            .await
            .map_err(Self::read_err)?;
        if !children.is_empty() || !features.is_empty() {
            return Err(ServiceError::Forbidden(MSG_MODULE_IN_USE.to_string()));
        }

        self.stores.modules.delete(id).await.map_err(Self::read_err)
    }

    /// Parent must exist and, on update, must not sit below the module
    /// itself. Then the name must be free.
    async fn check(&self, current: Option<ModuleId>, input: &ModuleInput) -> ServiceResult<()> {
        if let Some(parent_id) = input.parent_id {
            if self
                .stores
                .modules
                .get(parent_id)
                .await
                .map_err(Self::read_err)?
                .is_none()
            {
                return Err(ServiceError::field("parent_id", MSG_PARENT_NOT_FOUND));
            }
            if let Some(id) = current {
                if self.is_self_or_descendant(id, parent_id).await? {
                    return Err(ServiceError::field("parent_id", MSG_PARENT_CYCLE));
                }
            }
        }

        let existing = self
            .stores
            .modules
            .find_by_name(&input.name)
            .await
            .map_err(Self::read_err)?;
        if is_other(existing.map(|m| m.id), current) {
            return Err(ServiceError::Duplicate(name_taken(Entity::Module, &input.name)));
        }
        Ok(())
    }

    /// Walk from `candidate` up to the root looking for `id`.
    async fn is_self_or_descendant(&self, id: ModuleId, candidate: ModuleId) -> ServiceResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate);
        while let Some(current) = cursor {
            if current == id {
                return Ok(true);
            }
            if !visited.insert(current) {
                break;
            }
            cursor = self
                .stores
                .modules
                .get(current)
                .await
                .map_err(Self::read_err)?
                .and_then(|m| m.parent_id);
        }
        Ok(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Features
// ─────────────────────────────────────────────────────────────────────────────

pub struct FeatureService {
    stores: Stores,
}

impl FeatureService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: eproc_infra::StoreError) -> ServiceError {
        ServiceError::from_read(Entity::Feature, e)
    }

    pub async fn list(
        &self,
        filter: FeatureFilter,
        req: &ListRequest,
    ) -> ServiceResult<Listed<FeatureView>> {
        let listing = self
            .stores
            .features
            .list(filter, req.query)
            .await
            .map_err(Self::read_err)?;
        Ok(req.shape(listing, FeatureView::from))
    }

    pub async fn get(&self, id: FeatureId) -> ServiceResult<FeatureDetail> {
        let feature = self
            .stores
            .features
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Feature.not_found())?;
        let module = self
            .stores
            .modules
            .get(feature.module_id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| {
                ServiceError::Internal(format!("module {} of feature {id} missing", feature.module_id))
            })?;

        Ok(FeatureDetail {
            id: feature.id,
            name: feature.name,
            module_id: feature.module_id,
            module: module.into(),
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: FeatureInput) -> ServiceResult<FeatureView> {
        self.check(None, &input).await?;
        let name = input.name.clone();
        let created = self
            .stores
            .features
            .create(input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Feature, e, |_| name_taken(Entity::Feature, &name)))?;
        info!(feature_id = %created.id, "feature created");
        Ok(created.into())
    }

    pub async fn update(&self, id: FeatureId, input: FeatureInput) -> ServiceResult<FeatureView> {
        self.stores
            .features
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Feature.not_found())?;
        self.check(Some(id), &input).await?;
        let name = input.name.clone();
        let updated = self
            .stores
            .features
            .update(id, input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Feature, e, |_| name_taken(Entity::Feature, &name)))?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: FeatureId) -> ServiceResult<()> {
        self.stores
            .features
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Feature.not_found())?;
        if self.stores.features.is_granted(id).await.map_err(Self::read_err)? {
            return Err(ServiceError::Forbidden(MSG_FEATURE_IN_USE.to_string()));
        }
        self.stores.features.delete(id).await.map_err(Self::read_err)
    }

    async fn check(&self, current: Option<FeatureId>, input: &FeatureInput) -> ServiceResult<()> {
        if self
            .stores
            .modules
            .get(input.module_id)
            .await
            .map_err(Self::read_err)?
            .is_none()
        {
            return Err(ServiceError::field("module_id", MSG_MODULE_NOT_FOUND));
        }

        let existing = self
            .stores
            .features
            .find_by_name(&input.name)
            .await
            .map_err(Self::read_err)?;
        if is_other(existing.map(|f| f.id), current) {
            return Err(ServiceError::Duplicate(name_taken(Entity::Feature, &input.name)));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

pub struct RoleService {
    stores: Stores,
}

impl RoleService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: eproc_infra::StoreError) -> ServiceError {
        ServiceError::from_read(Entity::Role, e)
    }

    pub async fn list(&self, req: &ListRequest) -> ServiceResult<Listed<RoleView>> {
        let listing = self.stores.roles.list(req.query).await.map_err(Self::read_err)?;
        Ok(req.shape(listing, RoleView::from))
    }

    pub async fn get(&self, id: RoleId) -> ServiceResult<RoleDetail> {
        let role = self
            .stores
            .roles
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Role.not_found())?;
        let features = self.stores.roles.features(id).await.map_err(Self::read_err)?;

        Ok(RoleDetail {
            id: role.id,
            name: role.name,
            is_administrative: role.is_administrative,
            features: features.into_iter().map(FeatureView::from).collect(),
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name, features = input.features.len()))]
    pub async fn create(&self, input: RoleInput) -> ServiceResult<RoleView> {
        self.check(None, &input).await?;
        let name = input.name.clone();
        let created = self
            .stores
            .roles
            .create(input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Role, e, |_| name_taken(Entity::Role, &name)))?;
        info!(role_id = %created.id, "role created");
        Ok(created.into())
    }

    /// Rename and replace the granted feature set wholesale.
    #[instrument(skip(self, input), fields(role_id = %id, features = input.features.len()))]
    pub async fn update(&self, id: RoleId, input: RoleInput) -> ServiceResult<RoleView> {
        self.stores
            .roles
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Role.not_found())?;
        self.check(Some(id), &input).await?;
        let name = input.name.clone();
        let updated = self
            .stores
            .roles
            .update(id, input)
            .await
            .map_err(|e| ServiceError::from_store(Entity::Role, e, |_| name_taken(Entity::Role, &name)))?;
        Ok(updated.into())
    }

    pub async fn delete(&self, id: RoleId) -> ServiceResult<()> {
        self.stores
            .roles
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::Role.not_found())?;
        if self.stores.users.count_by_role(id).await.map_err(Self::read_err)? > 0 {
            return Err(ServiceError::Forbidden(MSG_ROLE_IN_USE.to_string()));
        }
        self.stores.roles.delete(id).await.map_err(Self::read_err)
    }

    async fn check(&self, current: Option<RoleId>, input: &RoleInput) -> ServiceResult<()> {
        let known: HashSet<FeatureId> = self
            .stores
            .features
            .get_many(&input.features)
            .await
            .map_err(Self::read_err)?
            .into_iter()
            .map(|f| f.id)
            .collect();
        if let Some(missing) = input.features.iter().find(|id| !known.contains(id)) {
            return Err(ServiceError::field(
                "features",
                format!("Feature with id {missing} not found"),
            ));
        }

        let existing = self
            .stores
            .roles
            .find_by_name(&input.name)
            .await
            .map_err(Self::read_err)?;
        if is_other(existing.map(|r| r.id), current) {
            return Err(ServiceError::Duplicate(name_taken(Entity::Role, &input.name)));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

pub struct UserService {
    stores: Stores,
}

/// Duplicate messages for the unique user fields, keyed by the index that
/// rejected the write.
fn user_taken(index_name: &str, username: &str, email: &str) -> FieldErrors {
    if index_name == index::USER_USERNAME {
        FieldErrors::single("username", format!("User username {username} already exist"))
    } else {
        FieldErrors::single("email", format!("User email {email} already exist"))
    }
}

impl UserService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    fn read_err(e: eproc_infra::StoreError) -> ServiceError {
        ServiceError::from_read(Entity::User, e)
    }

    pub async fn list(&self, req: &ListRequest) -> ServiceResult<Listed<UserView>> {
        let listing = self.stores.users.list(req.query).await.map_err(Self::read_err)?;
        Ok(req.shape(listing, UserView::from))
    }

    pub async fn get(&self, id: UserId) -> ServiceResult<UserDetail> {
        let user = self
            .stores
            .users
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::User.not_found())?;
        let role = self
            .stores
            .roles
            .get(user.role_id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| ServiceError::Internal(format!("role {} of user {id} missing", user.role_id)))?;

        Ok(UserDetail {
            user: user.into(),
            role: role.into(),
        })
    }

    #[instrument(skip(self, draft), fields(username = %draft.username, role_id = %draft.role_id))]
    pub async fn create(&self, draft: UserDraft) -> ServiceResult<UserView> {
        self.check(None, &draft.username, &draft.email, draft.role_id)
            .await?;

        let password_hash = hash_blocking(draft.password).await?;
        let (username, email) = (draft.username.clone(), draft.email.clone());
        let created = self
            .stores
            .users
            .create(NewUser {
                username: draft.username,
                name: draft.name,
                email: draft.email,
                password_hash,
                role_id: draft.role_id,
            })
            .await
            .map_err(|e| {
                ServiceError::from_store(Entity::User, e, |index| user_taken(index, &username, &email))
            })?;
        info!(user_id = %created.id, "user created");
        Ok(created.into())
    }

    /// Only the user themself or an administrator may edit a profile.
    #[instrument(skip(self, caller, role, changes), fields(user_id = %id, caller = %caller.user_id()))]
    pub async fn update(
        &self,
        caller: &UserContext,
        role: &RoleContext,
        id: UserId,
        changes: UserChanges,
    ) -> ServiceResult<UserView> {
        ensure_self_or_admin(caller.identity(), role.identity(), id, OwnershipAction::AlterData)
            .map_err(|e| ServiceError::Forbidden(e.to_string()))?;
        self.stores
            .users
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::User.not_found())?;
        self.check(Some(id), &changes.username, &changes.email, changes.role_id)
            .await?;

        let (username, email) = (changes.username.clone(), changes.email.clone());
        let updated = self
            .stores
            .users
            .update(id, changes)
            .await
            .map_err(|e| {
                ServiceError::from_store(Entity::User, e, |index| user_taken(index, &username, &email))
            })?;
        Ok(updated.into())
    }

    #[instrument(skip(self, caller, role), fields(user_id = %id, caller = %caller.user_id()))]
    pub async fn delete(&self, caller: &UserContext, role: &RoleContext, id: UserId) -> ServiceResult<()> {
        ensure_self_or_admin(caller.identity(), role.identity(), id, OwnershipAction::Delete)
            .map_err(|e| ServiceError::Forbidden(e.to_string()))?;
        self.stores
            .users
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::User.not_found())?;
        self.stores.users.delete(id).await.map_err(Self::read_err)?;
        info!("user deleted");
        Ok(())
    }

    #[instrument(skip(self, password), fields(user_id = %id))]
    pub async fn reset_password(&self, id: UserId, password: String) -> ServiceResult<()> {
        self.stores
            .users
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::User.not_found())?;
        let hash = hash_blocking(password).await?;
        self.stores
            .users
            .set_password(id, hash)
            .await
            .map_err(Self::read_err)
    }

    /// Ownership is enforced by the route guard before this runs.
    #[instrument(skip(self, old_password, password), fields(user_id = %id))]
    pub async fn change_password(
        &self,
        id: UserId,
        old_password: String,
        password: String,
    ) -> ServiceResult<()> {
        let user = self
            .stores
            .users
            .get(id)
            .await
            .map_err(Self::read_err)?
            .ok_or_else(|| Entity::User.not_found())?;

        if !verify_blocking(old_password, user.password_hash).await? {
            return Err(ServiceError::Rejected {
                message: MSG_INVALID_PASSWORD_DATA,
                errors: FieldErrors::single("old_password", MSG_OLD_PASSWORD),
            });
        }

        let hash = hash_blocking(password).await?;
        self.stores
            .users
            .set_password(id, hash)
            .await
            .map_err(Self::read_err)
    }

    /// Role must exist; username and email must be free.
    async fn check(
        &self,
        current: Option<UserId>,
        username: &str,
        email: &str,
        role_id: RoleId,
    ) -> ServiceResult<()> {
        if self
            .stores
            .roles
            .get(role_id)
            .await
            .map_err(Self::read_err)?
            .is_none()
        {
            return Err(ServiceError::field(
                "role_id",
                format!("Role with id {role_id} not found"),
            ));
        }

        let mut taken = FieldErrors::new();
        let by_email = self
            .stores
            .users
            .find_by_email(email)
            .await
            .map_err(Self::read_err)?;
        if is_other(by_email.map(|u| u.id), current) {
            taken.add("email", format!("User email {email} already exist"));
        }
        let by_username = self
            .stores
            .users
            .find_by_username(username)
            .await
            .map_err(Self::read_err)?;
        if is_other(by_username.map(|u| u.id), current) {
            taken.add("username", format!("User username {username} already exist"));
        }
        taken.into_result().map_err(ServiceError::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_row_is_not_a_duplicate() {
        assert!(!is_other(Some(RoleId::new(3)), Some(RoleId::new(3))));
        assert!(is_other(Some(RoleId::new(3)), Some(RoleId::new(4))));
        assert!(is_other(Some(RoleId::new(3)), None));
        assert!(!is_other::<RoleId>(None, None));
    }

    #[test]
    fn conflict_index_picks_the_field() {
        let errors = user_taken(index::USER_USERNAME, "admin", "a@b.co");
        assert_eq!(errors.get("username"), Some("User username admin already exist"));
        let errors = user_taken(index::USER_EMAIL, "admin", "a@b.co");
        assert_eq!(errors.get("email"), Some("User email a@b.co already exist"));
    }

    #[tokio::test]
    async fn module_cannot_move_below_itself() {
        let stores = Stores::in_memory();
        let service = ModuleService::new(stores);
        let root = service
            .create(ModuleInput {
                name: "Root".into(),
                parent_id: None,
            })
            .await
            .unwrap();
        let child = service
            .create(ModuleInput {
                name: "Child".into(),
                parent_id: Some(root.id),
            })
            .await
            .unwrap();

        let err = service
            .update(
                root.id,
                ModuleInput {
                    name: "Root".into(),
                    parent_id: Some(child.id),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::field("parent_id", MSG_PARENT_CYCLE));

        let err = service
            .update(
                root.id,
                ModuleInput {
                    name: "Root".into(),
                    parent_id: Some(root.id),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::field("parent_id", MSG_PARENT_CYCLE));

        // renaming to its own name is fine
        service
            .update(
                child.id,
                ModuleInput {
                    name: "Child".into(),
                    parent_id: Some(root.id),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn role_rejects_unknown_features() {
        let service = RoleService::new(Stores::in_memory());
        let err = service
            .create(RoleInput {
                name: "Clerk".into(),
                is_administrative: false,
                features: vec![FeatureId::new(42)],
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::field("features", "Feature with id 42 not found")
        );
    }
}
