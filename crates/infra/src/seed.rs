//! Bootstrap catalog: management-area modules, their CRUD features, the
//! administrator role and (optionally) the administrator user.
//!
//! Idempotent. Rows that already exist by name are reused as they are.

use thiserror::Error;
use tracing::{info, warn};

use eproc_auth::catalog::{self, AREAS};
use eproc_auth::{PasswordError, hash_password};
use eproc_core::{FeatureId, ModuleId};

use crate::store::{
    FeatureInput, ModuleInput, NewUser, RoleInput, RoleRecord, StoreError, Stores,
};

pub const ADMIN_ROLE: &str = "Administrator";
pub const ADMIN_NAME: &str = "Administrator";
pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("password hashing task failed: {0}")]
    Join(String),
}

/// Administrator account to create when missing.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    /// No admin user is created without a password.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub modules_created: usize,
    pub features_created: usize,
    pub role_created: bool,
    pub admin_created: bool,
}

pub async fn seed(stores: &Stores, admin: &AdminSeed) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    let mut feature_ids = Vec::new();

    for area in AREAS {
        let parent = ensure_module(stores, area.parent, None, &mut report).await?;
        let module = ensure_module(stores, area.module, Some(parent), &mut report).await?;
        for name in area.features {
            feature_ids.push(ensure_feature(stores, name, module, &mut report).await?);
        }
    }

    let role = ensure_admin_role(stores, feature_ids, &mut report).await?;

    match &admin.password {
        Some(password) => ensure_admin_user(stores, &role, &admin.email, password, &mut report).await?,
        None => warn!("ADMIN_PASSWORD not set; administrator user not seeded"),
    }

    info!(
        modules_created = report.modules_created,
        features_created = report.features_created,
        role_created = report.role_created,
        admin_created = report.admin_created,
        "seed catalog applied"
    );
    Ok(report)
}

async fn ensure_module(
    stores: &Stores,
    name: &str,
    parent_id: Option<ModuleId>,
    report: &mut SeedReport,
) -> Result<ModuleId, SeedError> {
    if let Some(existing) = stores.modules.find_by_name(name).await? {
        return Ok(existing.id);
    }
    let created = stores
        .modules
        .create(ModuleInput {
            name: name.to_string(),
            parent_id,
        })
        .await?;
    report.modules_created += 1;
    Ok(created.id)
}

async fn ensure_feature(
    stores: &Stores,
    name: &str,
    module_id: ModuleId,
    report: &mut SeedReport,
) -> Result<FeatureId, SeedError> {
    if let Some(existing) = stores.features.find_by_name(name).await? {
        return Ok(existing.id);
    }
    let created = stores
        .features
        .create(FeatureInput {
            name: name.to_string(),
            module_id,
        })
        .await?;
    report.features_created += 1;
    Ok(created.id)
}

/// The administrator role always ends up holding every catalog feature.
async fn ensure_admin_role(
    stores: &Stores,
    catalog_ids: Vec<FeatureId>,
    report: &mut SeedReport,
) -> Result<RoleRecord, SeedError> {
    let Some(role) = stores.roles.find_by_name(ADMIN_ROLE).await? else {
        let created = stores
            .roles
            .create(RoleInput {
                name: ADMIN_ROLE.to_string(),
                is_administrative: true,
                features: catalog_ids,
            })
            .await?;
        report.role_created = true;
        return Ok(created);
    };

    let mut granted: Vec<FeatureId> = stores
        .roles
        .features(role.id)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();
    let missing: Vec<FeatureId> = catalog_ids
        .into_iter()
        .filter(|id| !granted.contains(id))
        .collect();
    if missing.is_empty() {
        return Ok(role);
    }

    warn!(missing = missing.len(), "administrator role lacked catalog features; granting");
    granted.extend(missing);
    Ok(stores
        .roles
        .update(
            role.id,
            RoleInput {
                name: role.name.clone(),
                is_administrative: role.is_administrative,
                features: granted,
            },
        )
        .await?)
}

async fn ensure_admin_user(
    stores: &Stores,
    role: &RoleRecord,
    email: &str,
    password: &str,
    report: &mut SeedReport,
) -> Result<(), SeedError> {
    if stores.users.find_by_username(ADMIN_USERNAME).await?.is_some()
        || stores.users.find_by_email(email).await?.is_some()
    {
        return Ok(());
    }

    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| SeedError::Join(e.to_string()))??;

    stores
        .users
        .create(NewUser {
            username: ADMIN_USERNAME.to_string(),
            name: ADMIN_NAME.to_string(),
            email: email.to_string(),
            password_hash,
            role_id: role.id,
        })
        .await?;
    report.admin_created = true;
    Ok(())
}

/// Number of features the catalog seeds.
pub fn catalog_size() -> usize {
    catalog::all_features().count()
}

#[cfg(test)]
mod tests {
    use eproc_core::ListQuery;

    use super::*;

    fn admin(password: Option<&str>) -> AdminSeed {
        AdminSeed {
            email: "admin@example.com".into(),
            password: password.map(String::from),
        }
    }

    #[tokio::test]
    async fn seeds_catalog_once() {
        let stores = Stores::in_memory();

        let first = seed(&stores, &admin(Some("changeme"))).await.unwrap();
        assert_eq!(first.modules_created, 9);
        assert_eq!(first.features_created, catalog_size());
        assert!(first.role_created);
        assert!(first.admin_created);

        let second = seed(&stores, &admin(Some("changeme"))).await.unwrap();
        assert_eq!(second, SeedReport::default());

        let features = stores
            .features
            .list(Default::default(), ListQuery::all())
            .await
            .unwrap();
        assert_eq!(features.total as usize, catalog_size());
    }

    #[tokio::test]
    async fn admin_role_holds_every_feature() {
        let stores = Stores::in_memory();
        seed(&stores, &admin(None)).await.unwrap();

        let role = stores.roles.find_by_name(ADMIN_ROLE).await.unwrap().unwrap();
        assert!(role.is_administrative);
        let granted = stores.roles.features(role.id).await.unwrap();
        assert_eq!(granted.len(), catalog_size());
        assert!(granted.iter().any(|f| f.name == catalog::RESET_USER_PASSWORD));
    }

    #[tokio::test]
    async fn admin_user_needs_a_password() {
        let stores = Stores::in_memory();
        let report = seed(&stores, &admin(None)).await.unwrap();
        assert!(!report.admin_created);
        assert!(stores.users.find_by_username(ADMIN_USERNAME).await.unwrap().is_none());

        seed(&stores, &admin(Some("changeme"))).await.unwrap();
        let user = stores.users.find_by_login("admin@example.com").await.unwrap().unwrap();
        assert_eq!(user.role_name, ADMIN_ROLE);
        assert!(eproc_auth::verify_password("changeme", &user.password_hash));
    }

    #[tokio::test]
    async fn module_tree_has_two_roots() {
        let stores = Stores::in_memory();
        seed(&stores, &admin(None)).await.unwrap();

        let root = stores
            .modules
            .find_by_name(catalog::FLEET_MANAGEMENT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.parent_id, None);
        let children: Vec<String> = stores
            .modules
            .children(root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(children, vec!["Vehicle", "Vehicle Type", "Loan"]);
    }
}
