use serde::{Deserialize, Serialize};

use eproc_core::{RoleId, UserId};

use crate::FeatureName;

/// Authenticated user as carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub role_id: RoleId,
}

/// Role of the authenticated user as carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleIdentity {
    pub id: RoleId,
    pub name: String,
    pub is_administrative: bool,
}

/// A fully loaded user a credential is minted for: identity, role and the
/// names of every feature the role grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user: UserIdentity,
    pub role: RoleIdentity,
    pub features: Vec<FeatureName>,
}
