use eproc_auth::{FeatureName, RoleIdentity, UserIdentity};
use eproc_core::UserId;

/// Authenticated user for a request, taken from the verified token.
///
/// Immutable; present on every route behind the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    identity: UserIdentity,
}

impl UserContext {
    pub fn new(identity: UserIdentity) -> Self {
        Self { identity }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }
}

/// Role of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleContext {
    identity: RoleIdentity,
}

impl RoleContext {
    pub fn new(identity: RoleIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &RoleIdentity {
        &self.identity
    }
}

/// Feature names the token was issued with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureContext {
    features: Vec<FeatureName>,
}

impl FeatureContext {
    pub fn new(features: Vec<FeatureName>) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &[FeatureName] {
        &self.features
    }
}

/// Correlation id of the current request (`X-Request-ID`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
