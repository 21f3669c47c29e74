use chrono::Utc;
use tracing::{info, instrument};

use eproc_auth::{FeatureName, RoleIdentity, TokenIssuer, TokenSubject, UserIdentity};
use eproc_infra::Stores;

use crate::app::dto::LoginView;
use crate::app::errors::{Entity, ServiceError, ServiceResult};

use super::verify_blocking;

pub const MSG_BAD_CREDENTIALS: &str = "Invalid email or password";

pub struct AuthService {
    stores: Stores,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(stores: Stores, tokens: TokenIssuer) -> Self {
        Self { stores, tokens }
    }

    /// Check the credentials and mint a token carrying the role's current
    /// feature names.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username_or_email: &str, password: String) -> ServiceResult<LoginView> {
        let bad_credentials = || ServiceError::BadRequest(MSG_BAD_CREDENTIALS.to_string());

        let user = self
            .stores
            .users
            .find_by_login(username_or_email)
            .await
            .map_err(|e| ServiceError::from_read(Entity::User, e))?
            .ok_or_else(bad_credentials)?;

        if !verify_blocking(password, user.password_hash.clone()).await? {
            return Err(bad_credentials());
        }

        let role = self
            .stores
            .roles
            .get(user.role_id)
            .await
            .map_err(|e| ServiceError::from_read(Entity::Role, e))?
            .ok_or_else(|| ServiceError::Internal(format!("role {} of user {} missing", user.role_id, user.id)))?;
        let features = self
            .stores
            .roles
            .features(role.id)
            .await
            .map_err(|e| ServiceError::from_read(Entity::Role, e))?;

        let subject = TokenSubject {
            user: UserIdentity {
                id: user.id,
                name: user.name.clone(),
                role_id: role.id,
            },
            role: RoleIdentity {
                id: role.id,
                name: role.name.clone(),
                is_administrative: role.is_administrative,
            },
            features: features.into_iter().map(|f| FeatureName::new(f.name)).collect(),
        };

        let now = Utc::now();
        let token = self
            .tokens
            .issue(&subject, now)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        info!(user_id = %user.id, role = %role.name, "user logged in");
        Ok(LoginView {
            login_at: now,
            user: user.name,
            role: role.name,
            token: format!("Bearer {token}"),
        })
    }
}
