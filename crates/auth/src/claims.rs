use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eproc_core::{RoleId, UserId};

use crate::{FeatureName, RoleIdentity, TokenSubject, UserIdentity};

/// JWT claims model.
///
/// Field names are the wire format; `exp`/`iat`/`nbf` are the registered
/// claims in seconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub role_id: RoleId,
    /// Display name of the user.
    pub user: String,
    /// Name of the role.
    pub role: String,
    pub is_administrative: bool,
    /// Snapshot of the role's granted features at issue time.
    pub features: Vec<FeatureName>,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

impl Claims {
    /// Claims for `subject`, valid from `now` for `ttl`.
    pub fn for_subject(subject: &TokenSubject, now: DateTime<Utc>, ttl: Duration) -> Self {
        let issued = now.timestamp();
        Self {
            user_id: subject.user.id,
            role_id: subject.role.id,
            user: subject.user.name.clone(),
            role: subject.role.name.clone(),
            is_administrative: subject.role.is_administrative,
            features: subject.features.clone(),
            exp: (now + ttl).timestamp(),
            iat: issued,
            nbf: issued,
        }
    }

    pub fn user_identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.user_id,
            name: self.user.clone(),
            role_id: self.role_id,
        }
    }

    pub fn role_identity(&self) -> RoleIdentity {
        RoleIdentity {
            id: self.role_id,
            name: self.role.clone(),
            is_administrative: self.is_administrative,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (nbf is in the future)")]
    NotYetValid,
}

/// Deterministically validate the time window of `claims` at `now`.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// [`crate::token`] before this runs.
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    if now < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user: UserIdentity {
                id: UserId::new(5),
                name: "Jane".into(),
                role_id: RoleId::new(2),
            },
            role: RoleIdentity {
                id: RoleId::new(2),
                name: "Staff".into(),
                is_administrative: false,
            },
            features: vec![FeatureName::from_static("View User")],
        }
    }

    #[test]
    fn window_is_issue_time_plus_ttl() {
        let now = Utc::now();
        let claims = Claims::for_subject(&subject(), now, Duration::hours(24));
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.nbf, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 24 * 3600);
        assert!(validate_claims(&claims, now).is_ok());
    }

    #[test]
    fn expired_and_not_yet_valid() {
        let now = Utc::now();
        let claims = Claims::for_subject(&subject(), now, Duration::minutes(10));

        assert_eq!(
            validate_claims(&claims, now + Duration::minutes(11)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims, now - Duration::minutes(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn identities_round_out_of_claims() {
        let claims = Claims::for_subject(&subject(), Utc::now(), Duration::hours(1));
        assert_eq!(claims.user_identity(), subject().user);
        assert_eq!(claims.role_identity(), subject().role);
    }

    #[test]
    fn wire_field_names() {
        let claims = Claims::for_subject(&subject(), Utc::now(), Duration::hours(1));
        let json = serde_json::to_value(&claims).unwrap();
        for key in ["user_id", "role_id", "user", "role", "is_administrative", "features", "exp", "iat", "nbf"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["features"][0], "View User");
    }
}
