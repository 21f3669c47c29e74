//! Token Issuer and Verifier (HS256).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use thiserror::Error;

use crate::claims::{Claims, TokenValidationError, validate_claims};
use crate::TokenSubject;

/// Why a credential was refused or could not be minted.
///
/// The `Display` text of the verification variants is exactly what the
/// authentication gate returns to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    /// Any other decode/validation failure; the detail is for logs only.
    #[error("Invalid token")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Diagnostic detail for logs (never sent to clients).
    pub fn detail(&self) -> &str {
        match self {
            Self::Malformed(detail) | Self::Signing(detail) => detail,
            Self::InvalidSignature => "signature mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
        }
    }
}

impl From<TokenValidationError> for TokenError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => Self::Expired,
            TokenValidationError::NotYetValid => Self::NotYetValid,
        }
    }
}

/// Verifies a presented credential and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError>;
}

/// HMAC-SHA256 verifier over a shared secret.
///
/// Time checks are done by [`validate_claims`] against the caller's clock
/// rather than inside `jsonwebtoken`, so they are deterministic in tests.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "nbf"]);

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(e.to_string()),
        })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Mints signed credentials.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    /// Non-positive `ttl_hours` falls back to [`Self::DEFAULT_TTL_HOURS`].
    pub fn new(secret: impl AsRef<[u8]>, ttl_hours: i64) -> Self {
        let hours = if ttl_hours > 0 {
            ttl_hours
        } else {
            Self::DEFAULT_TTL_HOURS
        };
        Self {
            key: EncodingKey::from_secret(secret.as_ref()),
            ttl: Duration::hours(hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &TokenSubject, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims::for_subject(subject, now, self.ttl);
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use eproc_core::{RoleId, UserId};

    use super::*;
    use crate::{FeatureName, RoleIdentity, UserIdentity};

    const SECRET: &str = "unit-test-secret";

    fn subject(features: &[&'static str]) -> TokenSubject {
        TokenSubject {
            user: UserIdentity {
                id: UserId::new(5),
                name: "Jane".into(),
                role_id: RoleId::new(3),
            },
            role: RoleIdentity {
                id: RoleId::new(3),
                name: "Staff".into(),
                is_administrative: false,
            },
            features: features.iter().copied().map(FeatureName::from_static).collect(),
        }
    }

    #[test]
    fn issued_token_carries_granted_feature_names() {
        let issuer = TokenIssuer::new(SECRET, 24);
        let verifier = Hs256JwtValidator::new(SECRET);
        let granted = ["View Role", "Create Role", "Delete User"];
        let now = Utc::now();

        let token = issuer.issue(&subject(&granted), now).unwrap();
        let claims = verifier.validate(&token, now).unwrap();

        let got: HashSet<&str> = claims.features.iter().map(FeatureName::as_str).collect();
        let want: HashSet<&str> = granted.into_iter().collect();
        assert_eq!(got, want);
        assert_eq!(claims.user_id, UserId::new(5));
        assert_eq!(claims.role, "Staff");
    }

    #[test]
    fn wrong_key_is_invalid_token() {
        let token = TokenIssuer::new("other-secret", 1)
            .issue(&subject(&[]), Utc::now())
            .unwrap();
        let err = Hs256JwtValidator::new(SECRET)
            .validate(&token, Utc::now())
            .unwrap_err();
        assert_eq!(err, TokenError::InvalidSignature);
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn expiry_is_checked_even_with_valid_signature() {
        let issued = Utc::now() - Duration::hours(2);
        let token = TokenIssuer::new(SECRET, 1).issue(&subject(&[]), issued).unwrap();
        let err = Hs256JwtValidator::new(SECRET)
            .validate(&token, Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Token has expired");
    }

    #[test]
    fn not_before_in_future() {
        let issued = Utc::now() + Duration::minutes(30);
        let token = TokenIssuer::new(SECRET, 1).issue(&subject(&[]), issued).unwrap();
        let err = Hs256JwtValidator::new(SECRET)
            .validate(&token, Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Token is not valid yet");
    }

    #[test]
    fn garbage_is_invalid_token() {
        let err = Hs256JwtValidator::new(SECRET)
            .validate("not.a.jwt", Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn bad_ttl_defaults_to_a_day() {
        assert_eq!(TokenIssuer::new(SECRET, 0).ttl(), Duration::hours(24));
        assert_eq!(TokenIssuer::new(SECRET, -4).ttl(), Duration::hours(24));
        assert_eq!(TokenIssuer::new(SECRET, 2).ttl(), Duration::hours(2));
    }
}
