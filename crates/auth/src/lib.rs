//! `eproc-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it mints and
//! verifies credentials, decides feature-based access and applies the
//! self-or-admin ownership rule. Callers supply identities and the clock.

pub mod authorize;
pub mod claims;
pub mod ownership;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod token;

pub use authorize::{AuthorizationExplanation, AuthzError, RequiredFeatures, authorize, explain_authorization};
pub use claims::{Claims, TokenValidationError, validate_claims};
pub use ownership::{OwnershipAction, ensure_self_or_admin};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::{FeatureName, catalog};
pub use principal::{RoleIdentity, TokenSubject, UserIdentity};
pub use token::{Hs256JwtValidator, JwtValidator, TokenError, TokenIssuer};
