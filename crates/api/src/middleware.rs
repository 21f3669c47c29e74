use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use eproc_auth::{
    JwtValidator, OwnershipAction, RequiredFeatures, authorize, ensure_self_or_admin,
    explain_authorization,
};
use eproc_core::UserId;

use crate::app::errors::{MSG_INTERNAL, ServiceError, json_error};
use crate::context::{FeatureContext, RequestId, RoleContext, UserContext};

pub const MSG_TOKEN_MISSING: &str = "Authorization token not provided";

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Verify the bearer token and attach the caller's identity, role and
/// features to the request. No storage access happens here.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(reason = e.detail(), "token rejected");
            return ServiceError::Unauthorized(e.to_string()).into_response();
        }
    };

    req.extensions_mut()
        .insert(UserContext::new(claims.user_identity()));
    req.extensions_mut()
        .insert(RoleContext::new(claims.role_identity()));
    req.extensions_mut()
        .insert(FeatureContext::new(claims.features));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ServiceError> {
    let missing = || ServiceError::Unauthorized(MSG_TOKEN_MISSING.to_string());

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(missing)?;

    let header = header.to_str().map_err(|_| missing())?;

    let token = header.strip_prefix("Bearer ").ok_or_else(missing)?.trim();
    if token.is_empty() {
        return Err(missing());
    }

    Ok(token)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization
// ─────────────────────────────────────────────────────────────────────────────

/// Per-route authorization: the features that admit a caller (any one is
/// enough) and, optionally, the self-or-admin rule against the `:id` path
/// parameter.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    required: Arc<RequiredFeatures>,
    ownership: Option<OwnershipAction>,
}

impl RouteGuard {
    pub fn any_of(features: &[&'static str]) -> Self {
        Self {
            required: Arc::new(RequiredFeatures::any_of(features.iter().copied())),
            ownership: None,
        }
    }

    /// Authentication only.
    pub fn authenticated() -> Self {
        Self {
            required: Arc::new(RequiredFeatures::none()),
            ownership: None,
        }
    }

    /// Also require the caller to be the target user or an administrator.
    pub fn self_or_admin(mut self, action: OwnershipAction) -> Self {
        self.ownership = Some(action);
        self
    }
}

pub async fn require_features(
    State(guard): State<RouteGuard>,
    req: Request,
    next: Next,
) -> Response {
    let Some(features) = req.extensions().get::<FeatureContext>() else {
        return ServiceError::Unauthorized(MSG_TOKEN_MISSING.to_string()).into_response();
    };

    if let Err(e) = authorize(features.features(), &guard.required) {
        let explained = explain_authorization(features.features(), &guard.required);
        debug!(reason = %explained.reason, required = ?explained.required, "route refused");
        return ServiceError::Forbidden(e.to_string()).into_response();
    }

    let Some(action) = guard.ownership else {
        return next.run(req).await;
    };

    let (mut parts, body) = req.into_parts();
    let target = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
        Ok(Path(params)) => params.get("id").and_then(|raw| raw.parse::<UserId>().ok()),
        Err(_) => None,
    };
    let Some(target) = target else {
        return ServiceError::InvalidId.into_response();
    };

    let (Some(user), Some(role)) = (
        parts.extensions.get::<UserContext>(),
        parts.extensions.get::<RoleContext>(),
    ) else {
        return ServiceError::Unauthorized(MSG_TOKEN_MISSING.to_string()).into_response();
    };
    if let Err(e) = ensure_self_or_admin(user.identity(), role.identity(), target, action) {
        return ServiceError::Forbidden(e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Operational
// ─────────────────────────────────────────────────────────────────────────────

/// Take `X-Request-ID` from the request or mint one, and echo it back.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    req.extensions_mut().insert(RequestId::new(id.clone()));
    let mut res = next.run(req).await;

    match HeaderValue::from_str(&id) {
        Ok(value) => {
            res.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }
        Err(_) => warn!(request_id = %id, "request id is not a valid header value"),
    }
    res
}

/// Panic containment: log the payload, answer with a generic 500.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "handler panicked");
    json_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_literal() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("bearer abc"),
        );
        assert_eq!(
            extract_bearer(&headers).unwrap_err(),
            ServiceError::Unauthorized(MSG_TOKEN_MISSING.into())
        );

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi");

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer   "),
        );
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn panic_payloads_are_described() {
        let res = handle_panic(Box::new("boom"));
        assert_eq!(res.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
