use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    Json,
    async_trait,
    extract::{FromRequest, OriginalUri, Request},
    routing::MethodRouter,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use eproc_core::{ListQuery, Ordering, PageRequest};

use crate::app::errors::ServiceError;
use crate::app::services::ListRequest;
use crate::middleware::{RouteGuard, require_features};

/// Attach a route guard to one method route.
pub fn guarded(route: MethodRouter, guard: RouteGuard) -> MethodRouter {
    route.route_layer(axum::middleware::from_fn_with_state(guard, require_features))
}

/// Parse an `:id` path segment.
pub fn parse_id<T: FromStr>(raw: &str) -> Result<T, ServiceError> {
    raw.parse().map_err(|_| ServiceError::InvalidId)
}

/// Pagination and ordering from the query string.
pub fn list_request(
    params: &HashMap<String, String>,
    uri: &OriginalUri,
    sortable: &[&'static str],
) -> ListRequest {
    let param = |name: &str| params.get(name).map(String::as_str);
    let page = PageRequest::from_params(param("page"), param("limit"));
    let ordering = Ordering::resolve(param("order_by"), param("order"), sortable);
    ListRequest::new(ListQuery::new(page, ordering), uri.0.path())
}

/// An optional typed filter; present but unparsable is an error.
pub fn filter<T: FromStr>(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<T>, ServiceError> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ServiceError::InvalidParam(name)),
    }
}

pub fn bool_filter(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<bool>, ServiceError> {
    match params.get(name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(_) => Err(ServiceError::InvalidParam(name)),
    }
}

/// JSON body whose decode failure answers 400 "Invalid Input".
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(reason = %rejection.body_text(), "request body rejected");
                Err(ServiceError::InvalidInput)
            }
        }
    }
}
