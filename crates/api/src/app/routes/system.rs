use axum::http::StatusCode;
use axum::response::Response;

use crate::app::errors::{Empty, Envelope, json_error};

pub const MSG_ROUTE_NOT_FOUND: &str = "Resource not found";

pub async fn health() -> Envelope<Empty> {
    Envelope::ok("OK", Empty {})
}

pub async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, MSG_ROUTE_NOT_FOUND)
}
