//! Response envelope and the service error taxonomy.
//!
//! Every response, success or failure, has the shape
//! `{"success": bool, "message": string, "data": <payload|{}>}` where
//! `success` is true exactly for 200 and 201.

use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use eproc_core::FieldErrors;
use eproc_infra::StoreError;

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A successful (or at least non-error) response carrying a typed payload.
#[derive(Debug)]
pub struct Envelope<T> {
    status: StatusCode,
    message: Cow<'static, str>,
    data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self {
            status,
            message: message.into(),
            data,
        }
    }

    pub fn ok(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self::new(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self::new(StatusCode::CREATED, message, data)
    }
}

/// Serialises as `{}`.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct Empty {}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let data = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => return ServiceError::Internal(format!("serialize payload: {e}")).into_response(),
        };
        envelope(self.status, &self.message, data)
    }
}

/// Build the JSON envelope for any status.
pub fn envelope(status: StatusCode, message: &str, data: Value) -> Response {
    let success = status == StatusCode::OK || status == StatusCode::CREATED;
    (
        status,
        Json(json!({
            "success": success,
            "message": message,
            "data": data,
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, message: impl AsRef<str>) -> Response {
    envelope(status, message.as_ref(), json!({}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// The resources the API exposes; drives the standard response messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Entity {
    Module,
    Feature,
    Role,
    User,
    VehicleType,
    Vehicle,
    Loan,
}

impl Entity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Module => "Module",
            Self::Feature => "Feature",
            Self::Role => "Role",
            Self::User => "User",
            Self::VehicleType => "Vehicle Type",
            Self::Vehicle => "Vehicle",
            Self::Loan => "Loan",
        }
    }

    pub fn listed(&self) -> String {
        format!("Success Getting All {} Data", self.label())
    }

    pub fn fetched(&self) -> String {
        format!("Success Getting {} Data", self.label())
    }

    pub fn created(&self) -> String {
        format!("{} Created Successfully", self.label())
    }

    pub fn updated(&self) -> String {
        format!("{} Updated Successfully", self.label())
    }

    pub fn deleted(&self) -> String {
        format!("{} Deleted Successfully", self.label())
    }

    pub fn not_found(&self) -> ServiceError {
        ServiceError::NotFound(format!("{} not found", self.label()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service errors
// ─────────────────────────────────────────────────────────────────────────────

pub const MSG_INVALID_INPUT: &str = "Invalid Input";
pub const MSG_INVALID_ID: &str = "Invalid ID";
pub const MSG_INVALID_DATA: &str = "Error Invalid Data";
pub const MSG_DUPLICATE: &str = "Error Duplicate Data";
pub const MSG_INTERNAL: &str = "Internal Server Error";
pub const MSG_VEHICLE_UNAVAILABLE: &str = "Vehicle Not Available";
pub const MSG_LOAN_RETURNED: &str = "Loan already returned";

/// Failure variant of every service operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request body could not be decoded.
    #[error("Invalid Input")]
    InvalidInput,

    #[error("Invalid ID")]
    InvalidId,

    /// An unparsable query parameter; carries the parameter name.
    #[error("Invalid {0}")]
    InvalidParam(&'static str),

    /// Field validation or referential failure.
    #[error("Error Invalid Data: {0}")]
    Validation(FieldErrors),

    /// Field-scoped failure reported with its own message (password rules).
    #[error("{message}: {errors}")]
    Rejected {
        message: &'static str,
        errors: FieldErrors,
    },

    #[error("Error Duplicate Data: {0}")]
    Duplicate(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Storage or other system failure; the detail is only logged.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput
            | Self::InvalidId
            | Self::InvalidParam(_)
            | Self::Validation(_)
            | Self::Rejected { .. }
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    /// Map a storage failure of a write on `entity`.
    ///
    /// `duplicate` turns the violated index name into the field-scoped
    /// messages the pre-check would have produced.
    pub fn from_store(
        entity: Entity,
        err: StoreError,
        duplicate: impl FnOnce(&str) -> FieldErrors,
    ) -> Self {
        match err {
            StoreError::Conflict(index) => Self::Duplicate(duplicate(&index)),
            other => Self::from_read(entity, other),
        }
    }

    /// Map a storage failure where no unique index is involved.
    pub fn from_read(entity: Entity, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => entity.not_found(),
            StoreError::VehicleUnavailable(_) => Self::NotFound(MSG_VEHICLE_UNAVAILABLE.into()),
            StoreError::AlreadyReturned(_) => Self::BadRequest(MSG_LOAN_RETURNED.into()),
            StoreError::Conflict(index) => Self::Internal(format!("unexpected conflict on {index}")),
            StoreError::Storage(detail) => Self::Internal(detail),
        }
    }
}

impl From<FieldErrors> for ServiceError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => {
                envelope(status, MSG_INVALID_DATA, json!({ "errors": errors }))
            }
            Self::Rejected { message, errors } => {
                envelope(status, message, json!({ "errors": errors }))
            }
            Self::Duplicate(errors) => envelope(status, MSG_DUPLICATE, json!({ "errors": errors })),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json_error(status, MSG_INTERNAL)
            }
            Self::InvalidInput
            | Self::InvalidId
            | Self::InvalidParam(_)
            | Self::BadRequest(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::NotFound(_) => json_error(status, self.to_string()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
