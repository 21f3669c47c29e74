//! `eproc-core` — shared building blocks for the procurement backend.
//!
//! This crate contains **pure** primitives (no storage, no HTTP): typed record
//! identifiers, field-level validation and list/pagination helpers.

pub mod error;
pub mod id;
pub mod paging;
pub mod validation;

pub use error::DomainError;
pub use id::{FeatureId, LoanId, ModuleId, RoleId, UserId, VehicleId, VehicleTypeId};
pub use paging::{ListQuery, Ordering, Page, PageRequest, SortDirection};
pub use validation::FieldErrors;
