use axum::Router;

pub mod auth;
pub mod common;
pub mod features;
pub mod loans;
pub mod modules;
pub mod roles;
pub mod system;
pub mod users;
pub mod vehicle_types;
pub mod vehicles;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/api/v1/accesses/modules", modules::router())
        .nest("/api/v1/accesses/features", features::router())
        .nest("/api/v1/accesses/roles", roles::router())
        .nest("/api/v1/accesses/users", users::router())
        .nest("/api/v1/vehicles/types", vehicle_types::router())
        .nest("/api/v1/vehicles", vehicles::router())
        .nest("/api/v1/loans", loans::router())
}
