//! HTTP API: routing, middleware, services and request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;
