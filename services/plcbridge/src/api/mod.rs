//! HTTP surface
//!
//! Thin axum layer over the core: request parsing, status mapping and the
//! shared response envelope. No controller logic lives here.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use routes::{create_api_routes, AppState};
