//! Shared plumbing for the bridge services
//!
//! - logging bootstrap and HTTP access logging
//! - API response envelopes and the axum error type
//! - graceful shutdown signal handling

pub mod api_types;
pub mod logging;
pub mod serde_helpers;
pub mod shutdown;

pub use api_types::{AppError, ErrorInfo, ErrorResponse, SuccessResponse};
