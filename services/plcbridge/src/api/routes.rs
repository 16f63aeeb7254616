//! API route configuration

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::handlers::{
    control_station, get_service_status, get_station_data, health_check, list_stations,
    read_servo, write_servo,
};
use crate::core::access::RegisterAccess;
use crate::core::config::AppConfig;
use crate::core::dispatch::CommandDispatcher;
use crate::core::servo::ServoBridge;
use crate::core::store::StateStore;

/// Shared handles for every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub access: Arc<RegisterAccess>,
    pub store: Arc<StateStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub servo: Arc<ServoBridge>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at)
            .num_seconds()
            .max(0)
            .try_into()
            .unwrap_or(0)
    }
}

/// Build the full router
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_service_status))
        .route("/api/stations", get(list_stations))
        // stations and the servo share the `{id}` segment
        .route("/api/{id}/data", get(get_station_data))
        .route("/api/{id}/control", post(control_station))
        .route("/api/{id}/read", get(read_servo))
        .route("/api/{id}/write", post(write_servo))
        .layer(middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}
