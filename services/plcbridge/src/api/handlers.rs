//! Request handlers
//!
//! Each handler validates its input, calls one core operation and wraps the
//! result in `SuccessResponse`. Errors leave through `AppError`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use common::{AppError, SuccessResponse};
use tracing::warn;

use super::dto::{
    ControlAck, ControlRequest, HealthStatus, ServiceStatus, ServoWriteRequest, ServoWriteResult,
    StationData, StationList, TIMESTAMP_FORMAT,
};
use super::routes::AppState;
use crate::core::servo::ServoReading;
use crate::core::store::bit_windows;
use crate::error::BridgeError;

/// @route GET /health
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<HealthStatus>>, AppError> {
    Ok(Json(SuccessResponse::new(HealthStatus {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })))
}

/// @route GET /api/status
pub async fn get_service_status(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<ServiceStatus>>, AppError> {
    Ok(Json(SuccessResponse::new(ServiceStatus {
        service: state.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
        uptime_seconds: state.uptime_seconds(),
        simulated: state.config.plc.simulate,
        stations: state.config.stations.len(),
        plc: state.access.status(),
    })))
}

/// @route GET /api/stations
pub async fn list_stations(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<StationList>>, AppError> {
    Ok(Json(SuccessResponse::new(StationList {
        stations: state.config.stations.iter().map(|s| s.id.clone()).collect(),
        servo: state.servo.id().to_string(),
    })))
}

/// Latest snapshot of one station
///
/// @route GET /api/{station}/data
/// @status 200 - Snapshot
/// @status 404 - Unknown station
/// @status 503 - No successful read yet
pub async fn get_station_data(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<SuccessResponse<StationData>>, AppError> {
    let (Some(config), Some(snapshot)) =
        (state.config.station(&station), state.store.snapshot(&station))
    else {
        return Err(BridgeError::station_not_found(&station).into());
    };

    let Some(updated_at) = snapshot.updated_at else {
        return Err(AppError::service_unavailable("No data yet"));
    };

    let (bits1, bits2, bits_timestamp) = if config.bits.is_some() {
        let (first, second) = bit_windows(snapshot.bits.as_deref());
        let stamp = snapshot
            .bits_updated_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string());
        (Some(first), Some(second), stamp)
    } else {
        (None, None, None)
    };

    Ok(Json(SuccessResponse::new(StationData {
        station,
        values: snapshot.values,
        timestamp: updated_at.format(TIMESTAMP_FORMAT).to_string(),
        bits1,
        bits2,
        bits_timestamp,
    })))
}

/// Queue a momentary pulse for a station action or global button
///
/// @route POST /api/{station}/control
/// @input Json: {"action": "start"}
/// @status 200 - Pulse queued
/// @status 400 - Missing or unknown action
/// @status 404 - Unknown station
/// @status 503 - Command queue full
pub async fn control_station(
    State(state): State<AppState>,
    Path(station): Path<String>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<ControlAck>>, AppError> {
    if state.config.station(&station).is_none() {
        return Err(BridgeError::station_not_found(&station).into());
    }

    let action = match body {
        Ok(Json(ControlRequest {
            action: Some(action),
        })) if !action.trim().is_empty() => action,
        Ok(_) => return Err(AppError::bad_request("Missing action parameter")),
        Err(rejection) => {
            return Err(
                AppError::bad_request("Missing action parameter").with_details(rejection.body_text())
            );
        },
    };

    let ack = state.dispatcher.dispatch(&station, &action)?;
    Ok(Json(SuccessResponse::new(ControlAck {
        station: ack.station,
        action: ack.action,
        address: ack.address,
    })))
}

fn require_servo(state: &AppState, device: &str) -> Result<(), AppError> {
    if device == state.servo.id() {
        Ok(())
    } else {
        Err(AppError::not_found(format!("Unknown servo device: {}", device)))
    }
}

/// Fresh read of the servo window
///
/// @route GET /api/{device}/read
/// @status 200 - {values, position, speed}
/// @status 404 - Not the configured servo
/// @status 502 - Controller unreachable
pub async fn read_servo(
    State(state): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<SuccessResponse<ServoReading>>, AppError> {
    require_servo(&state, &device)?;
    let reading = state.servo.read().await.map_err(|e| {
        warn!("Servo {device} read failed: {e}");
        AppError::from(e)
    })?;
    Ok(Json(SuccessResponse::new(reading)))
}

/// Write the whole servo window
///
/// @route POST /api/{device}/write
/// @input Json: {"values": [20 integers]}
/// @status 200 - Written
/// @status 400 - Malformed payload
/// @status 502 - Controller unreachable
pub async fn write_servo(
    State(state): State<AppState>,
    Path(device): Path<String>,
    body: Result<Json<ServoWriteRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<ServoWriteResult>>, AppError> {
    require_servo(&state, &device)?;

    let expected = state.config.servo.write_count;
    let malformed = || {
        AppError::bad_request(format!("Expected {} integers in 'values'", expected))
    };
    let Json(request) = body.map_err(|rejection| malformed().with_details(rejection.body_text()))?;
    let values = request.integers().ok_or_else(malformed)?;

    state.servo.write(&values).await.map_err(|e| {
        if e.is_link_failure() {
            warn!("Servo {device} write failed: {e}");
        }
        AppError::from(e)
    })?;

    Ok(Json(SuccessResponse::new(ServoWriteResult {
        servo: device,
        address: state.config.servo.write_base,
        written: values,
    })))
}
