//! Error handling for the PLC bridge
//!
//! Transport-level failures (`ConnectionError`, `TransportError`) are absorbed by
//! the guarded register access layer and surface to callers only as a failed
//! outcome. Validation failures reach the HTTP boundary unchanged.

use thiserror::Error;

/// PLC bridge error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No session could be established with the controller
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A request/reply exchange failed on a live session
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Bad caller input (malformed payload, bad address, wrong count)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Station id is not configured
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// Action name resolves to no bit address for this station
    #[error("Unknown action '{action}' for station {station}")]
    UnknownAction { station: String, action: String },

    /// Resource exhausted (command queue full)
    #[error("Resource error: {0}")]
    ResourceError(String),

    /// Component used in the wrong lifecycle state
    #[error("State error: {0}")]
    StateError(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type alias for the PLC bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn connection(msg: impl Into<String>) -> Self {
        BridgeError::ConnectionError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        BridgeError::TransportError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BridgeError::ValidationError(msg.into())
    }

    pub fn station_not_found(id: impl std::fmt::Display) -> Self {
        BridgeError::StationNotFound(id.to_string())
    }

    pub fn unknown_action(station: impl Into<String>, action: impl Into<String>) -> Self {
        BridgeError::UnknownAction {
            station: station.into(),
            action: action.into(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        BridgeError::ResourceError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BridgeError::StateError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::ConfigError(msg.into())
    }

    /// Whether the failure came from the controller link rather than the caller
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionError(_) | BridgeError::TransportError(_)
        )
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::IoError(err.to_string())
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::ConfigError(err.to_string())
    }
}

// ============================================================================
// API Adaptation: BridgeError → AppError conversion
// ============================================================================

impl From<BridgeError> for common::AppError {
    fn from(err: BridgeError) -> Self {
        use common::AppError;

        let message = err.to_string();
        match err {
            BridgeError::ValidationError(_) | BridgeError::UnknownAction { .. } => {
                AppError::bad_request(message)
            },
            BridgeError::StationNotFound(_) => AppError::not_found(message),
            BridgeError::ResourceError(_) => AppError::service_unavailable(message),
            BridgeError::ConnectionError(_) | BridgeError::TransportError(_) => {
                AppError::bad_gateway(message)
            },
            BridgeError::StateError(_) | BridgeError::ConfigError(_) | BridgeError::IoError(_) => {
                AppError::internal_error(message)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_link_failures() {
        assert!(BridgeError::connection("refused").is_link_failure());
        assert!(BridgeError::transport("reset").is_link_failure());
        assert!(!BridgeError::validation("bad").is_link_failure());
    }

    #[test]
    fn test_app_error_status_mapping() {
        let cases = [
            (BridgeError::validation("x"), StatusCode::BAD_REQUEST),
            (
                BridgeError::unknown_action("station1", "jump"),
                StatusCode::BAD_REQUEST,
            ),
            (
                BridgeError::station_not_found("station9"),
                StatusCode::NOT_FOUND,
            ),
            (BridgeError::resource("full"), StatusCode::SERVICE_UNAVAILABLE),
            (BridgeError::connection("down"), StatusCode::BAD_GATEWAY),
            (BridgeError::transport("reset"), StatusCode::BAD_GATEWAY),
            (BridgeError::state("unbound"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let app: common::AppError = err.into();
            assert_eq!(app.status, status);
        }
    }

    #[test]
    fn test_unknown_action_message() {
        let err = BridgeError::unknown_action("station2", "launch");
        assert_eq!(
            err.to_string(),
            "Unknown action 'launch' for station station2"
        );
    }
}
