//! Transport Layer
//!
//! A `Connector` opens sessions; a `PlcSession` carries one request/reply
//! exchange at a time against the controller. Callers never share a session
//! directly: the guarded access layer owns it.

pub mod simulator;
pub mod tcp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mc::DeviceAddress;
use crate::error::BridgeError;

pub use simulator::SimulatedPlc;
pub use tcp::McConnector;

/// Transport layer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Session was closed or never opened
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// IO error on a live connection
    #[error("IO error: {0}")]
    IoError(String),

    /// Malformed or unexpected response
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Controller answered with a non-zero end code
    #[error("Controller end code 0x{0:04X}")]
    EndCode(u16),

    /// Request rejected before anything was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether the session must be torn down after this error
    pub fn breaks_session(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::IoError(err.to_string())
    }
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionFailed(msg) => BridgeError::ConnectionError(msg),
            TransportError::NotConnected => BridgeError::connection("not connected"),
            TransportError::InvalidRequest(msg) => BridgeError::ValidationError(msg),
            other => BridgeError::TransportError(other.to_string()),
        }
    }
}

/// Connectivity state of the controller link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// No session and the post-failure cool-down is still running
    CoolingDown,
}

/// One live link to the controller
#[async_trait]
pub trait PlcSession: Send {
    async fn read_words(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<u16>, TransportError>;

    async fn read_bits(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<bool>, TransportError>;

    async fn write_words(
        &mut self,
        head: &DeviceAddress,
        values: &[u16],
    ) -> Result<(), TransportError>;

    async fn write_bits(
        &mut self,
        head: &DeviceAddress,
        values: &[bool],
    ) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Close the link; idempotent, errors are swallowed
    async fn close(&mut self);
}

/// Factory for sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16)
        -> Result<Box<dyn PlcSession>, TransportError>;
}
