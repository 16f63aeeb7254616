//! Request and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::access::AccessStatus;
use crate::core::mc::DeviceAddress;
use crate::core::store::BIT_WINDOW;

/// Format used for snapshot timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub simulated: bool,
    pub stations: usize,
    pub plc: AccessStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationList {
    pub stations: Vec<String>,
    pub servo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationData {
    pub station: String,
    pub values: BTreeMap<String, i16>,
    pub timestamp: String,
    /// First bit window (positions 0..15), for stations with a bit range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits1: Option<[bool; BIT_WINDOW]>,
    /// Second bit window (positions 15..30)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits2: Option<[bool; BIT_WINDOW]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlAck {
    pub station: String,
    pub action: String,
    pub address: DeviceAddress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServoWriteRequest {
    /// Kept loose so type errors become a validation message, not a
    /// deserializer rejection
    #[serde(default)]
    pub values: Option<Vec<serde_json::Value>>,
}

impl ServoWriteRequest {
    /// Every element as an integer, or `None` if any element is not one
    pub fn integers(&self) -> Option<Vec<i64>> {
        self.values
            .as_ref()?
            .iter()
            .map(serde_json::Value::as_i64)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServoWriteResult {
    pub servo: String,
    pub address: DeviceAddress,
    pub written: Vec<i64>,
}
