//! Service configuration
//!
//! Layered with figment: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `PLCBRIDGE_` environment variables (`__` separates nesting,
//! e.g. `PLCBRIDGE_PLC__HOST=10.0.0.5`).

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::mc::frame::{MAX_BIT_POINTS, MAX_WORD_POINTS};
use super::mc::{DeviceAddress, DeviceType};
use crate::error::{BridgeError, Result};

pub const ENV_PREFIX: &str = "PLCBRIDGE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub plc: PlcConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,
    /// Global buttons, consulted after the station's own actions
    #[serde(default = "default_buttons")]
    pub buttons: BTreeMap<String, DeviceAddress>,
    #[serde(default)]
    pub servo: ServoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "plcbridge".to_string(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
    /// Also write a daily-rolling log file under `dir`
    #[serde(default = "common::serde_helpers::bool_false")]
    pub file: bool,
    #[serde(default = "common::serde_helpers::bool_false")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: false,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    pub host: String,
    pub port: u16,
    /// Connect and per-exchange timeout
    pub timeout_ms: u64,
    /// Back-off after a failed exchange
    pub reconnect_cooldown_ms: u64,
    /// Talk to the in-memory controller instead of the network
    #[serde(default = "common::serde_helpers::bool_false")]
    pub simulate: bool,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            host: "192.168.3.250".to_string(),
            port: 5000,
            timeout_ms: 4000,
            reconnect_cooldown_ms: 3000,
            simulate: false,
        }
    }
}

impl PlcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay after each completed cycle
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 3000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub pulse_dwell_ms: u64,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pulse_dwell_ms: 1000,
            queue_capacity: 32,
        }
    }
}

impl DispatchConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.pulse_dwell_ms)
    }
}

/// Contiguous bit devices read for one station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRange {
    pub base: DeviceAddress,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    /// First word register; `registers[i]` is read from `base + i`
    pub base: DeviceAddress,
    pub registers: Vec<String>,
    #[serde(default)]
    pub bits: Option<BitRange>,
    #[serde(default)]
    pub actions: BTreeMap<String, DeviceAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoConfig {
    pub id: String,
    pub read_base: DeviceAddress,
    pub read_count: usize,
    pub write_base: DeviceAddress,
    pub write_count: usize,
    /// Low word of the position pair; the high word follows it
    pub position_index: usize,
    /// Low word of the speed pair; the high word follows it
    pub speed_index: usize,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            id: "servo1".to_string(),
            read_base: register(71),
            read_count: 20,
            write_base: register(51),
            write_count: 20,
            position_index: 5,
            speed_index: 7,
        }
    }
}

fn relay(number: u32) -> DeviceAddress {
    DeviceAddress {
        device: DeviceType::M,
        number,
    }
}

fn register(number: u32) -> DeviceAddress {
    DeviceAddress {
        device: DeviceType::D,
        number,
    }
}

fn default_stations() -> Vec<StationConfig> {
    (0..4u32)
        .map(|i| {
            let base = i * 10;
            let control = 100 + i * 10;
            let actions = ["start", "stop", "reset", "servo_on"]
                .iter()
                .enumerate()
                .map(|(offset, name)| (name.to_string(), relay(control + offset as u32)))
                .collect();
            StationConfig {
                id: format!("station{}", i + 1),
                base: register(base),
                registers: (base..base + 3).map(|n| format!("D{n}")).collect(),
                bits: (i == 0).then(|| BitRange {
                    base: relay(501),
                    count: 100,
                }),
                actions,
            }
        })
        .collect()
}

fn default_buttons() -> BTreeMap<String, DeviceAddress> {
    (1..=15u32)
        .map(|n| (format!("button{n}"), relay(530 + n)))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            plc: PlcConfig::default(),
            polling: PollingConfig::default(),
            dispatch: DispatchConfig::default(),
            stations: default_stations(),
            buttons: default_buttons(),
            servo: ServoConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from defaults, an optional file and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(BridgeError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| BridgeError::config("Config file has no extension"))?;

            figment = match extension {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(BridgeError::config(format!(
                        "Unsupported config format: {}",
                        extension
                    )));
                },
            };
            debug!("Loading configuration from {}", path.display());
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| BridgeError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn station(&self, id: &str) -> Option<&StationConfig> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.plc.host.trim().is_empty() && !self.plc.simulate {
            return Err(BridgeError::config("plc.host cannot be empty"));
        }
        if self.plc.port == 0 {
            return Err(BridgeError::config("plc.port cannot be zero"));
        }
        if self.plc.timeout_ms == 0 {
            return Err(BridgeError::config("plc.timeout_ms must be greater than zero"));
        }
        if self.polling.interval_ms == 0 {
            return Err(BridgeError::config(
                "polling.interval_ms must be greater than zero",
            ));
        }
        if self.dispatch.pulse_dwell_ms == 0 {
            return Err(BridgeError::config(
                "dispatch.pulse_dwell_ms must be greater than zero",
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(BridgeError::config(
                "dispatch.queue_capacity must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            validate_station(station)?;
            if !seen.insert(station.id.as_str()) {
                return Err(BridgeError::config(format!(
                    "Duplicate station id: {}",
                    station.id
                )));
            }
        }
        if seen.contains(self.servo.id.as_str()) {
            return Err(BridgeError::config(format!(
                "Servo id '{}' collides with a station id",
                self.servo.id
            )));
        }

        for (name, address) in &self.buttons {
            require_bit(address, &format!("button {}", name))?;
        }

        validate_servo(&self.servo)
    }
}

fn require_bit(address: &DeviceAddress, what: &str) -> Result<()> {
    if address.is_bit() {
        Ok(())
    } else {
        Err(BridgeError::config(format!(
            "{} must use a bit device, got {}",
            what, address
        )))
    }
}

fn require_word(address: &DeviceAddress, what: &str) -> Result<()> {
    if address.is_bit() {
        Err(BridgeError::config(format!(
            "{} must use a word device, got {}",
            what, address
        )))
    } else {
        Ok(())
    }
}

fn validate_station(station: &StationConfig) -> Result<()> {
    if station.id.trim().is_empty() {
        return Err(BridgeError::config("Station id cannot be empty"));
    }
    let what = format!("station {}", station.id);

    require_word(&station.base, &what)?;
    if station.registers.is_empty() || station.registers.len() > MAX_WORD_POINTS {
        return Err(BridgeError::config(format!(
            "{} must declare 1..={} registers, got {}",
            what,
            MAX_WORD_POINTS,
            station.registers.len()
        )));
    }
    let mut names = HashSet::new();
    if let Some(dup) = station.registers.iter().find(|n| !names.insert(n.as_str())) {
        return Err(BridgeError::config(format!(
            "{} lists register '{}' twice",
            what, dup
        )));
    }

    if let Some(bits) = &station.bits {
        require_bit(&bits.base, &format!("{} bit range", what))?;
        if bits.count == 0 || bits.count > MAX_BIT_POINTS {
            return Err(BridgeError::config(format!(
                "{} bit range must cover 1..={} bits, got {}",
                what, MAX_BIT_POINTS, bits.count
            )));
        }
    }

    for (action, address) in &station.actions {
        require_bit(address, &format!("{} action {}", what, action))?;
    }
    Ok(())
}

fn validate_servo(servo: &ServoConfig) -> Result<()> {
    if servo.id.trim().is_empty() {
        return Err(BridgeError::config("servo.id cannot be empty"));
    }
    require_word(&servo.read_base, "servo.read_base")?;
    require_word(&servo.write_base, "servo.write_base")?;
    for (count, what) in [
        (servo.read_count, "servo.read_count"),
        (servo.write_count, "servo.write_count"),
    ] {
        if count == 0 || count > MAX_WORD_POINTS {
            return Err(BridgeError::config(format!(
                "{} must be within 1..={}, got {}",
                what, MAX_WORD_POINTS, count
            )));
        }
    }
    for (index, what) in [
        (servo.position_index, "servo.position_index"),
        (servo.speed_index, "servo.speed_index"),
    ] {
        // the high word sits at index + 1
        if index + 1 >= servo.read_count {
            return Err(BridgeError::config(format!(
                "{} {} leaves no high word inside a {}-word read window",
                what, index, servo.read_count
            )));
        }
    }
    Ok(())
}
