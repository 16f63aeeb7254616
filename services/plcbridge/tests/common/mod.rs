//! Shared helpers for plcbridge integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use plcbridge::core::access::{AccessSettings, RegisterAccess};
use plcbridge::core::bootstrap::Bridge;
use plcbridge::core::config::AppConfig;
use plcbridge::core::mc::DeviceAddress;
use plcbridge::core::transport::SimulatedPlc;

pub fn addr(s: &str) -> DeviceAddress {
    s.parse().unwrap()
}

/// Register access over a fresh simulated controller with a 3 s cool-down
pub fn sim_access() -> (SimulatedPlc, Arc<RegisterAccess>) {
    let plc = SimulatedPlc::new();
    let access = Arc::new(RegisterAccess::new(
        Arc::new(plc.clone()),
        AccessSettings {
            host: "sim".to_string(),
            port: 5000,
            cooldown: Duration::from_secs(3),
        },
    ));
    (plc, access)
}

/// Fully assembled bridge with the default station table
pub fn sim_bridge() -> (SimulatedPlc, Bridge) {
    let plc = SimulatedPlc::new();
    let bridge = Bridge::assemble(AppConfig::default(), Arc::new(plc.clone())).unwrap();
    (plc, bridge)
}
