//! Shared state store
//!
//! Latest known register values per station. The poller is the only writer;
//! HTTP handlers copy snapshots out under a short read lock. Each replace swaps
//! a whole batch at once, so a reader never sees values from two cycles mixed.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::config::StationConfig;
use crate::error::{BridgeError, Result};

/// Width of each presentation window over a station's bit array
pub const BIT_WINDOW: usize = 15;

/// Last successful reads for one station
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    /// Register name to value, in the controller's signed INT view
    pub values: BTreeMap<String, i16>,
    /// Set when the word batch last succeeded; `None` until the first one
    pub updated_at: Option<DateTime<Local>>,
    /// Last full bit-range read, if the station has one and it has succeeded
    pub bits: Option<Vec<bool>>,
    pub bits_updated_at: Option<DateTime<Local>>,
}

impl StationSnapshot {
    fn empty(registers: &[String]) -> Self {
        Self {
            values: registers.iter().map(|name| (name.clone(), 0)).collect(),
            ..Self::default()
        }
    }

    pub fn has_data(&self) -> bool {
        self.updated_at.is_some()
    }
}

/// First two 15-element windows of a bit array; all-zero unless at least
/// 30 bits are present
pub fn bit_windows(bits: Option<&[bool]>) -> ([bool; BIT_WINDOW], [bool; BIT_WINDOW]) {
    let mut first = [false; BIT_WINDOW];
    let mut second = [false; BIT_WINDOW];
    if let Some(bits) = bits.filter(|b| b.len() >= 2 * BIT_WINDOW) {
        first.copy_from_slice(&bits[..BIT_WINDOW]);
        second.copy_from_slice(&bits[BIT_WINDOW..2 * BIT_WINDOW]);
    }
    (first, second)
}

#[derive(Debug, Default)]
pub struct StateStore {
    stations: RwLock<HashMap<String, StationSnapshot>>,
}

impl StateStore {
    /// One empty snapshot per configured station
    pub fn new(stations: &[StationConfig]) -> Self {
        let map = stations
            .iter()
            .map(|s| (s.id.clone(), StationSnapshot::empty(&s.registers)))
            .collect();
        Self {
            stations: RwLock::new(map),
        }
    }

    pub fn contains(&self, station: &str) -> bool {
        self.stations.read().contains_key(station)
    }

    /// Copy of a station's snapshot; `None` for an unknown station
    pub fn snapshot(&self, station: &str) -> Option<StationSnapshot> {
        self.stations.read().get(station).cloned()
    }

    /// Replace all word values of a station and stamp it
    pub fn replace_words(&self, station: &str, values: BTreeMap<String, i16>) -> Result<()> {
        let now = Local::now();
        let mut stations = self.stations.write();
        let snapshot = stations
            .get_mut(station)
            .ok_or_else(|| BridgeError::station_not_found(station))?;
        snapshot.values = values;
        snapshot.updated_at = Some(now);
        Ok(())
    }

    /// Replace a station's bit array as a whole
    pub fn replace_bits(&self, station: &str, bits: Vec<bool>) -> Result<()> {
        let now = Local::now();
        let mut stations = self.stations.write();
        let snapshot = stations
            .get_mut(station)
            .ok_or_else(|| BridgeError::station_not_found(station))?;
        snapshot.bits = Some(bits);
        snapshot.bits_updated_at = Some(now);
        Ok(())
    }
}
