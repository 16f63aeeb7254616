//! Servo register bridge
//!
//! On-demand access to the servo drive's register windows. Nothing is cached:
//! every read goes to the controller. The bridge is built first and bound to
//! the register access afterwards; using it unbound is a `StateError`.

use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::access::RegisterAccess;
use super::config::ServoConfig;
use crate::error::{BridgeError, Result};

/// One fresh read of the servo window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServoReading {
    /// Raw window, in the controller's signed INT view
    pub values: Vec<i16>,
    pub position: u32,
    pub speed: u32,
}

/// Combine a low/high word pair into one 32-bit value without sign extension
pub fn compose_u32(low: u16, high: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Check a write payload and convert it to raw register values
///
/// Each element must fit a 16-bit register either as a signed INT or as an
/// unsigned word.
pub fn register_values(values: &[i64], expected: usize) -> Result<Vec<u16>> {
    if values.len() != expected {
        return Err(BridgeError::validation(format!(
            "Expected {} integers in 'values', got {}",
            expected,
            values.len()
        )));
    }
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if (i64::from(i16::MIN)..=i64::from(u16::MAX)).contains(&v) {
                Ok(v as u16)
            } else {
                Err(BridgeError::validation(format!(
                    "values[{}] = {} does not fit a 16-bit register",
                    i, v
                )))
            }
        })
        .collect()
}

pub struct ServoBridge {
    config: ServoConfig,
    access: OnceLock<Arc<RegisterAccess>>,
}

impl ServoBridge {
    /// Unbound bridge; call `bind` before first use
    pub fn new(config: ServoConfig) -> Self {
        Self {
            config,
            access: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Attach the shared register access; may only happen once
    pub fn bind(&self, access: Arc<RegisterAccess>) -> Result<()> {
        self.access
            .set(access)
            .map_err(|_| BridgeError::state(format!("servo {} is already bound", self.config.id)))?;
        info!("Servo {} bound to register access", self.config.id);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.access.get().is_some()
    }

    fn access(&self) -> Result<&Arc<RegisterAccess>> {
        self.access.get().ok_or_else(|| {
            BridgeError::state(format!("servo {} used before bind", self.config.id))
        })
    }

    pub async fn read(&self) -> Result<ServoReading> {
        let access = self.access()?;
        let cfg = &self.config;
        let words = access.read_words(&cfg.read_base, cfg.read_count).await?;
        if words.len() != cfg.read_count {
            return Err(BridgeError::transport(format!(
                "servo read at {} returned {} of {} words",
                cfg.read_base,
                words.len(),
                cfg.read_count
            )));
        }

        let pair = |low: usize| compose_u32(words[low], words[low + 1]);
        let reading = ServoReading {
            position: pair(cfg.position_index),
            speed: pair(cfg.speed_index),
            values: words.iter().map(|&w| w as i16).collect(),
        };
        debug!(
            "Servo {} position={} speed={}",
            cfg.id, reading.position, reading.speed
        );
        Ok(reading)
    }

    /// Write the whole window verbatim; returns the raw values written
    pub async fn write(&self, values: &[i64]) -> Result<Vec<u16>> {
        let words = register_values(values, self.config.write_count)?;
        let access = self.access()?;
        access.write_words(&self.config.write_base, &words).await?;
        Ok(words)
    }
}
