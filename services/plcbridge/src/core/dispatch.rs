//! Control command dispatcher
//!
//! `dispatch` resolves a (station, action) pair to a bit address and queues a
//! momentary pulse on it: set, hold for the dwell, clear. The caller gets its
//! acknowledgement as soon as the pulse is queued; a single writer task drains
//! the queue and runs every pulse as its own task.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::access::RegisterAccess;
use super::config::AppConfig;
use super::mc::DeviceAddress;
use crate::error::{BridgeError, Result};

/// Static action lookup: station actions first, then global buttons
#[derive(Debug, Clone, Default)]
pub struct CommandMap {
    stations: HashMap<String, BTreeMap<String, DeviceAddress>>,
    buttons: BTreeMap<String, DeviceAddress>,
}

impl CommandMap {
    pub fn new(
        stations: HashMap<String, BTreeMap<String, DeviceAddress>>,
        buttons: BTreeMap<String, DeviceAddress>,
    ) -> Self {
        Self { stations, buttons }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let stations = config
            .stations
            .iter()
            .map(|s| (s.id.clone(), s.actions.clone()))
            .collect();
        Self::new(stations, config.buttons.clone())
    }

    pub fn resolve(&self, station: &str, action: &str) -> Result<DeviceAddress> {
        let actions = self
            .stations
            .get(station)
            .ok_or_else(|| BridgeError::station_not_found(station))?;
        actions
            .get(action)
            .or_else(|| self.buttons.get(action))
            .copied()
            .ok_or_else(|| BridgeError::unknown_action(station, action))
    }
}

/// Returned to the caller once a pulse is queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub station: String,
    pub action: String,
    pub address: DeviceAddress,
}

#[derive(Debug, Clone)]
struct Pulse {
    station: String,
    action: String,
    address: DeviceAddress,
}

pub struct CommandDispatcher {
    map: CommandMap,
    queue: mpsc::Sender<Pulse>,
}

/// Build a dispatcher and the writer that executes its pulses
pub fn command_channel(
    map: CommandMap,
    access: Arc<RegisterAccess>,
    dwell: Duration,
    capacity: usize,
) -> (CommandDispatcher, PulseWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        CommandDispatcher { map, queue: tx },
        PulseWriter { access, rx, dwell },
    )
}

impl CommandDispatcher {
    /// Resolve and queue a pulse without waiting for it to run
    pub fn dispatch(&self, station: &str, action: &str) -> Result<Ack> {
        let address = self.map.resolve(station, action)?;
        let pulse = Pulse {
            station: station.to_string(),
            action: action.to_string(),
            address,
        };

        self.queue.try_send(pulse).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                BridgeError::resource("command queue is full, try again shortly")
            },
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::state("command writer has stopped")
            },
        })?;

        debug!("Queued {action} for {station} at {address}");
        Ok(Ack {
            station: station.to_string(),
            action: action.to_string(),
            address,
        })
    }
}

/// Consumes queued pulses; each runs on its own task
pub struct PulseWriter {
    access: Arc<RegisterAccess>,
    rx: mpsc::Receiver<Pulse>,
    dwell: Duration,
}

impl PulseWriter {
    /// Run until cancelled, then refuse new pulses and finish everything
    /// already queued or in flight
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut running = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(pulse) => {
                        running.spawn(execute(Arc::clone(&self.access), pulse, self.dwell));
                    },
                    None => break,
                },
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = joined {
                        error!("Pulse task failed: {e}");
                    }
                },
            }
        }

        self.rx.close();
        while let Some(pulse) = self.rx.recv().await {
            running.spawn(execute(Arc::clone(&self.access), pulse, self.dwell));
        }
        let pending = running.len();
        if pending > 0 {
            info!("Waiting for {pending} pulse(s) to finish");
        }
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!("Pulse task failed: {e}");
            }
        }
        info!("Command writer stopped");
    }
}

async fn execute(access: Arc<RegisterAccess>, pulse: Pulse, dwell: Duration) {
    let Pulse {
        station,
        action,
        address,
    } = pulse;

    if let Err(e) = access.write_bits(&address, &[true]).await {
        warn!("{station}/{action}: set {address} failed, pulse aborted: {e}");
        return;
    }
    tokio::time::sleep(dwell).await;
    // a cool-down started by another caller during the dwell must not drop the clear
    if let Err(e) = access.write_bits_after_cooldown(&address, &[false]).await {
        error!("{station}/{action}: clear {address} failed, bit may be left set: {e}");
        return;
    }
    debug!("{station}/{action}: pulsed {address}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::access::AccessSettings;
    use crate::core::transport::simulator::WriteRecord;
    use crate::core::transport::SimulatedPlc;

    fn access(plc: &SimulatedPlc) -> Arc<RegisterAccess> {
        Arc::new(RegisterAccess::new(
            Arc::new(plc.clone()),
            AccessSettings {
                host: "sim".to_string(),
                port: 5000,
                cooldown: Duration::from_secs(3),
            },
        ))
    }

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_resolution_order() {
        let mut config = AppConfig::default();
        config.stations[1]
            .actions
            .insert("button2".to_string(), addr("M900"));
        let map = CommandMap::from_config(&config);

        assert_eq!(map.resolve("station1", "start").unwrap(), addr("M100"));
        assert_eq!(map.resolve("station4", "servo_on").unwrap(), addr("M133"));
        assert_eq!(map.resolve("station3", "button15").unwrap(), addr("M545"));
        // station action shadows the global button
        assert_eq!(map.resolve("station2", "button2").unwrap(), addr("M900"));
        assert_eq!(map.resolve("station1", "button2").unwrap(), addr("M532"));

        assert!(matches!(
            map.resolve("station9", "start"),
            Err(BridgeError::StationNotFound(_))
        ));
        assert!(matches!(
            map.resolve("station1", "launch"),
            Err(BridgeError::UnknownAction { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_queue_is_busy() {
        let plc = SimulatedPlc::new();
        let (dispatcher, _writer) = command_channel(
            CommandMap::from_config(&AppConfig::default()),
            access(&plc),
            Duration::from_secs(1),
            1,
        );
        dispatcher.dispatch("station1", "start").unwrap();
        assert!(matches!(
            dispatcher.dispatch("station1", "stop"),
            Err(BridgeError::ResourceError(_))
        ));
        assert_eq!(plc.exchanges(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_is_state_error() {
        let plc = SimulatedPlc::new();
        let (dispatcher, writer) = command_channel(
            CommandMap::from_config(&AppConfig::default()),
            access(&plc),
            Duration::from_secs(1),
            4,
        );
        drop(writer);
        assert!(matches!(
            dispatcher.dispatch("station1", "start"),
            Err(BridgeError::StateError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_sets_then_clears() {
        let plc = SimulatedPlc::new();
        let (dispatcher, writer) = command_channel(
            CommandMap::from_config(&AppConfig::default()),
            access(&plc),
            Duration::from_secs(1),
            4,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer.run(cancel.clone()));

        let ack = dispatcher.dispatch("station2", "reset").unwrap();
        assert_eq!(ack.address, addr("M112"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(plc.bit(&addr("M112")));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!plc.bit(&addr("M112")));
        assert_eq!(
            plc.writes(),
            vec![
                WriteRecord::Bits { head: addr("M112"), values: vec![true] },
                WriteRecord::Bits { head: addr("M112"), values: vec![false] },
            ]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_running_pulses() {
        let plc = SimulatedPlc::new();
        let (dispatcher, writer) = command_channel(
            CommandMap::from_config(&AppConfig::default()),
            access(&plc),
            Duration::from_secs(1),
            4,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer.run(cancel.clone()));

        dispatcher.dispatch("station1", "start").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        // the pulse in flight completed its clear before the writer exited
        assert!(!plc.bit(&addr("M100")));
        assert_eq!(plc.writes().len(), 2);
        assert!(matches!(
            dispatcher.dispatch("station1", "stop"),
            Err(BridgeError::StateError(_))
        ));
    }
}
