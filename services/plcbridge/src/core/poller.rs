//! Station poller
//!
//! One cycle reads every station's word batch in configuration order, then
//! every configured bit range. A station is only published when its batch
//! returned exactly the expected count; otherwise its previous snapshot
//! stands. The next cycle starts one interval after the previous one ended.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::access::RegisterAccess;
use super::config::{BitRange, StationConfig};
use super::mc::DeviceAddress;
use super::store::StateStore;

/// What happened to each station in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub bits_updated: Vec<String>,
    pub bits_skipped: Vec<String>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.bits_skipped.is_empty()
    }
}

/// Read plan for one station, resolved once from configuration
#[derive(Debug, Clone)]
struct StationPlan {
    id: String,
    base: DeviceAddress,
    registers: Vec<String>,
    bits: Option<BitRange>,
}

impl From<&StationConfig> for StationPlan {
    fn from(station: &StationConfig) -> Self {
        Self {
            id: station.id.clone(),
            base: station.base,
            registers: station.registers.clone(),
            bits: station.bits.clone(),
        }
    }
}

pub struct Poller {
    access: Arc<RegisterAccess>,
    store: Arc<StateStore>,
    plans: Vec<StationPlan>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        access: Arc<RegisterAccess>,
        store: Arc<StateStore>,
        stations: &[StationConfig],
        interval: Duration,
    ) -> Self {
        Self {
            access,
            store,
            plans: stations.iter().map(StationPlan::from).collect(),
            interval,
        }
    }

    /// Run one full cycle
    pub async fn poll_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for plan in &self.plans {
            let expected = plan.registers.len();
            match self.access.read_words(&plan.base, expected).await {
                Ok(words) if words.len() == expected => {
                    let values: BTreeMap<String, i16> = plan
                        .registers
                        .iter()
                        .cloned()
                        .zip(words.into_iter().map(|w| w as i16))
                        .collect();
                    match self.store.replace_words(&plan.id, values) {
                        Ok(()) => report.updated.push(plan.id.clone()),
                        Err(e) => {
                            warn!("Station {} not published: {}", plan.id, e);
                            report.skipped.push(plan.id.clone());
                        },
                    }
                },
                Ok(words) => {
                    warn!(
                        "Skipped update for {}: expected {} words at {}, got {}",
                        plan.id,
                        expected,
                        plan.base,
                        words.len()
                    );
                    report.skipped.push(plan.id.clone());
                },
                Err(e) => {
                    warn!("Skipped update for {} due to word read failure: {}", plan.id, e);
                    report.skipped.push(plan.id.clone());
                },
            }
        }

        for plan in &self.plans {
            let Some(range) = &plan.bits else {
                continue;
            };
            match self.access.read_bits(&range.base, range.count).await {
                Ok(bits) if bits.len() == range.count => {
                    match self.store.replace_bits(&plan.id, bits) {
                        Ok(()) => report.bits_updated.push(plan.id.clone()),
                        Err(e) => {
                            warn!("Station {} bits not published: {}", plan.id, e);
                            report.bits_skipped.push(plan.id.clone());
                        },
                    }
                },
                Ok(bits) => {
                    warn!(
                        "Skipped bit update for {}: expected {} bits at {}, got {}",
                        plan.id,
                        range.count,
                        range.base,
                        bits.len()
                    );
                    report.bits_skipped.push(plan.id.clone());
                },
                Err(e) => {
                    warn!(
                        "Skipped bit update for {} ({}+{}): {}",
                        plan.id, range.base, range.count, e
                    );
                    report.bits_skipped.push(plan.id.clone());
                },
            }
        }

        report
    }

    /// Poll until cancelled; cancellation is observed between cycles
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Poller started: {} stations, interval {:?}",
            self.plans.len(),
            self.interval
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let report = self.poll_cycle().await;
            if report.is_clean() {
                debug!("Poll cycle complete: {:?}", report.updated);
            } else {
                debug!(
                    "Poll cycle complete with skips: words {:?}, bits {:?}",
                    report.skipped, report.bits_skipped
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {},
            }
        }
        info!("Poller stopped");
    }
}
