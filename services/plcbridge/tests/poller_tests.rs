//! Poll cycles and snapshot consistency

use std::sync::Arc;
use std::time::Duration;

use plcbridge::core::access::RegisterAccess;
use plcbridge::core::config::AppConfig;
use plcbridge::core::poller::Poller;
use plcbridge::core::store::{StateStore, StationSnapshot};
use tokio::time::Instant;

mod common;
use common::{addr, sim_access};

const STATIONS: [&str; 4] = ["station1", "station2", "station3", "station4"];

fn poller_over(access: Arc<RegisterAccess>) -> (Arc<StateStore>, Poller) {
    let config = AppConfig::default();
    let store = Arc::new(StateStore::new(&config.stations));
    let poller = Poller::new(
        access,
        Arc::clone(&store),
        &config.stations,
        config.polling.interval(),
    );
    (store, poller)
}

fn snapshots(store: &StateStore) -> Vec<StationSnapshot> {
    STATIONS
        .iter()
        .map(|id| store.snapshot(id).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_short_word_read_keeps_previous_snapshot() {
    let (plc, access) = sim_access();
    let (store, poller) = poller_over(access);
    plc.set_words(&addr("D0"), &[1, 2, 3]);
    assert!(poller.poll_cycle().await.is_clean());
    let before = snapshots(&store);

    plc.set_words(&addr("D0"), &[7, 8, 9]);
    plc.set_words(&addr("D10"), &[4, 5, 6]);
    plc.short_next_word_reads(1);
    let report = poller.poll_cycle().await;

    assert_eq!(report.skipped, ["station1"]);
    assert_eq!(report.updated, ["station2", "station3", "station4"]);
    assert_eq!(store.snapshot("station1").unwrap(), before[0]);
    assert_eq!(store.snapshot("station1").unwrap().values["D0"], 1);
    assert_eq!(store.snapshot("station2").unwrap().values["D11"], 5);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_skips_station_and_stretches_cycle() {
    let (plc, access) = sim_access();
    let (store, poller) = poller_over(access);
    poller.poll_cycle().await;
    let before = snapshots(&store);

    plc.set_words(&addr("D0"), &[11, 11, 11]);
    plc.fail_next_exchanges(1);
    let started = Instant::now();
    let report = poller.poll_cycle().await;

    // the failing read sat out the cool-down before the cycle went on
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(report.skipped, ["station1"]);
    assert_eq!(report.bits_updated, ["station1"]);
    assert_eq!(store.snapshot("station1").unwrap().values, before[0].values);
    assert_eq!(
        store.snapshot("station1").unwrap().updated_at,
        before[0].updated_at
    );
}

#[tokio::test(start_paused = true)]
async fn test_short_bit_read_is_not_stored() {
    let (plc, access) = sim_access();
    let (store, poller) = poller_over(access);
    plc.set_bits(&addr("M501"), &[true; 100]);
    poller.poll_cycle().await;

    plc.set_bits(&addr("M501"), &[false; 100]);
    plc.short_next_bit_reads(1);
    let report = poller.poll_cycle().await;

    assert_eq!(report.bits_skipped, ["station1"]);
    assert!(report.skipped.is_empty());
    assert_eq!(
        store.snapshot("station1").unwrap().bits.unwrap(),
        vec![true; 100]
    );
}

#[tokio::test]
async fn test_unreachable_controller_leaves_store_empty() {
    let (plc, access) = sim_access();
    let (store, poller) = poller_over(access);
    plc.set_fail_connect(true);

    let report = poller.poll_cycle().await;
    assert_eq!(report.skipped, STATIONS);
    assert_eq!(report.bits_skipped, ["station1"]);
    for snapshot in snapshots(&store) {
        assert!(!snapshot.has_data());
        assert!(snapshot.bits.is_none());
    }
}
