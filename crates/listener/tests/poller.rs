use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ingest::{CycleSettings, IngestionCycle};
use listener::{BucketPoller, PollerSettings, TickOutcome};
use pipeline::testing::{FixedClock, MemoryObjectStore, MemorySnapshotStore, RecordingNotifier, StoreCall};
use pipeline::{
    BusinessHours, DedupLedger, DedupStrategy, DeliveryPolicy, FailureScope, MarkPolicy, Recipient,
};

// Wednesday 2024-05-01, in UTC.
fn wednesday_utc(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn build_poller(
    now: chrono::DateTime<Utc>,
    initial_sweep: bool,
) -> (BucketPoller, Arc<MemoryObjectStore>, Arc<FixedClock>) {
    let store = Arc::new(MemoryObjectStore::new());
    let ledger = Arc::new(
        DedupLedger::load(DedupStrategy::HighWater, Arc::new(MemorySnapshotStore::new())).unwrap(),
    );
    let cycle = IngestionCycle::new(
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        ledger,
        CycleSettings {
            prefix: "issues/".to_string(),
            archive_prefix: Some("processed/".to_string()),
            policy: DeliveryPolicy::default(),
            recipient: Recipient::new("kim@example.com").unwrap(),
            mark: MarkPolicy::BeforeDelivery,
        },
    );
    let clock = Arc::new(FixedClock::new(now));
    let poller = BucketPoller::new(
        cycle,
        BusinessHours::new(540, 9, 18).unwrap(),
        clock.clone(),
        PollerSettings {
            interval: Duration::from_secs(10),
            initial_sweep,
        },
    );
    (poller, store, clock)
}

fn list_calls(store: &MemoryObjectStore) -> usize {
    store
        .calls()
        .iter()
        .filter(|call| matches!(call, StoreCall::List(_)))
        .count()
}

#[tokio::test]
async fn test_closed_gate_runs_no_cycle() {
    // 20:00 KST
    let (poller, store, _) = build_poller(wednesday_utc(11), false);

    assert_eq!(poller.tick().await, TickOutcome::GateClosed);
    assert_eq!(list_calls(&store), 0);
}

#[tokio::test]
async fn test_open_gate_runs_cycle() {
    // 10:00 KST
    let (poller, store, _) = build_poller(wednesday_utc(1), false);

    assert!(matches!(poller.tick().await, TickOutcome::Completed(report) if report.listed == 0));
    assert_eq!(list_calls(&store), 1);
}

#[tokio::test]
async fn test_store_outage_is_reported_as_cycle_failure() {
    let (poller, store, _) = build_poller(wednesday_utc(1), false);
    store.fail_list(true);

    assert_eq!(poller.tick().await, TickOutcome::Failed(FailureScope::Cycle));
}

#[tokio::test(start_paused = true)]
async fn test_run_sweeps_at_startup_then_ticks_until_shutdown() {
    let (poller, store, _) = build_poller(wednesday_utc(1), true);

    poller
        .run(tokio::time::sleep(Duration::from_secs(35)))
        .await;

    // Initial sweep plus ticks at 10s, 20s and 30s.
    assert_eq!(list_calls(&store), 4);
}

#[tokio::test(start_paused = true)]
async fn test_initial_sweep_ignores_gate_but_ticks_do_not() {
    let (poller, store, clock) = build_poller(wednesday_utc(11), true);

    poller
        .run(tokio::time::sleep(Duration::from_secs(25)))
        .await;
    assert_eq!(list_calls(&store), 1);

    clock.set(wednesday_utc(1));
    poller
        .run(tokio::time::sleep(Duration::from_secs(25)))
        .await;
    // A second initial sweep plus ticks at 10s and 20s.
    assert_eq!(list_calls(&store), 4);
}
