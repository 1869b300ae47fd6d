use std::sync::Arc;

use ingest::{CycleReport, CycleSettings, IngestionCycle};
use pipeline::testing::{MemoryObjectStore, MemorySnapshotStore, RecordingNotifier, StoreCall};
use pipeline::{
    DedupKey, DedupLedger, DedupStrategy, DeliveryPolicy, EventId, LedgerState, MarkPolicy,
    PipelineError, Recipient, Timestamp,
};

const KIND: &str = "com.example.issue";
const RECEIVED: &str = "접수(Receipt)";

struct Harness {
    store: Arc<MemoryObjectStore>,
    notifier: Arc<RecordingNotifier>,
    snapshots: Arc<MemorySnapshotStore>,
    ledger: Arc<DedupLedger>,
    cycle: IngestionCycle,
}

fn harness(strategy: DedupStrategy, mark: MarkPolicy) -> Harness {
    let store = Arc::new(MemoryObjectStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let ledger = Arc::new(DedupLedger::load(strategy, snapshots.clone()).unwrap());
    let cycle = IngestionCycle::new(
        store.clone(),
        notifier.clone(),
        ledger.clone(),
        CycleSettings {
            prefix: "issues/".to_string(),
            archive_prefix: Some("processed/".to_string()),
            policy: DeliveryPolicy::new(KIND, RECEIVED),
            recipient: Recipient::new("kim@example.com").unwrap(),
            mark,
        },
    );
    Harness {
        store,
        notifier,
        snapshots,
        ledger,
        cycle,
    }
}

fn payload(id: &str, time: &str, status: &str, subject: &str) -> String {
    format!(
        r#"{{"id":"{id}","source":"redmine","type":"{KIND}","time":"{time}",
            "data":{{"job_id":1,"status":"{status}","assignee":"Kim","subject":"{subject}"}}}}"#
    )
}

fn subjects(notifier: &RecordingNotifier) -> Vec<String> {
    notifier
        .delivered()
        .into_iter()
        .map(|(_, message)| message.fallback_text)
        .collect()
}

#[tokio::test]
async fn test_new_event_is_delivered_archived_and_marked() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "Fix login"),
    );

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            listed: 1,
            delivered: 1,
            archived: 1,
            ..CycleReport::default()
        }
    );
    let delivered = h.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.as_str(), "kim@example.com");
    assert_eq!(delivered[0].1.fallback_text, "Kim: Fix login(#1)");
    assert_eq!(h.store.keys(), vec!["processed/issues/a.json".to_string()]);
    assert_eq!(h.snapshots.contents().unwrap(), br#"{"evt-1":true}"#);
}

#[tokio::test]
async fn test_event_seen_in_earlier_cycle_is_not_redelivered() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "first"),
    );
    h.cycle.run_once().await.unwrap();

    // The producer re-uploads the same event under a new key.
    h.store.put(
        "issues/a-copy.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "first"),
    );
    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.duplicate, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(h.notifier.delivered().len(), 1);
    assert!(h.store.keys().contains(&"issues/a-copy.json".to_string()));
}

#[tokio::test]
async fn test_policy_mismatch_is_marked_but_never_rendered_or_archived() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", "완료(Completion)", "done"),
    );

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.filtered, 1);
    assert!(h.notifier.delivered().is_empty());
    assert_eq!(h.store.keys(), vec!["issues/a.json".to_string()]);
    assert!(!h
        .ledger
        .is_new(&DedupKey::Id(EventId::new("evt-1").unwrap())));
}

#[tokio::test]
async fn test_high_water_mode_delivers_in_time_order_and_skips_equal_timestamps() {
    let h = harness(DedupStrategy::HighWater, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/1.json",
        payload("c", "2024-05-01T12:00:00+09:00", RECEIVED, "third"),
    );
    h.store.put(
        "issues/2.json",
        payload("a", "2024-05-01T10:00:00+09:00", RECEIVED, "first"),
    );
    h.store.put(
        "issues/3.json",
        payload("b", "2024-05-01T11:00:00+09:00", RECEIVED, "second"),
    );
    h.store.put(
        "issues/4.json",
        payload("d", "2024-05-01T12:00:00+09:00", RECEIVED, "same time"),
    );

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.delivered, 3);
    assert_eq!(report.duplicate, 1);
    assert_eq!(
        subjects(&h.notifier),
        vec!["Kim: first(#1)", "Kim: second(#1)", "Kim: third(#1)"]
    );
    assert_eq!(
        h.ledger.state(),
        LedgerState::HighWater(Timestamp::parse_rfc3339("2024-05-01T12:00:00+09:00").ok())
    );
}

#[tokio::test]
async fn test_malformed_and_folder_objects_are_skipped() {
    let h = harness(DedupStrategy::HighWater, MarkPolicy::BeforeDelivery);
    h.store.put("issues/", "");
    h.store.put("issues/broken.json", "{not json");
    h.store
        .put("issues/no-time.json", format!(r#"{{"type":"{KIND}","data":{{}}}}"#));
    h.store.put(
        "issues/ok.json",
        payload("a", "2024-05-01T10:00:00+09:00", RECEIVED, "ok"),
    );
    h.store.put("other/ignored.json", "{}");

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.malformed, 2);
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn test_list_failure_aborts_cycle_without_side_effects() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.store.fail_list(true);

    let err = h.cycle.run_once().await.unwrap_err();

    assert!(matches!(err, PipelineError::StoreUnavailable(_)));
    assert!(h.notifier.delivered().is_empty());
    assert!(h.snapshots.contents().is_none());
}

#[tokio::test]
async fn test_fetch_failure_aborts_cycle_before_any_delivery() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.store.put(
        "issues/b.json",
        payload("evt-2", "2024-05-01T11:00:00+09:00", RECEIVED, "y"),
    );
    h.store.fail_get("issues/b.json");

    let err = h.cycle.run_once().await.unwrap_err();

    assert!(matches!(err, PipelineError::StoreUnavailable(_)));
    assert!(h.notifier.delivered().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_before_delivery_mark_is_terminal() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.notifier.fail_deliveries(true);

    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.delivery_failed, 1);
    assert_eq!(h.store.keys(), vec!["issues/a.json".to_string()]);

    h.notifier.fail_deliveries(false);
    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.duplicate, 1);
    assert!(h.notifier.delivered().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_after_delivery_mark_is_retried() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::AfterDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.notifier.fail_deliveries(true);

    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.delivery_failed, 1);
    assert!(h.snapshots.contents().is_none());

    h.notifier.fail_deliveries(false);
    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.archived, 1);
    assert_eq!(h.snapshots.contents().unwrap(), br#"{"evt-1":true}"#);
}

#[tokio::test]
async fn test_high_water_delivery_failure_after_delivery_mark_stops_batch() {
    let h = harness(DedupStrategy::HighWater, MarkPolicy::AfterDelivery);
    h.store.put(
        "issues/a.json",
        payload("a", "2024-05-01T10:00:00+09:00", RECEIVED, "first"),
    );
    h.store.put(
        "issues/b.json",
        payload("b", "2024-05-01T11:00:00+09:00", RECEIVED, "second"),
    );
    h.notifier.fail_deliveries(true);

    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.delivery_failed, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(h.ledger.state(), LedgerState::HighWater(None));

    h.notifier.fail_deliveries(false);
    h.cycle.run_once().await.unwrap();
    assert_eq!(
        subjects(&h.notifier),
        vec!["Kim: first(#1)", "Kim: second(#1)"]
    );
}

#[tokio::test]
async fn test_archive_failure_keeps_mark_and_object() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.store.fail_copy(true);

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.archive_failed, 1);
    assert_eq!(h.store.keys(), vec!["issues/a.json".to_string()]);
    assert!(!h
        .store
        .calls()
        .iter()
        .any(|call| matches!(call, StoreCall::Delete(_))));

    let report = h.cycle.run_once().await.unwrap();
    assert_eq!(report.duplicate, 1);
}

#[tokio::test]
async fn test_persist_failure_still_delivers_once() {
    let h = harness(DedupStrategy::EventId, MarkPolicy::BeforeDelivery);
    h.snapshots.fail_writes(true);
    h.store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );
    h.store.put(
        "issues/b.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );

    let report = h.cycle.run_once().await.unwrap();

    assert_eq!(report.persist_failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.duplicate, 1);
}

#[tokio::test]
async fn test_archival_can_be_disabled() {
    let store = Arc::new(MemoryObjectStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let ledger = Arc::new(
        DedupLedger::load(DedupStrategy::EventId, Arc::new(MemorySnapshotStore::new())).unwrap(),
    );
    let cycle = IngestionCycle::new(
        store.clone(),
        notifier.clone(),
        ledger,
        CycleSettings {
            prefix: "issues/".to_string(),
            archive_prefix: None,
            policy: DeliveryPolicy::new(KIND, RECEIVED),
            recipient: Recipient::new("kim@example.com").unwrap(),
            mark: MarkPolicy::BeforeDelivery,
        },
    );
    store.put(
        "issues/a.json",
        payload("evt-1", "2024-05-01T10:00:00+09:00", RECEIVED, "x"),
    );

    let report = cycle.run_once().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.archived, 0);
    assert_eq!(store.keys(), vec!["issues/a.json".to_string()]);
}
