//! Dedup ledger: the durable record of which events were already handled.
//!
//! A ledger runs one [`DedupStrategy`] for its whole life:
//!
//! | Strategy | State | Snapshot |
//! |----------|-------|----------|
//! | [`DedupStrategy::EventId`] | set of seen event ids, additions only | `{"<id>": true, ...}` |
//! | [`DedupStrategy::HighWater`] | latest handled `occurred_at`, never regresses | `"<rfc3339>"` or `null` |
//!
//! Every read-modify-persist sequence runs under one mutex that is never
//! held across an `.await`, so two cycles can never both treat the same
//! identity as new, and slow deliveries never block the ledger.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Event, EventId, LedgerSnapshotStore, PipelineError, SnapshotIoError, Timestamp};

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How events are identified for deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Remember every event id ever handled.
    EventId,
    /// Remember only the latest handled event time. An event stamped with
    /// exactly the current mark is treated as already handled.
    #[default]
    HighWater,
}

/// When the ledger records an event relative to delivering it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPolicy {
    /// Record, persist, then deliver. A crash or failed delivery loses the
    /// notification but can never produce a duplicate (at most once).
    #[default]
    BeforeDelivery,
    /// Deliver, then record. A failed delivery is retried on the next tick;
    /// a crash between delivering and recording produces a duplicate (at
    /// least once).
    AfterDelivery,
}

/// The identity of an event under the active [`DedupStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Id(EventId),
    OccurredAt(Timestamp),
}

impl DedupKey {
    /// Derives the key of `event`, or `None` if the event lacks the
    /// identity the strategy needs.
    pub fn for_event(strategy: DedupStrategy, event: &Event) -> Option<DedupKey> {
        match strategy {
            DedupStrategy::EventId => event.id.clone().map(DedupKey::Id),
            DedupStrategy::HighWater => event.occurred_at.map(DedupKey::OccurredAt),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupKey::Id(id) => write!(f, "id:{id}"),
            DedupKey::OccurredAt(at) => write!(f, "time:{at}"),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The in-memory contents of a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerState {
    SeenIds(BTreeSet<EventId>),
    HighWater(Option<Timestamp>),
}

impl LedgerState {
    /// The empty / zero state for `strategy`.
    pub fn empty(strategy: DedupStrategy) -> Self {
        match strategy {
            DedupStrategy::EventId => LedgerState::SeenIds(BTreeSet::new()),
            DedupStrategy::HighWater => LedgerState::HighWater(None),
        }
    }

    /// The strategy this state belongs to.
    pub fn strategy(&self) -> DedupStrategy {
        match self {
            LedgerState::SeenIds(_) => DedupStrategy::EventId,
            LedgerState::HighWater(_) => DedupStrategy::HighWater,
        }
    }

    /// Returns `true` if `key` has not been handled.
    ///
    /// A key of the other strategy is never new: the ledger cannot track it.
    pub fn is_new(&self, key: &DedupKey) -> bool {
        match (self, key) {
            (LedgerState::SeenIds(seen), DedupKey::Id(id)) => !seen.contains(id),
            (LedgerState::HighWater(mark), DedupKey::OccurredAt(at)) => {
                mark.map_or(true, |mark| *at > mark)
            }
            _ => false,
        }
    }

    /// Records `key`; returns `true` if the state changed.
    pub fn mark_seen(&mut self, key: &DedupKey) -> bool {
        match (self, key) {
            (LedgerState::SeenIds(seen), DedupKey::Id(id)) => seen.insert(id.clone()),
            (LedgerState::HighWater(mark), DedupKey::OccurredAt(at)) => {
                if mark.map_or(true, |current| *at > current) {
                    *mark = Some(*at);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Serialises the state into its snapshot form.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            LedgerState::SeenIds(seen) => {
                let map: BTreeMap<&str, bool> = seen.iter().map(|id| (id.as_str(), true)).collect();
                serde_json::to_vec(&map)
            }
            LedgerState::HighWater(mark) => serde_json::to_vec(mark),
        }
    }

    /// Parses a snapshot written for `strategy`.
    ///
    /// Empty input is the zero state (a snapshot file created but never
    /// written).
    pub fn from_snapshot(strategy: DedupStrategy, bytes: &[u8]) -> Result<Self, String> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty(strategy));
        }
        match strategy {
            DedupStrategy::EventId => {
                let map: BTreeMap<String, bool> =
                    serde_json::from_slice(bytes).map_err(|err| err.to_string())?;
                let mut seen = BTreeSet::new();
                for (id, handled) in map {
                    let id = EventId::new(id).ok_or("empty event id in snapshot")?;
                    if handled {
                        seen.insert(id);
                    }
                }
                Ok(LedgerState::SeenIds(seen))
            }
            DedupStrategy::HighWater => serde_json::from_slice::<Option<Timestamp>>(bytes)
                .map(LedgerState::HighWater)
                .map_err(|err| err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Outcome of [`DedupLedger::admit`].
#[derive(Debug)]
pub enum Admission {
    /// The event was handled before.
    Duplicate,
    /// The event is new; it is recorded and the snapshot is written.
    Admitted,
    /// The event is new and recorded in memory, but writing the snapshot
    /// failed. The event must still be treated as handled.
    AdmittedUnpersisted(PipelineError),
}

/// Claim on an event between [`DedupLedger::reserve`] and
/// [`DedupLedger::commit`] / [`DedupLedger::release`].
#[derive(Debug)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    key: DedupKey,
}

impl Reservation {
    pub fn key(&self) -> &DedupKey {
        &self.key
    }
}

struct LedgerInner {
    state: LedgerState,
    in_flight: HashSet<DedupKey>,
}

/// Durable dedup ledger shared by ingestion cycles.
pub struct DedupLedger {
    inner: Mutex<LedgerInner>,
    store: Arc<dyn LedgerSnapshotStore>,
}

impl DedupLedger {
    /// Loads the ledger from `store`.
    ///
    /// A missing snapshot yields the empty state. A snapshot that cannot be
    /// read or parsed for `strategy` is [`PipelineError::LedgerCorrupt`].
    pub fn load(
        strategy: DedupStrategy,
        store: Arc<dyn LedgerSnapshotStore>,
    ) -> Result<Self, PipelineError> {
        let state = match store.load() {
            Ok(None) => LedgerState::empty(strategy),
            Ok(Some(bytes)) => LedgerState::from_snapshot(strategy, &bytes)
                .map_err(|reason| PipelineError::LedgerCorrupt { reason })?,
            Err(err) => {
                return Err(PipelineError::LedgerCorrupt {
                    reason: err.to_string(),
                })
            }
        };
        debug!(?state, "dedup ledger loaded");
        Ok(Self::with_state(state, store))
    }

    /// Creates a ledger with an explicit starting state.
    pub fn with_state(state: LedgerState, store: Arc<dyn LedgerSnapshotStore>) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                state,
                in_flight: HashSet::new(),
            }),
            store,
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> DedupStrategy {
        self.lock().state.strategy()
    }

    /// Derives the key of `event` under the active strategy.
    pub fn key_for(&self, event: &Event) -> Option<DedupKey> {
        DedupKey::for_event(self.strategy(), event)
    }

    /// Returns `true` if `key` has not been handled.
    pub fn is_new(&self, key: &DedupKey) -> bool {
        self.lock().state.is_new(key)
    }

    /// Records `key` in memory without persisting.
    pub fn mark_seen(&self, key: &DedupKey) -> bool {
        self.lock().state.mark_seen(key)
    }

    /// Writes the current state to the snapshot store.
    pub fn persist(&self) -> Result<(), PipelineError> {
        let inner = self.lock();
        self.write_snapshot(&inner.state)
    }

    /// A copy of the current state.
    pub fn state(&self) -> LedgerState {
        self.lock().state.clone()
    }

    /// Checks, records and persists `key` as one atomic step.
    pub fn admit(&self, key: &DedupKey) -> Admission {
        let mut inner = self.lock();
        if !inner.state.is_new(key) || inner.in_flight.contains(key) {
            return Admission::Duplicate;
        }
        inner.state.mark_seen(key);
        match self.write_snapshot(&inner.state) {
            Ok(()) => Admission::Admitted,
            Err(err) => Admission::AdmittedUnpersisted(err),
        }
    }

    /// Claims a new `key` for delivery without recording it.
    ///
    /// Returns `None` if the key was handled or is claimed by another cycle.
    /// Under [`DedupStrategy::HighWater`] at most one key is claimed at a
    /// time: committing a later timestamp while an earlier one is pending
    /// would move the mark past the earlier event if it were then released.
    pub fn reserve(&self, key: &DedupKey) -> Option<Reservation> {
        let mut inner = self.lock();
        if !inner.state.is_new(key) {
            return None;
        }
        if inner.state.strategy() == DedupStrategy::HighWater && !inner.in_flight.is_empty() {
            return None;
        }
        if !inner.in_flight.insert(key.clone()) {
            return None;
        }
        Some(Reservation { key: key.clone() })
    }

    /// Records a reserved key and persists.
    ///
    /// The key counts as handled even if persisting fails.
    pub fn commit(&self, reservation: Reservation) -> Result<(), PipelineError> {
        let mut inner = self.lock();
        inner.in_flight.remove(&reservation.key);
        inner.state.mark_seen(&reservation.key);
        self.write_snapshot(&inner.state)
    }

    /// Drops a reservation without recording the key.
    pub fn release(&self, reservation: Reservation) {
        self.lock().in_flight.remove(&reservation.key);
    }

    fn write_snapshot(&self, state: &LedgerState) -> Result<(), PipelineError> {
        let bytes = state.to_snapshot().map_err(|err| {
            PipelineError::LedgerPersistFailed(SnapshotIoError {
                operation: "store",
                message: err.to_string(),
            })
        })?;
        self.store
            .store(&bytes)
            .map_err(PipelineError::LedgerPersistFailed)
    }

    // The state is only ever replaced by complete values, so a panic in
    // another holder cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
