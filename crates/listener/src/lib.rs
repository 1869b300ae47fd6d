//! rm-notify trigger: the bucket poller.
//!
//! [`BucketPoller`] drives the [`ingest::IngestionCycle`] from a periodic
//! timer. On every tick it asks the [`pipeline::BusinessHours`] gate whether
//! the current instant is inside the delivery window and, if so, runs one
//! cycle. Optionally one *initial sweep* runs at startup before the first
//! tick, regardless of the gate.
//!
//! ## Scheduling
//!
//! | Property | Behaviour |
//! |----------|-----------|
//! | Overlap | never; each cycle is awaited before the next tick is taken |
//! | Missed ticks | delayed, not bursted (`MissedTickBehavior::Delay`) |
//! | Shutdown | stops after the in-progress cycle completes |
//! | Cycle failure | logged; the next tick retries |
//!
//! ## Architectural Layer
//!
//! **Trigger.** Owns timing only. What a cycle does lives in [`ingest`];
//! the time window lives in [`pipeline::gate`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ingest::{CycleReport, IngestionCycle};
use pipeline::{BusinessHours, Clock, FailureScope};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Timer settings of a [`BucketPoller`].
#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Run one cycle immediately at startup, ignoring the gate.
    pub initial_sweep: bool,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Outside business hours; no cycle ran.
    GateClosed,
    /// A cycle ran to completion.
    Completed(CycleReport),
    /// The cycle was abandoned.
    Failed(FailureScope),
}

/// Periodically runs ingestion cycles inside business hours.
pub struct BucketPoller {
    cycle: IngestionCycle,
    gate: BusinessHours,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
}

impl BucketPoller {
    pub fn new(
        cycle: IngestionCycle,
        gate: BusinessHours,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            cycle,
            gate,
            clock,
            settings,
        }
    }

    /// Evaluates the gate and, if open, runs one cycle.
    pub async fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        if !self.gate.is_open(now) {
            debug!(now = %now.with_timezone(&self.gate.offset()), "outside business hours; skipping cycle");
            return TickOutcome::GateClosed;
        }
        self.sweep().await
    }

    /// Runs one cycle without consulting the gate.
    pub async fn sweep(&self) -> TickOutcome {
        match self.cycle.run_once().await {
            Ok(report) => TickOutcome::Completed(report),
            Err(err) => {
                let scope = err.scope();
                match scope {
                    FailureScope::Fatal => error!(error = %err, "ingestion cycle failed"),
                    FailureScope::Cycle | FailureScope::Event => {
                        warn!(error = %err, "ingestion cycle abandoned; retrying on next tick")
                    }
                }
                TickOutcome::Failed(scope)
            }
        }
    }

    /// Polls until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if self.settings.initial_sweep {
            info!("running initial sweep");
            self.sweep().await;
        }

        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "bucket poller started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("bucket poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
