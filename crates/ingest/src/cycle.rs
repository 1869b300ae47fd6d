use std::ops::ControlFlow;
use std::sync::Arc;

use pipeline::{
    archive, render, Admission, CycleId, DedupKey, DedupLedger, DedupStrategy, DeliveryPolicy,
    Event, MarkPolicy, Notifier, ObjectStore, PipelineError, Recipient, Reservation, StoreError,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::CycleReport;

/// Fixed inputs of every cycle, read once from configuration.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Prefix listed on every cycle (e.g. `"issues/"`).
    pub prefix: String,
    /// Where delivered objects are moved to; `None` leaves them in place.
    pub archive_prefix: Option<String>,
    pub policy: DeliveryPolicy,
    pub recipient: Recipient,
    pub mark: MarkPolicy,
}

/// Runs ingestion passes over one bucket.
pub struct IngestionCycle {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<DedupLedger>,
    settings: CycleSettings,
}

impl IngestionCycle {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<DedupLedger>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            ledger,
            settings,
        }
    }

    /// Runs one pass over the bucket.
    ///
    /// Per-event failures are logged and counted in the report. Only a
    /// failure to list or fetch the batch aborts the cycle, with
    /// [`PipelineError::StoreUnavailable`]; nothing is marked or delivered
    /// for events that were not reached.
    pub async fn run_once(&self) -> Result<CycleReport, PipelineError> {
        let cycle_id = CycleId::new_random();
        let span = info_span!("ingestion_cycle", %cycle_id, prefix = %self.settings.prefix);
        self.run(cycle_id).instrument(span).await
    }

    async fn run(&self, cycle_id: CycleId) -> Result<CycleReport, PipelineError> {
        let mut report = CycleReport::default();
        let mut events = self.fetch_batch(&mut report).await?;

        if self.ledger.strategy() == DedupStrategy::HighWater {
            // Stable, so equal timestamps keep listing order.
            events.sort_by_key(|event| event.occurred_at);
        }

        for event in &events {
            if self.handle(event, &mut report).await.is_break() {
                warn!(
                    object_key = %event.object_key,
                    "stopping batch after delivery failure; remaining events retry next cycle"
                );
                break;
            }
        }

        if report.is_idle() {
            debug!(%cycle_id, "no objects to process");
        } else {
            info!(
                %cycle_id,
                listed = report.listed,
                vanished = report.vanished,
                malformed = report.malformed,
                duplicate = report.duplicate,
                filtered = report.filtered,
                delivered = report.delivered,
                delivery_failed = report.delivery_failed,
                archived = report.archived,
                archive_failed = report.archive_failed,
                persist_failed = report.persist_failed,
                "ingestion cycle finished"
            );
        }
        Ok(report)
    }

    async fn fetch_batch(&self, report: &mut CycleReport) -> Result<Vec<Event>, PipelineError> {
        let listing = self
            .store
            .list(&self.settings.prefix)
            .await
            .map_err(PipelineError::StoreUnavailable)?;

        let mut events = Vec::with_capacity(listing.len());
        for meta in listing {
            if meta.key.is_folder_marker() {
                continue;
            }
            report.listed += 1;

            let bytes = match self.store.get(&meta.key).await {
                Ok(bytes) => bytes,
                Err(StoreError::NotFound(_)) => {
                    warn!(object_key = %meta.key, "object vanished between list and get; skipping");
                    report.vanished += 1;
                    continue;
                }
                Err(err) => return Err(PipelineError::StoreUnavailable(err)),
            };

            match Event::decode(&bytes, meta.key) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(object_key = %err.object_key, reason = %err.reason, "skipping malformed event");
                    report.malformed += 1;
                }
            }
        }
        Ok(events)
    }

    async fn handle(&self, event: &Event, report: &mut CycleReport) -> ControlFlow<()> {
        let Some(key) = self.ledger.key_for(event) else {
            warn!(
                object_key = %event.object_key,
                strategy = ?self.ledger.strategy(),
                "event lacks the identity the ledger needs; skipping"
            );
            report.malformed += 1;
            return ControlFlow::Continue(());
        };

        match self.settings.mark {
            MarkPolicy::BeforeDelivery => {
                self.mark_then_deliver(event, &key, report).await;
                ControlFlow::Continue(())
            }
            MarkPolicy::AfterDelivery => self.deliver_then_mark(event, &key, report).await,
        }
    }

    async fn mark_then_deliver(&self, event: &Event, key: &DedupKey, report: &mut CycleReport) {
        match self.ledger.admit(key) {
            Admission::Duplicate => {
                debug!(object_key = %event.object_key, %key, "duplicate event");
                report.duplicate += 1;
                return;
            }
            Admission::Admitted => {}
            Admission::AdmittedUnpersisted(err) => {
                error!(object_key = %event.object_key, %key, error = %err, "ledger snapshot not written");
                report.persist_failed += 1;
            }
        }

        if !self.settings.policy.admits(event) {
            debug!(object_key = %event.object_key, kind = %event.kind, status = %event.change.status, "filtered by delivery policy");
            report.filtered += 1;
            return;
        }

        if self.deliver(event, report).await {
            self.archive(event, report).await;
        }
    }

    async fn deliver_then_mark(
        &self,
        event: &Event,
        key: &DedupKey,
        report: &mut CycleReport,
    ) -> ControlFlow<()> {
        let Some(reservation) = self.ledger.reserve(key) else {
            debug!(object_key = %event.object_key, %key, "duplicate event");
            report.duplicate += 1;
            return ControlFlow::Continue(());
        };

        if !self.settings.policy.admits(event) {
            debug!(object_key = %event.object_key, kind = %event.kind, status = %event.change.status, "filtered by delivery policy");
            report.filtered += 1;
            self.commit(reservation, event, report);
            return ControlFlow::Continue(());
        }

        if self.deliver(event, report).await {
            self.commit(reservation, event, report);
            self.archive(event, report).await;
            return ControlFlow::Continue(());
        }

        self.ledger.release(reservation);
        // A later timestamp would move the mark past this event.
        if self.ledger.strategy() == DedupStrategy::HighWater {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn commit(&self, reservation: Reservation, event: &Event, report: &mut CycleReport) {
        if let Err(err) = self.ledger.commit(reservation) {
            error!(object_key = %event.object_key, error = %err, "ledger snapshot not written");
            report.persist_failed += 1;
        }
    }

    /// Returns `true` if the message was delivered.
    async fn deliver(&self, event: &Event, report: &mut CycleReport) -> bool {
        let message = render(event);
        match self
            .notifier
            .deliver(&self.settings.recipient, &message)
            .await
        {
            Ok(receipt) => {
                info!(
                    object_key = %event.object_key,
                    job_id = %event.change.job_id,
                    channel = %receipt.channel,
                    "notification delivered"
                );
                report.delivered += 1;
                true
            }
            Err(source) => {
                let err = PipelineError::DeliveryFailed {
                    object_key: event.object_key.clone(),
                    source,
                };
                error!(error = %err, "notification not delivered");
                report.delivery_failed += 1;
                false
            }
        }
    }

    async fn archive(&self, event: &Event, report: &mut CycleReport) {
        let Some(prefix) = &self.settings.archive_prefix else {
            return;
        };
        let destination = event.object_key.with_prefix(prefix);
        match archive(self.store.as_ref(), &event.object_key, &destination).await {
            Ok(()) => {
                debug!(object_key = %event.object_key, %destination, "object archived");
                report.archived += 1;
            }
            Err(source) => {
                let err = PipelineError::ArchiveFailed {
                    object_key: event.object_key.clone(),
                    source,
                };
                error!(error = %err, "object not archived");
                report.archive_failed += 1;
            }
        }
    }
}
