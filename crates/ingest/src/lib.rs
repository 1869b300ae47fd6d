//! rm-notify ingestion cycle.
//!
//! One [`IngestionCycle::run_once`] is one pass over the watched bucket:
//!
//! 1. list the configured prefix,
//! 2. fetch and decode every object,
//! 3. order the batch (timestamp ledgers only),
//! 4. deduplicate against the [`pipeline::DedupLedger`],
//! 5. apply the [`pipeline::DeliveryPolicy`],
//! 6. render and deliver through the [`pipeline::Notifier`],
//! 7. move the delivered object into the archive prefix.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The cycle sequences calls between the business
//! logic in [`pipeline`] and the port traits. It contains no rendering,
//! dedup or policy rules of its own.

mod cycle;
mod report;

pub use cycle::{CycleSettings, IngestionCycle};
pub use report::CycleReport;
