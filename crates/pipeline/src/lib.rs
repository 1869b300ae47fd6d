//! Core domain for rm-notify.
//!
//! This crate contains every domain concept of the notification pipeline:
//! the event model and decoder, the presentation renderer, the dedup ledger,
//! the business-hours gate and delivery policy, and the port traits that
//! infrastructure crates implement. Infrastructure crates never add domain
//! rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`EventId`, `ObjectKey`, `Recipient`, etc.) |
//! | [`types`] | Value types (`CompletionRatio`, `StatusCode`, `Timestamp`) |
//! | [`errors`] | Error taxonomy and failure scopes |
//! | [`event`] | `Event` model and decoder |
//! | [`render`] | Presentation renderer and message blocks |
//! | [`progress`] | Progress-bar computation |
//! | [`vocabulary`] | Property and status display tables |
//! | [`ledger`] | Dedup ledger, strategies and mark policy |
//! | [`gate`] | Business-hours gate |
//! | [`policy`] | Delivery policy |
//! | [`ports`] | `ObjectStore`, `Notifier`, `LedgerSnapshotStore`, `Clock` |
//! | [`testing`] | In-memory port implementations |

pub mod errors;
pub mod event;
pub mod gate;
pub mod identifiers;
pub mod ledger;
pub mod policy;
pub mod ports;
pub mod progress;
pub mod render;
pub mod testing;
pub mod types;
pub mod vocabulary;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{
    DeliveryError, DeliveryStage, FailureScope, MalformedEvent, PipelineError, SnapshotIoError,
    StoreError,
};
pub use event::{ChangeRecord, Event, PropertyDelta};
pub use gate::BusinessHours;
pub use identifiers::{CycleId, EventId, IssueId, JobId, ObjectKey, Recipient};
pub use ledger::{
    Admission, DedupKey, DedupLedger, DedupStrategy, LedgerState, MarkPolicy, Reservation,
};
pub use policy::DeliveryPolicy;
pub use ports::{
    archive, Clock, DeliveryReceipt, LedgerSnapshotStore, Notifier, ObjectMeta, ObjectStore,
    SystemClock,
};
pub use render::{render, Block, Message, TextObject};
pub use types::{CompletionRatio, StatusCode, Timestamp};
