//! Error and failure-scope types for the notification pipeline.
//!
//! [`PipelineError`] is the taxonomy the ingestion cycle reasons about.
//! Component-level errors ([`StoreError`], [`DeliveryError`],
//! [`SnapshotIoError`], [`MalformedEvent`]) are produced by the ports and the
//! decoder and wrapped into a [`PipelineError`] where the cycle reports them.
//!
//! [`FailureScope`] is a cross-cutting concern: every [`PipelineError`] says
//! how much of the work it spoils, and the cycle uses that to decide whether
//! to skip one event, abandon the cycle, or refuse to start.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ObjectKey;

// ---------------------------------------------------------------------------
// Failure scope
// ---------------------------------------------------------------------------

/// How much work a failure affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    /// Only the current event is affected; the batch continues.
    Event,
    /// The whole cycle is abandoned and retried on the next tick.
    Cycle,
    /// The process cannot safely run; an operator must intervene.
    Fatal,
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors the ingestion pipeline reports.
///
/// None of these are surfaced interactively; they are logged by whoever
/// observes them and their [`FailureScope`] decides what happens next.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stored object could not be decoded into an event.
    #[error(transparent)]
    MalformedEvent(#[from] MalformedEvent),

    /// The object store could not list or fetch the batch.
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The persisted ledger snapshot exists but cannot be trusted.
    ///
    /// Produced at startup only. The operator must repair or remove the
    /// snapshot file; the pipeline never guesses at its contents.
    #[error("Ledger snapshot is corrupt: {reason}")]
    LedgerCorrupt {
        /// Why the snapshot was rejected.
        reason: String,
    },

    /// Writing the ledger snapshot failed.
    ///
    /// The in-memory ledger remains authoritative for the rest of the process.
    #[error("Failed to persist ledger snapshot: {0}")]
    LedgerPersistFailed(#[source] SnapshotIoError),

    /// The notifier could not deliver a message.
    #[error("Delivery of '{object_key}' failed: {source}")]
    DeliveryFailed {
        /// The object the undelivered event was read from.
        object_key: ObjectKey,
        /// What went wrong at the chat platform.
        #[source]
        source: DeliveryError,
    },

    /// Moving a delivered object into the archive namespace failed.
    #[error("Archiving '{object_key}' failed: {source}")]
    ArchiveFailed {
        /// The object that stayed in place.
        object_key: ObjectKey,
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The runtime configuration is invalid.
    ///
    /// Produced at load time; the process never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl PipelineError {
    /// Returns how much work this failure affects.
    pub fn scope(&self) -> FailureScope {
        match self {
            PipelineError::MalformedEvent(_)
            | PipelineError::LedgerPersistFailed(_)
            | PipelineError::DeliveryFailed { .. }
            | PipelineError::ArchiveFailed { .. } => FailureScope::Event,
            PipelineError::StoreUnavailable(_) => FailureScope::Cycle,
            PipelineError::LedgerCorrupt { .. } | PipelineError::Configuration { .. } => {
                FailureScope::Fatal
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Component errors
// ---------------------------------------------------------------------------

/// A stored payload that is not a valid event.
#[derive(Debug, Error)]
#[error("Malformed event in '{object_key}': {reason}")]
pub struct MalformedEvent {
    /// The object the payload was read from.
    pub object_key: ObjectKey,
    /// What was wrong with it.
    pub reason: String,
}

/// Failures reported by an [`crate::ObjectStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist (e.g. it was moved since it was listed).
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The store could not complete the operation.
    #[error("Object store operation failed: {0}")]
    Unavailable(String),
}

/// The step of a delivery that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    /// Resolving the recipient to a chat-platform user.
    ResolveRecipient,
    /// Opening the direct-message channel.
    OpenChannel,
    /// Posting the rendered message.
    PostMessage,
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeliveryStage::ResolveRecipient => "resolve recipient",
            DeliveryStage::OpenChannel => "open channel",
            DeliveryStage::PostMessage => "post message",
        };
        f.write_str(label)
    }
}

/// Failure reported by a [`crate::Notifier`].
///
/// Carries the remote status and body when the platform answered, so the log
/// line alone is enough to diagnose a rejected message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} failed: {reason}{}", describe_remote(.status, .body))]
pub struct DeliveryError {
    /// The step that failed.
    pub stage: DeliveryStage,
    /// HTTP status of the response, if one was received.
    pub status: Option<u16>,
    /// Response body (possibly truncated), if one was received.
    pub body: Option<String>,
    /// Human-readable description.
    pub reason: String,
}

impl DeliveryError {
    /// Creates an error for a failure with no remote response.
    pub fn new(stage: DeliveryStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: None,
            body: None,
            reason: reason.into(),
        }
    }

    /// Attaches the remote status and body.
    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.status = Some(status);
        self.body = Some(body.into());
        self
    }
}

fn describe_remote(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body) {
        (Some(status), Some(body)) => format!(" (status {status}: {body})"),
        (Some(status), None) => format!(" (status {status})"),
        _ => String::new(),
    }
}

/// Failure reading or writing a ledger snapshot.
#[derive(Debug, Error)]
#[error("Ledger snapshot {operation} failed: {message}")]
pub struct SnapshotIoError {
    /// `"load"` or `"store"`.
    pub operation: &'static str,
    /// Description of the underlying failure.
    pub message: String,
}
