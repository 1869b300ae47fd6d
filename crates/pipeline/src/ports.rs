//! Port traits implemented by infrastructure crates.
//!
//! The pipeline never talks to a bucket, a chat platform, a file system or
//! the system clock directly; it goes through these traits so the cycle can
//! be exercised with the in-memory doubles in [`crate::testing`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{DeliveryError, Message, ObjectKey, Recipient, SnapshotIoError, StoreError};

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Metadata of a listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: ObjectKey,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// A bucket of event files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object under `prefix`, in the store's listing order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError>;

    /// Fetches the full contents of an object.
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError>;

    /// Copies `src` to `dst` inside the same bucket.
    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> Result<(), StoreError>;

    /// Deletes an object.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Moves `src` to `dst`: copy, then delete the original.
///
/// If the delete fails the copy is left in place; the object then exists in
/// both namespaces, which is harmless because listing only covers the source
/// prefix and the ledger already holds the event.
pub async fn archive(
    store: &dyn ObjectStore,
    src: &ObjectKey,
    dst: &ObjectKey,
) -> Result<(), StoreError> {
    store.copy(src, dst).await?;
    store.delete(src).await
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// What the platform reported back for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Channel the message was posted to.
    pub channel: String,
    /// Platform timestamp / id of the posted message, if returned.
    pub message_ref: Option<String>,
}

/// Sends rendered messages to people.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Resolves `recipient` to a delivery channel and posts `message` there.
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &Message,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

// ---------------------------------------------------------------------------
// Ledger snapshot
// ---------------------------------------------------------------------------

/// Durable home of the dedup ledger snapshot.
///
/// Called while the ledger holds its lock, so implementations must not
/// await.
pub trait LedgerSnapshotStore: Send + Sync {
    /// Returns the last stored snapshot, or `None` if none was ever stored.
    fn load(&self) -> Result<Option<Vec<u8>>, SnapshotIoError>;

    /// Replaces the stored snapshot with `bytes`.
    ///
    /// Implementations must never leave a partially written snapshot where
    /// [`LedgerSnapshotStore::load`] would read it.
    fn store(&self, bytes: &[u8]) -> Result<(), SnapshotIoError>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
