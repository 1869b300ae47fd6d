//! In-memory implementations of the port traits.
//!
//! Always compiled (no feature flag) so every crate in the workspace can
//! drive the pipeline in its tests without a bucket, a chat platform or a
//! file system.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Clock, DeliveryError, DeliveryReceipt, DeliveryStage, LedgerSnapshotStore, Message,
    ObjectKey, ObjectMeta, ObjectStore, Recipient, SnapshotIoError, StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Snapshot store
// ---------------------------------------------------------------------------

/// Ledger snapshot held in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    contents: Mutex<Option<Vec<u8>>>,
    fail_writes: Mutex<bool>,
}

impl MemorySnapshotStore {
    /// An empty store (as if no snapshot file exists).
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `bytes` as its snapshot.
    pub fn with_contents(bytes: Vec<u8>) -> Self {
        Self {
            contents: Mutex::new(Some(bytes)),
            fail_writes: Mutex::new(false),
        }
    }

    /// The currently stored snapshot.
    pub fn contents(&self) -> Option<Vec<u8>> {
        lock(&self.contents).clone()
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }
}

impl LedgerSnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Vec<u8>>, SnapshotIoError> {
        Ok(self.contents())
    }

    fn store(&self, bytes: &[u8]) -> Result<(), SnapshotIoError> {
        if *lock(&self.fail_writes) {
            return Err(SnapshotIoError {
                operation: "store",
                message: "disk full".to_string(),
            });
        }
        *lock(&self.contents) = Some(bytes.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// A call made against a [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Get(ObjectKey),
    Copy(ObjectKey, ObjectKey),
    Delete(ObjectKey),
}

#[derive(Debug, Default)]
struct StoreState {
    objects: Vec<(ObjectKey, Vec<u8>)>,
    calls: Vec<StoreCall>,
    fail_list: bool,
    fail_get: HashSet<ObjectKey>,
    fail_copy: bool,
}

/// Bucket held in memory. Lists objects in insertion order.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an object.
    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        let key = ObjectKey::new(key).expect("object key must not be empty");
        let bytes = bytes.into();
        let mut state = lock(&self.state);
        match state.objects.iter().position(|(k, _)| *k == key) {
            Some(index) => state.objects[index].1 = bytes,
            None => state.objects.push((key, bytes)),
        }
    }

    /// Keys currently in the bucket, in listing order.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.state)
            .objects
            .iter()
            .map(|(k, _)| k.to_string())
            .collect()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.state).calls.clone()
    }

    /// Makes `list` fail.
    pub fn fail_list(&self, fail: bool) {
        lock(&self.state).fail_list = fail;
    }

    /// Makes `get` fail for `key` with [`StoreError::Unavailable`].
    pub fn fail_get(&self, key: &str) {
        if let Some(key) = ObjectKey::new(key) {
            lock(&self.state).fail_get.insert(key);
        }
    }

    /// Makes `copy` fail.
    pub fn fail_copy(&self, fail: bool) {
        lock(&self.state).fail_copy = fail;
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut state = lock(&self.state);
        state.calls.push(StoreCall::List(prefix.to_string()));
        if state.fail_list {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.as_str().starts_with(prefix))
            .map(|(key, bytes)| ObjectMeta {
                key: key.clone(),
                last_modified: None,
                size: u64::try_from(bytes.len()).ok(),
            })
            .collect())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        let mut state = lock(&self.state);
        state.calls.push(StoreCall::Get(key.clone()));
        if state.fail_get.contains(key) {
            return Err(StoreError::Unavailable(format!("timeout reading {key}")));
        }
        state
            .objects
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.calls.push(StoreCall::Copy(src.clone(), dst.clone()));
        if state.fail_copy {
            return Err(StoreError::Unavailable("copy rejected".to_string()));
        }
        let bytes = state
            .objects
            .iter()
            .find(|(k, _)| k == src)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
        state.objects.retain(|(k, _)| k != dst);
        state.objects.push((dst.clone(), bytes));
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.calls.push(StoreCall::Delete(key.clone()));
        state.objects.retain(|(k, _)| k != key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Notifier that records every delivered message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(Recipient, Message)>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent deliveries fail (or succeed again).
    pub fn fail_deliveries(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    /// Messages delivered so far, in order.
    pub fn delivered(&self) -> Vec<(Recipient, Message)> {
        lock(&self.delivered).clone()
    }
}

#[async_trait]
impl crate::Notifier for RecordingNotifier {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &Message,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if *lock(&self.fail) {
            return Err(DeliveryError::new(DeliveryStage::PostMessage, "channel_not_found")
                .with_response(200, r#"{"ok":false,"error":"channel_not_found"}"#));
        }
        let mut delivered = lock(&self.delivered);
        delivered.push((recipient.clone(), message.clone()));
        Ok(DeliveryReceipt {
            channel: "D0000000".to_string(),
            message_ref: Some(delivered.len().to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Clock that can be set to any instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
