//! Newtype domain identifiers.
//!
//! Every concept that has an identity is represented as a distinct newtype
//! wrapping a primitive, so an [`EventId`] can never be passed where an
//! [`ObjectKey`] is expected even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (tracker-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tracker-assigned integer identifiers
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies the issue a change record belongs to.
    IssueId
}

u64_id! {
    /// The job number shown to people in the message header (`#1234`).
    JobId
}

// ---------------------------------------------------------------------------
// Internally generated identifiers
// ---------------------------------------------------------------------------

/// Identifies a single ingestion cycle.
///
/// Generated fresh for every poll and recorded on the cycle's tracing span so
/// all log lines from one pass over the bucket can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Generates a new random cycle identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// String identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Producer-assigned event identifier (the CloudEvents `id` attribute).
    ///
    /// Immutable once assigned; the key of the identity-mode dedup ledger.
    EventId
}

string_id! {
    /// Key of an object in the watched bucket (e.g. `"issues/2024-05-01T10.json"`).
    ObjectKey
}

string_id! {
    /// The person a notification is addressed to, identified by e-mail.
    ///
    /// The notifier resolves it to a chat-platform user and channel.
    Recipient
}

impl ObjectKey {
    /// Returns this key moved under `prefix` (e.g. `"processed/"`).
    pub fn with_prefix(&self, prefix: &str) -> ObjectKey {
        Self(format!("{prefix}{}", self.0))
    }

    /// Returns `true` for zero-byte "folder" marker keys.
    pub fn is_folder_marker(&self) -> bool {
        self.0.ends_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_reject_empty_values() {
        assert!(EventId::new("").is_none());
        assert_eq!(EventId::new("evt-1").unwrap().as_str(), "evt-1");
    }

    #[test]
    fn test_object_key_archive_path_keeps_original_key() {
        let key = ObjectKey::new("issues/a.json").unwrap();
        assert_eq!(key.with_prefix("processed/").as_str(), "processed/issues/a.json");
        assert!(!key.is_folder_marker());
        assert!(ObjectKey::new("issues/").unwrap().is_folder_marker());
    }
}
