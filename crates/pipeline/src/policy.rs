//! Which events are worth a notification.

use serde::{Deserialize, Serialize};

use crate::Event;

/// Notify only for events of one kind in one status.
///
/// Everything else is recorded as handled and dropped silently: no render,
/// no delivery, no archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryPolicy {
    /// Required event kind (CloudEvents `type`).
    pub kind: String,
    /// Required status label of the change record.
    pub status: String,
}

impl DeliveryPolicy {
    /// Creates a policy matching exactly `kind` and `status`.
    pub fn new(kind: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status: status.into(),
        }
    }

    /// Returns `true` if `event` should be delivered.
    pub fn admits(&self, event: &Event) -> bool {
        event.kind == self.kind && event.change.status == self.status
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::new("com.example.issue", "접수(Receipt)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeRecord, ObjectKey};

    fn event(kind: &str, status: &str) -> Event {
        Event {
            id: None,
            occurred_at: None,
            kind: kind.to_string(),
            source: String::new(),
            change: ChangeRecord {
                status: status.to_string(),
                ..ChangeRecord::default()
            },
            object_key: ObjectKey::new("issues/a.json").unwrap(),
        }
    }

    #[test]
    fn test_policy_requires_both_kind_and_status() {
        let policy = DeliveryPolicy::new("issue-change", "received");

        assert!(policy.admits(&event("issue-change", "received")));
        assert!(!policy.admits(&event("issue-change", "closed")));
        assert!(!policy.admits(&event("comment", "received")));
    }
}
