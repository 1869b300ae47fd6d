//! The event model and its decoder.
//!
//! Producers drop one CloudEvents 1.0 JSON document per issue change into the
//! bucket. [`Event::decode`] turns those bytes into a typed [`Event`]; it is
//! deliberately lenient about shape (unknown fields are ignored, missing or
//! `null` fields take their zero value) and strict about invariants (a
//! completion ratio outside `[0, 100]` is rejected).

use serde::Deserialize;
use serde_json::Value;

use crate::{
    CompletionRatio, EventId, IssueId, JobId, MalformedEvent, ObjectKey, StatusCode, Timestamp,
};

// ---------------------------------------------------------------------------
// Domain model
// ---------------------------------------------------------------------------

/// One decoded "issue changed" event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Producer-assigned identity; `None` when the producer omitted it.
    pub id: Option<EventId>,
    /// When the change happened; the ordering key of the high-water ledger.
    pub occurred_at: Option<Timestamp>,
    /// Free-form classification (the CloudEvents `type`).
    pub kind: String,
    /// The producing system (the CloudEvents `source`).
    pub source: String,
    /// What changed.
    pub change: ChangeRecord,
    /// The object the event was read from.
    pub object_key: ObjectKey,
}

/// The issue snapshot carried by an [`Event`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeRecord {
    pub issue_id: IssueId,
    pub job_id: JobId,
    pub login: String,
    pub subject: String,
    pub description: String,
    pub notes: String,
    pub assignee: String,
    pub author: String,
    pub email: String,
    pub commentor: String,
    /// Human-readable status label, e.g. `"접수(Receipt)"`.
    pub status: String,
    pub status_code: StatusCode,
    pub priority: String,
    pub done_ratio: CompletionRatio,
    pub estimated_hours: f64,
    pub start_date: Option<Timestamp>,
    pub due_date: Option<Timestamp>,
    pub created_on: Option<Timestamp>,
    pub updated_on: Option<Timestamp>,
    /// The single field transition this change is about, if any.
    pub delta: Option<PropertyDelta>,
}

/// A single field's old → new transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyDelta {
    /// Category of the property (`"attr"`, `"relation"`, ...).
    pub category: String,
    /// Tracker field name, e.g. `"done_ratio"` or `"status_id"`.
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

impl Event {
    /// Decodes an event from the raw bytes of the object at `object_key`.
    pub fn decode(bytes: &[u8], object_key: ObjectKey) -> Result<Event, MalformedEvent> {
        let malformed = |reason: String| MalformedEvent {
            object_key: object_key.clone(),
            reason,
        };

        let wire: WireEvent =
            serde_json::from_slice(bytes).map_err(|err| malformed(err.to_string()))?;
        let data = wire.data.unwrap_or_default();

        let raw_ratio = data.done_ratio.unwrap_or(0);
        let done_ratio = CompletionRatio::new(raw_ratio)
            .ok_or_else(|| malformed(format!("done_ratio {raw_ratio} is outside 0..=100")))?;

        let delta = PropertyDelta {
            category: data.property.unwrap_or_default(),
            key: data.prop_key.unwrap_or_default(),
            old_value: value_text(data.old_value),
            new_value: value_text(data.value),
        };
        let delta = (!delta.category.is_empty() || !delta.key.is_empty()).then_some(delta);

        Ok(Event {
            id: wire.id.and_then(EventId::new),
            occurred_at: wire.time,
            kind: wire.kind.unwrap_or_default(),
            source: wire.source.unwrap_or_default(),
            change: ChangeRecord {
                issue_id: IssueId::new(data.id.unwrap_or(0)),
                job_id: JobId::new(data.job_id.unwrap_or(0)),
                login: data.login.unwrap_or_default(),
                subject: data.subject.unwrap_or_default(),
                description: data.description.unwrap_or_default(),
                notes: data.notes.unwrap_or_default(),
                assignee: data.assignee.unwrap_or_default(),
                author: data.author.unwrap_or_default(),
                email: data.email.unwrap_or_default(),
                commentor: data.commentor.unwrap_or_default(),
                status: data.status.unwrap_or_default(),
                status_code: StatusCode::new(data.status_id.unwrap_or(0)),
                priority: data.priority.unwrap_or_default(),
                done_ratio,
                estimated_hours: data.estimated_hours.unwrap_or(0.0),
                start_date: data.start_date,
                due_date: data.due_date,
                created_on: data.created_on,
                updated_on: data.updated_on,
                delta,
            },
            object_key,
        })
    }
}

// Delta values are strings in the tracker's journal, but some producers emit
// bare numbers; both are carried as text.
fn value_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEvent {
    id: Option<String>,
    source: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    time: Option<Timestamp>,
    data: Option<WireChange>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireChange {
    id: Option<u64>,
    login: Option<String>,
    job_id: Option<u64>,
    status: Option<String>,
    status_id: Option<i64>,
    assignee: Option<String>,
    start_date: Option<Timestamp>,
    due_date: Option<Timestamp>,
    done_ratio: Option<i64>,
    estimated_hours: Option<f64>,
    priority: Option<String>,
    author: Option<String>,
    email: Option<String>,
    subject: Option<String>,
    description: Option<String>,
    commentor: Option<String>,
    notes: Option<String>,
    created_on: Option<Timestamp>,
    updated_on: Option<Timestamp>,
    property: Option<String>,
    prop_key: Option<String>,
    old_value: Option<Value>,
    value: Option<Value>,
}
