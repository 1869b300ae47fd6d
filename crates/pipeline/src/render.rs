//! Presentation renderer: [`Event`] → chat message blocks.
//!
//! Rendering is a pure function of the event. The same event always yields a
//! byte-identical block sequence, which is what the golden tests below rely
//! on. Blocks follow the Slack Block Kit shape (`section` and `context`
//! blocks carrying `mrkdwn` text) because that is the only platform the
//! notifier speaks; nothing else in this module knows about Slack.

use serde::Serialize;

use crate::progress::ProgressChange;
use crate::vocabulary::{property_display_name, status_label};
use crate::{CompletionRatio, Event, PropertyDelta, StatusCode, Timestamp};

// ---------------------------------------------------------------------------
// Message model
// ---------------------------------------------------------------------------

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Ordered presentation blocks.
    pub blocks: Vec<Block>,
    /// Plain-text summary for clients that cannot show blocks.
    pub fallback_text: String,
}

/// One presentation block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// A paragraph of formatted text.
    Section { text: TextObject },
    /// A row of small secondary text elements.
    Context { elements: Vec<TextObject> },
}

/// Formatted text inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    /// Lightweight markdown (`*bold*`, backtick code spans, fenced code).
    Mrkdwn { text: String },
}

impl Block {
    fn section(text: String) -> Self {
        Block::Section {
            text: TextObject::Mrkdwn { text },
        }
    }
}

impl TextObject {
    /// Returns the raw text.
    pub fn text(&self) -> &str {
        match self {
            TextObject::Mrkdwn { text } => text,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Renders `event` into a [`Message`].
pub fn render(event: &Event) -> Message {
    let change = &event.change;
    let mut blocks = vec![Block::section(header_text(event))];

    let notes = normalize_notes(&change.notes);
    if !notes.is_empty() {
        blocks.push(Block::section(format!("*작성내용:* \n```{notes}```")));
    }

    if let Some(delta) = &change.delta {
        blocks.push(Block::section(property_change_text(delta)));
    }

    blocks.push(Block::Context {
        elements: vec![
            mrkdwn(format!("*Status:* {}", change.status)),
            mrkdwn(format!("*Priority:* {}", change.priority)),
            mrkdwn(format!("*Due Date:* {}", calendar_date(change.due_date))),
            mrkdwn(format!("*Created:* {}", calendar_date(change.created_on))),
        ],
    });

    Message {
        blocks,
        fallback_text: format!(
            "{}: {}(#{})",
            change.assignee, change.subject, change.job_id
        ),
    }
}

fn header_text(event: &Event) -> String {
    let change = &event.change;
    let mut text = format!(
        "*:large_yellow_circle: {} :large_yellow_circle:*\n*일감명:* {}(#{})",
        change.assignee, change.subject, change.job_id
    );
    // Fresh issues also show their description.
    if change.done_ratio.is_zero() {
        text.push_str(&format!("\n*업무내용:* \n{}", change.description));
    }
    text
}

/// Turns the tracker's `***` / `**` list markers into indented bullets.
///
/// The three-star rule must run first: `**` is a substring of `***`.
pub fn normalize_notes(notes: &str) -> String {
    notes.replace("***", "    -").replace("**", "  -")
}

/// Formats a single property transition.
pub fn property_change_text(delta: &PropertyDelta) -> String {
    let name = property_display_name(&delta.key);

    match delta.key.as_str() {
        "done_ratio" => {
            if let (Some(old), Some(new)) = (
                parse_ratio(&delta.old_value),
                parse_ratio(&delta.new_value),
            ) {
                let change = ProgressChange::between(old, new);
                return format!("*{name}:* \n{} :: {}", change.bar(), change.caption());
            }
        }
        "status_id" => {
            if let (Some(old), Some(new)) = (
                parse_integer(&delta.old_value),
                parse_integer(&delta.new_value),
            ) {
                return format!(
                    "*{name}:* \n`{}` => `{}`",
                    status_label(StatusCode::new(old)),
                    status_label(StatusCode::new(new))
                );
            }
        }
        _ => {}
    }

    format!(
        "*{name}:* \n```{} => {}```",
        delta.old_value, delta.new_value
    )
}

// An empty value means the field was unset, which the tracker treats as 0.
fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        Some(0)
    } else {
        value.parse().ok()
    }
}

fn parse_ratio(value: &str) -> Option<CompletionRatio> {
    parse_integer(value).and_then(CompletionRatio::new)
}

fn calendar_date(timestamp: Option<Timestamp>) -> String {
    timestamp.map_or_else(|| "-".to_string(), Timestamp::calendar_date)
}

fn mrkdwn(text: String) -> TextObject {
    TextObject::Mrkdwn { text }
}
