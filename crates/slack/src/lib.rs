//! Slack notifier adapter.
//!
//! Implements [`pipeline::Notifier`] over the Slack Web API. One delivery is
//! three calls, each a separate [`pipeline::DeliveryStage`]:
//!
//! | Stage | Method | Result |
//! |-------|--------|--------|
//! | `ResolveRecipient` | `users.lookupByEmail` | user id |
//! | `OpenChannel` | `conversations.open` | direct-message channel id |
//! | `PostMessage` | `chat.postMessage` | message timestamp |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, authentication and Slack's response
//! envelope live here. The [`pipeline`] crate sees only
//! [`pipeline::Notifier`] and [`pipeline::DeliveryError`].

mod api;
mod notifier;

pub use notifier::{SlackNotifier, SlackSettings, SlackSetupError};
