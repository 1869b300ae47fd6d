//! Wire types for the Slack Web API methods the notifier calls.

use pipeline::Block;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct OpenConversation<'a> {
    pub users: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostMessage<'a> {
    pub channel: &'a str,
    pub blocks: &'a [Block],
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LookupByEmail {
    pub user: UserRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationOpened {
    pub channel: ChannelRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagePosted {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

/// The part of every Slack response that says whether the call worked.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
