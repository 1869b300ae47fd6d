use std::time::Duration;

use async_trait::async_trait;
use pipeline::{DeliveryError, DeliveryReceipt, DeliveryStage, Message, Notifier, Recipient};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::api::{
    ConversationOpened, Envelope, LookupByEmail, MessagePosted, OpenConversation, PostMessage,
};

/// Longest response body kept on a [`DeliveryError`], in characters.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Connection settings for the Slack Web API.
#[derive(Debug, Clone)]
pub struct SlackSettings {
    /// Bot token (`xoxb-...`).
    pub token: String,
    /// Base URL of the Web API, without a trailing method name.
    pub api_base: String,
    /// Upper bound on each HTTP request.
    pub timeout: Duration,
}

/// Failure to construct a [`SlackNotifier`].
#[derive(Debug, Error)]
pub enum SlackSetupError {
    #[error("Slack token is not a valid HTTP header value")]
    InvalidToken,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`Notifier`] that sends direct messages through the Slack Web API.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    api_base: String,
}

impl SlackNotifier {
    pub fn new(settings: &SlackSettings) -> Result<Self, SlackSetupError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .map_err(|_| SlackSetupError::InvalidToken)?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("rm-notify/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn lookup_user(&self, recipient: &Recipient) -> Result<String, DeliveryError> {
        let request = self
            .client
            .get(self.url("users.lookupByEmail"))
            .query(&[("email", recipient.as_str())]);
        let found: LookupByEmail = call(DeliveryStage::ResolveRecipient, request).await?;
        Ok(found.user.id)
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, DeliveryError> {
        let request = self
            .client
            .post(self.url("conversations.open"))
            .json(&OpenConversation { users: user_id });
        let opened: ConversationOpened = call(DeliveryStage::OpenChannel, request).await?;
        Ok(opened.channel.id)
    }

    async fn post(&self, channel: &str, message: &Message) -> Result<MessagePosted, DeliveryError> {
        let request = self
            .client
            .post(self.url("chat.postMessage"))
            .json(&PostMessage {
                channel,
                blocks: &message.blocks,
                text: &message.fallback_text,
            });
        call(DeliveryStage::PostMessage, request).await
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &Message,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let user_id = self.lookup_user(recipient).await?;
        let channel = self.open_direct_channel(&user_id).await?;
        debug!(%recipient, %user_id, %channel, "resolved direct-message channel");

        let posted = self.post(&channel, message).await?;
        Ok(DeliveryReceipt {
            channel: posted.channel.unwrap_or(channel),
            message_ref: posted.ts,
        })
    }
}

/// Sends `request` and decodes a successful Slack response as `T`.
///
/// Slack reports most failures as HTTP 200 with `"ok": false`; both that and
/// a non-2xx status become a [`DeliveryError`] carrying the response.
async fn call<T: DeserializeOwned>(
    stage: DeliveryStage,
    request: RequestBuilder,
) -> Result<T, DeliveryError> {
    let response = request
        .send()
        .await
        .map_err(|err| DeliveryError::new(stage, format!("request failed: {err}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| DeliveryError::new(stage, format!("failed to read response: {err}")))?;

    let rejected = |reason: String| {
        DeliveryError::new(stage, reason).with_response(status.as_u16(), truncate(&body))
    };

    if !status.is_success() {
        return Err(rejected(format!("unexpected HTTP status {status}")));
    }

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| rejected(format!("response is not JSON: {err}")))?;
    let envelope: Envelope = serde_json::from_value(value.clone())
        .map_err(|err| rejected(format!("response has no 'ok' field: {err}")))?;
    if !envelope.ok {
        return Err(rejected(
            envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
        ));
    }
    serde_json::from_value(value).map_err(|err| rejected(format!("unexpected response shape: {err}")))
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_bodies_and_cuts_on_char_boundary() {
        assert_eq!(truncate("short"), "short");

        let long = "가".repeat(MAX_ERROR_BODY_CHARS + 10);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_api_base_trailing_slash_is_ignored() {
        let notifier = SlackNotifier::new(&SlackSettings {
            token: "xoxb-test".to_string(),
            api_base: "https://slack.example/api/".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert_eq!(
            notifier.url("chat.postMessage"),
            "https://slack.example/api/chat.postMessage"
        );
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let err = SlackNotifier::new(&SlackSettings {
            token: "xoxb\nbad".to_string(),
            api_base: "https://slack.com/api".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();

        assert!(matches!(err, SlackSetupError::InvalidToken));
    }
}
