//! Slack transport.
//!
//! Posts messages as legacy attachments through `chat.postMessage`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SlackConfig;
use crate::error::{Result, WatchError};
use crate::notifier::{ChatTransport, Delivery, Message};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for `chat.postMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct PostMessage<'a> {
    /// Destination channel.
    pub channel: &'a str,
    /// Top-level text, left empty so the attachment carries the content.
    pub text: &'a str,
    /// Message attachments.
    pub attachments: Vec<Attachment>,
}

/// A Slack message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Plain-text summary for clients that cannot render attachments.
    pub fallback: String,
    /// Sidebar color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Attachment fields.
    pub fields: Vec<AttachmentField>,
}

/// A field inside a Slack attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    /// Field title.
    pub title: String,
    /// Field value.
    pub value: String,
    /// Whether the field is short enough to sit beside another.
    pub short: bool,
}

impl From<&Message> for Attachment {
    fn from(message: &Message) -> Self {
        Self {
            fallback: message.summary.clone(),
            color: message.color().map(ToString::to_string),
            fields: message
                .fields
                .iter()
                .map(|f| AttachmentField {
                    title: f.title.clone(),
                    value: f.value.clone(),
                    short: f.short,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostMessageResponse {
    ok: bool,
    channel: Option<String>,
    ts: Option<String>,
    error: Option<String>,
}

/// Sends messages to a Slack channel.
#[derive(Debug, Clone)]
pub struct SlackTransport {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackTransport {
    /// Creates a transport for the configured channel.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Config` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: SlackConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WatchError::Config(format!("failed to build slack client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat.postMessage", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatTransport for SlackTransport {
    fn name(&self) -> &str {
        "slack"
    }

    async fn post(&self, message: &Message) -> Result<Delivery> {
        let body = PostMessage {
            channel: &self.config.channel,
            text: "",
            attachments: vec![Attachment::from(message)],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| WatchError::NotificationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::NotificationFailed(format!(
                "slack returned {status}"
            )));
        }

        let reply: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| WatchError::NotificationFailed(format!("invalid slack response: {e}")))?;

        if !reply.ok {
            return Err(WatchError::NotificationFailed(
                reply.error.unwrap_or_else(|| "unknown slack error".to_string()),
            ));
        }

        debug!(channel = %self.config.channel, "slack accepted message");
        Ok(Delivery {
            channel: reply.channel.unwrap_or_else(|| self.config.channel.clone()),
            timestamp: reply.ts.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_events::{Event, Severity, Verdict};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message(severity: Severity) -> Message {
        let event = Event::new("NodeOutOfDisk")
            .with_message("node-1 is out of disk")
            .with_object_kind("Node")
            .with_source("node-controller")
            .with_metadata("default", "node-1.17c");
        Message::build("production", &event, &Verdict::notify_with(severity))
    }

    fn transport(server: &MockServer) -> SlackTransport {
        SlackTransport::new(SlackConfig::new("C0123", "xoxb-test").with_api_url(server.uri()))
            .unwrap()
    }

    #[test]
    fn test_attachment_from_message() {
        let attachment = Attachment::from(&message(Severity::Danger));
        assert_eq!(attachment.fallback, "node-1 is out of disk");
        assert_eq!(attachment.color.as_deref(), Some("danger"));
        assert_eq!(attachment.fields.len(), 7);
        assert_eq!(attachment.fields[0].title, "Env");
        assert_eq!(attachment.fields[0].value, "production");
    }

    #[test]
    fn test_unset_severity_omits_color() {
        let event = Event::new("Pulled");
        let msg = Message::build("", &event, &Verdict::new(true, Severity::Unset));
        let json = serde_json::to_value(Attachment::from(&msg)).unwrap();
        assert!(json.get("color").is_none());
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let err = SlackTransport::new(SlackConfig::new("C0123", "")).unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[tokio::test]
    async fn test_post_message_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({
                "channel": "C0123",
                "attachments": [{"color": "danger", "fallback": "node-1 is out of disk"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channel": "C0123",
                "ts": "1700000000.000100"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = transport(&server)
            .post(&message(Severity::Danger))
            .await
            .unwrap();

        assert_eq!(delivery.channel, "C0123");
        assert_eq!(delivery.timestamp, "1700000000.000100");
    }

    #[tokio::test]
    async fn test_post_message_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "channel_not_found"})),
            )
            .mount(&server)
            .await;

        let err = transport(&server)
            .post(&message(Severity::Warning))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::NotificationFailed(msg) if msg == "channel_not_found"));
    }

    #[tokio::test]
    async fn test_post_message_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = transport(&server)
            .post(&message(Severity::Warning))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::NotificationFailed(msg) if msg.contains("500")));
    }
}
