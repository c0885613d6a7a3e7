//! Notification formatting and delivery.
//!
//! This module provides the [`Notifier`] trait used by the dispatch loop, the
//! [`ChatTransport`] trait for the wire side, and [`ChatNotifier`], which
//! turns an event and its verdict into a [`Message`], applies the severity
//! gate and hands the message to a transport.

use std::fmt;

use async_trait::async_trait;
use claw_events::{Event, Severity, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NotifierConfig;
use crate::error::Result;

/// A labeled value in a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageField {
    /// Field label.
    pub title: String,
    /// Field value.
    pub value: String,
    /// Whether the field may be laid out side by side with others.
    pub short: bool,
}

impl MessageField {
    fn new(title: &str, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short,
        }
    }
}

/// A structured chat message describing one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// One-line summary, shown by clients that cannot render fields.
    pub summary: String,
    /// Severity that selects the message color.
    pub severity: Severity,
    /// Labeled fields.
    pub fields: Vec<MessageField>,
}

impl Message {
    /// Formats an event and its verdict.
    ///
    /// The severity is the verdict's; only when the verdict left it unset is
    /// it guessed from the reason prefix.
    #[must_use]
    pub fn build(environment: &str, event: &Event, verdict: &Verdict) -> Self {
        Self {
            summary: event.message.clone(),
            severity: resolve_severity(event, verdict),
            fields: vec![
                MessageField::new("Env", environment, true),
                MessageField::new("Namespace", event.namespace.as_str(), true),
                MessageField::new("Message", event.message.as_str(), false),
                MessageField::new("Object", event.involved_object_kind.as_str(), true),
                MessageField::new("Name", event.name.as_str(), true),
                MessageField::new("Reason", event.reason.as_str(), true),
                MessageField::new("Component", event.source_component.as_str(), true),
            ],
        }
    }

    /// Returns the message color, if any.
    #[must_use]
    pub const fn color(&self) -> Option<&'static str> {
        self.severity.color()
    }

    /// Returns the value of the field with the given title.
    #[must_use]
    pub fn field(&self, title: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.title == title)
            .map(|f| f.value.as_str())
    }
}

/// Picks the presentational severity for an event.
///
/// An explicit verdict severity always wins over the reason-prefix fallback.
#[must_use]
pub fn resolve_severity(event: &Event, verdict: &Verdict) -> Severity {
    if verdict.severity.is_set() {
        verdict.severity
    } else {
        Severity::from_reason_prefix(&event.reason)
    }
}

/// Confirmation that a message reached the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel the message was posted to.
    pub channel: String,
    /// Service-assigned message timestamp.
    pub timestamp: String,
}

/// What a notifier did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The message was transmitted.
    Delivered(Delivery),
    /// The severity gate skipped transmission.
    Gated,
}

impl fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered(d) => write!(f, "delivered to {} at {}", d.channel, d.timestamp),
            Self::Gated => write!(f, "gated"),
        }
    }
}

/// Sends notifications for classified events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the name of this notifier.
    fn name(&self) -> &str;

    /// Notifies about an event.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotificationFailed` if delivery fails. Failures are
    /// not retried.
    async fn notify(&self, event: &Event, verdict: &Verdict) -> Result<NotifyOutcome>;
}

/// Delivers formatted messages to a chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync + fmt::Debug {
    /// Returns the name of this transport.
    fn name(&self) -> &str;

    /// Posts a message.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotificationFailed` if the service rejects or
    /// cannot receive the message.
    async fn post(&self, message: &Message) -> Result<Delivery>;
}

/// A notifier that formats messages and posts them through a transport.
#[derive(Debug)]
pub struct ChatNotifier<T> {
    config: NotifierConfig,
    transport: T,
}

impl<T: ChatTransport> ChatNotifier<T> {
    /// Creates a notifier.
    #[must_use]
    pub const fn new(config: NotifierConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Formats the message for an event, or `None` if the gate drops it.
    #[must_use]
    pub fn prepare(&self, event: &Event, verdict: &Verdict) -> Option<Message> {
        let message = Message::build(&self.config.environment, event, verdict);
        if self.config.threshold.admits(message.severity) {
            Some(message)
        } else {
            None
        }
    }
}

#[async_trait]
impl<T: ChatTransport> Notifier for ChatNotifier<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    async fn notify(&self, event: &Event, verdict: &Verdict) -> Result<NotifyOutcome> {
        let Some(message) = self.prepare(event, verdict) else {
            debug!(
                notifier = %self.name(),
                reason = %event.reason,
                severity = %verdict.severity,
                "below severity threshold, skipping"
            );
            return Ok(NotifyOutcome::Gated);
        };

        let delivery = self.transport.post(&message).await?;
        info!(
            channel = %delivery.channel,
            timestamp = %delivery.timestamp,
            "message successfully sent"
        );
        Ok(NotifyOutcome::Delivered(delivery))
    }
}

/// A transport that writes messages to the log instead of a chat service.
#[derive(Debug, Clone)]
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    /// Creates a log transport.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl ChatTransport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, message: &Message) -> Result<Delivery> {
        let fields: Vec<String> = message
            .fields
            .iter()
            .map(|f| format!("{}={}", f.title, f.value))
            .collect();

        match message.severity {
            Severity::Danger | Severity::Warning => warn!(
                severity = %message.severity,
                fields = ?fields,
                "EVENT {}",
                message.summary
            ),
            Severity::Good | Severity::Unset => info!(
                severity = %message.severity,
                fields = ?fields,
                "EVENT {}",
                message.summary
            ),
        }

        Ok(Delivery {
            channel: self.name.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeverityThreshold;
    use crate::error::WatchError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        posted: Mutex<Vec<Message>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn post(&self, message: &Message) -> Result<Delivery> {
            if self.fail {
                return Err(WatchError::NotificationFailed("channel_not_found".to_string()));
            }
            self.posted.lock().unwrap().push(message.clone());
            Ok(Delivery {
                channel: "C0123".to_string(),
                timestamp: "1700000000.000100".to_string(),
            })
        }
    }

    fn event() -> Event {
        Event::new("NodeNotReady")
            .with_message("Node node-1 status is now: NodeNotReady")
            .with_object_kind("Node")
            .with_source("node-controller")
            .with_metadata("default", "node-1.17b")
    }

    fn notifier(threshold: SeverityThreshold) -> ChatNotifier<RecordingTransport> {
        ChatNotifier::new(
            NotifierConfig::new("staging", threshold),
            RecordingTransport::default(),
        )
    }

    #[test]
    fn test_message_fields() {
        let msg = Message::build("staging", &event(), &Verdict::notify_with(Severity::Warning));

        assert_eq!(msg.summary, "Node node-1 status is now: NodeNotReady");
        assert_eq!(msg.color(), Some("warning"));
        assert_eq!(msg.field("Env"), Some("staging"));
        assert_eq!(msg.field("Namespace"), Some("default"));
        assert_eq!(msg.field("Object"), Some("Node"));
        assert_eq!(msg.field("Name"), Some("node-1.17b"));
        assert_eq!(msg.field("Reason"), Some("NodeNotReady"));
        assert_eq!(msg.field("Component"), Some("node-controller"));
        assert_eq!(msg.fields.len(), 7);

        let message_field = msg.fields.iter().find(|f| f.title == "Message").unwrap();
        assert!(!message_field.short);
    }

    #[test]
    fn test_explicit_severity_beats_prefix() {
        let failed = Event::new("FailedMount");
        let verdict = Verdict::notify_with(Severity::Good);
        assert_eq!(resolve_severity(&failed, &verdict), Severity::Good);
    }

    #[test]
    fn test_prefix_fallback_when_unset() {
        let verdict = Verdict::new(true, Severity::Unset);
        assert_eq!(
            resolve_severity(&Event::new("FailedMount"), &verdict),
            Severity::Danger
        );
        assert_eq!(
            resolve_severity(&Event::new("SuccessfulDelete"), &verdict),
            Severity::Good
        );
        assert_eq!(
            resolve_severity(&Event::new("Pulled"), &verdict),
            Severity::Unset
        );
    }

    #[tokio::test]
    async fn test_notify_delivers() {
        let notifier = notifier(SeverityThreshold::All);
        let outcome = notifier
            .notify(&event(), &Verdict::notify_with(Severity::Warning))
            .await
            .unwrap();

        assert!(matches!(outcome, NotifyOutcome::Delivered(ref d) if d.channel == "C0123"));
        assert_eq!(notifier.transport().posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_only_gates_good() {
        let notifier = notifier(SeverityThreshold::ErrorOnly);
        let outcome = notifier
            .notify(&event(), &Verdict::notify_with(Severity::Good))
            .await
            .unwrap();

        assert_eq!(outcome, NotifyOutcome::Gated);
        assert!(notifier.transport().posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_only_gates_prefix_good() {
        let notifier = notifier(SeverityThreshold::ErrorOnly);
        let outcome = notifier
            .notify(
                &Event::new("SuccessfulCreate"),
                &Verdict::new(true, Severity::Unset),
            )
            .await
            .unwrap();
        assert_eq!(outcome, NotifyOutcome::Gated);
    }

    #[tokio::test]
    async fn test_error_only_passes_danger() {
        let notifier = notifier(SeverityThreshold::ErrorOnly);
        let outcome = notifier
            .notify(&event(), &Verdict::notify_with(Severity::Danger))
            .await
            .unwrap();
        assert!(matches!(outcome, NotifyOutcome::Delivered(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let notifier = ChatNotifier::new(
            NotifierConfig::default(),
            RecordingTransport {
                fail: true,
                ..RecordingTransport::default()
            },
        );
        let err = notifier
            .notify(&event(), &Verdict::notify_with(Severity::Warning))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::NotificationFailed(_)));
    }

    #[tokio::test]
    async fn test_log_transport_always_delivers() {
        let notifier = ChatNotifier::new(NotifierConfig::default(), LogTransport::default());
        assert_eq!(notifier.name(), "log");
        let outcome = notifier
            .notify(&event(), &Verdict::notify_with(Severity::Danger))
            .await
            .unwrap();
        assert!(matches!(outcome, NotifyOutcome::Delivered(ref d) if d.channel == "log"));
    }

    #[test]
    fn test_outcome_display() {
        let delivered = NotifyOutcome::Delivered(Delivery {
            channel: "C0123".to_string(),
            timestamp: "1.2".to_string(),
        });
        assert_eq!(delivered.to_string(), "delivered to C0123 at 1.2");
        assert_eq!(NotifyOutcome::Gated.to_string(), "gated");
    }
}
