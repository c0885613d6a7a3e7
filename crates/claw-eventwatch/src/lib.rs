//! Cluster event watcher for Clawbernetes.
//!
//! `claw-eventwatch` subscribes to every event in a Kubernetes cluster,
//! classifies each one with [`claw_events::Classifier`] and posts the
//! actionable ones to a Slack channel.
//!
//! # Pipeline
//!
//! - **Source**: [`KubeEventSource`] watches `/api/v1/events` across all namespaces
//! - **Classify**: the classifier turns `(ChangeKind, Event)` into a verdict
//! - **Notify**: [`ChatNotifier`] formats the message, applies the severity
//!   gate and posts it through a [`ChatTransport`] such as [`SlackTransport`]
//! - **Dispatch**: [`Dispatcher`] runs the three in sequence, one event at a time
//!
//! The watch is never reopened. When it ends, [`Dispatcher::run`] returns the
//! reason and the process is expected to exit so a supervisor can restart it.
//!
//! # Example
//!
//! ```rust
//! use claw_eventwatch::{
//!     ChannelEventSource, ChatNotifier, Dispatcher, LogTransport, NotifierConfig,
//!     SeverityThreshold, Step,
//! };
//! use claw_events::{ChangeKind, Classifier, Event};
//!
//! # async fn demo() -> claw_eventwatch::Result<()> {
//! let (tx, source) = ChannelEventSource::channel(16);
//! let notifier = ChatNotifier::new(
//!     NotifierConfig::new("staging", SeverityThreshold::All),
//!     LogTransport::default(),
//! );
//! let mut dispatcher = Dispatcher::new(source, Classifier::default(), notifier);
//!
//! let event = Event::new("NodeNotReady").with_source("node-controller");
//! tx.send((ChangeKind::Modified, event)).await.ok();
//! assert_eq!(dispatcher.step().await?, Step::Delivered);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod kube;
pub mod notifier;
pub mod slack;
pub mod source;

// Re-export main types at crate root
pub use config::{
    ConfigArgs, KubeSettings, NotifierConfig, SeverityThreshold, SlackConfig, WatcherConfig,
};
pub use dispatch::{DispatchStats, Dispatcher, Step};
pub use error::{Result, WatchError};
pub use kube::{KubeConfig, KubeEventSource};
pub use notifier::{
    ChatNotifier, ChatTransport, Delivery, LogTransport, Message, MessageField, Notifier,
    NotifyOutcome,
};
pub use slack::SlackTransport;
pub use source::{ChannelEventSource, EventSource, Received};
