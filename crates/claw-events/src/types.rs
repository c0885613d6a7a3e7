//! Core types for event classification.
//!
//! This module provides the fundamental types used throughout the claw-events crate:
//! - [`Event`]: A cluster lifecycle event as delivered by a watch
//! - [`ChangeKind`]: How the watch observed the event
//! - [`Severity`]: The presentational severity of a notification
//! - [`Verdict`]: The classifier's decision for one event

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// How a watch subscription observed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The event object was newly created.
    Added,
    /// The event object was updated, usually a recurrence.
    Modified,
    /// The event object was removed.
    Deleted,
}

impl ChangeKind {
    /// Returns the change kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = EventError;

    /// Parses a change kind, accepting both the lowercase form and the
    /// uppercase form used on the Kubernetes watch wire (`ADDED`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            _ => Err(EventError::InvalidChangeKind {
                value: s.to_string(),
            }),
        }
    }
}

/// The presentational severity of a notification.
///
/// Severity only selects the color of the chat message; it carries no
/// ordering semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine, positive outcome.
    Good,
    /// Something should be looked at.
    Warning,
    /// Something is broken.
    Danger,
    /// No rule assigned a severity.
    #[default]
    Unset,
}

impl Severity {
    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Unset => "unset",
        }
    }

    /// Returns the chat attachment color for this severity, if any.
    #[must_use]
    pub const fn color(&self) -> Option<&'static str> {
        match self {
            Self::Good => Some("good"),
            Self::Warning => Some("warning"),
            Self::Danger => Some("danger"),
            Self::Unset => None,
        }
    }

    /// Returns true if a severity was assigned.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Guesses a severity from the prefix of an event reason.
    ///
    /// `Success…` maps to [`Severity::Good`] and `Fail…` to [`Severity::Danger`];
    /// anything else is [`Severity::Unset`]. This is a loose fallback and is
    /// never consulted by the classifier's rule table.
    #[must_use]
    pub fn from_reason_prefix(reason: &str) -> Self {
        if reason.starts_with("Success") {
            Self::Good
        } else if reason.starts_with("Fail") {
            Self::Danger
        } else {
            Self::Unset
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The classifier's decision for a single event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether a notification should be sent.
    pub notify: bool,
    /// The severity to present the notification with.
    pub severity: Severity,
}

impl Verdict {
    /// Creates a verdict from its parts.
    #[must_use]
    pub const fn new(notify: bool, severity: Severity) -> Self {
        Self { notify, severity }
    }

    /// A verdict that notifies with the given severity.
    #[must_use]
    pub const fn notify_with(severity: Severity) -> Self {
        Self::new(true, severity)
    }

    /// A verdict that neither notifies nor assigns a severity.
    #[must_use]
    pub const fn quiet() -> Self {
        Self::new(false, Severity::Unset)
    }

    /// Returns this verdict with notification turned off, keeping the severity.
    #[must_use]
    pub const fn suppressed(self) -> Self {
        Self::new(false, self.severity)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.notify {
            write!(f, "notify ({})", self.severity)
        } else {
            write!(f, "drop ({})", self.severity)
        }
    }
}

/// A cluster lifecycle event.
///
/// Events are built by an event source for every observed change, consumed
/// once by the dispatch loop and then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Short machine-readable cause, e.g. `BackOff`.
    pub reason: String,
    /// Free-text human description.
    pub message: String,
    /// Resource kind of the object the event concerns.
    pub involved_object_kind: String,
    /// The cluster component that emitted the event.
    pub source_component: String,
    /// How many times this logical event has recurred.
    pub count: u32,
    /// Namespace of the event object.
    pub namespace: String,
    /// Name of the event object.
    pub name: String,
    /// When the event was first observed.
    pub first_timestamp: Option<DateTime<Utc>>,
    /// When the event was most recently observed.
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Creates an event with the given reason and a count of 1.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            count: 1,
            ..Self::default()
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the involved object kind.
    #[must_use]
    pub fn with_object_kind(mut self, kind: impl Into<String>) -> Self {
        self.involved_object_kind = kind.into();
        self
    }

    /// Sets the source component.
    #[must_use]
    pub fn with_source(mut self, component: impl Into<String>) -> Self {
        self.source_component = component.into();
        self
    }

    /// Sets the recurrence count.
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Sets the namespace and name of the event object.
    #[must_use]
    pub fn with_metadata(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self.name = name.into();
        self
    }

    /// Sets the recurrence window.
    #[must_use]
    pub const fn with_timestamps(
        mut self,
        first: Option<DateTime<Utc>>,
        last: Option<DateTime<Utc>>,
    ) -> Self {
        self.first_timestamp = first;
        self.last_timestamp = last;
        self
    }

    /// Returns true if this event has been seen more than once.
    #[must_use]
    pub const fn is_repeat(&self) -> bool {
        self.count > 1
    }
}
