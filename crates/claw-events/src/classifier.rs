//! Event classification.
//!
//! The [`Classifier`] decides, for each observed event, whether operators
//! should be notified and with what [`Severity`]. Rules are evaluated in a
//! fixed order:
//!
//! 1. The change kind sets a baseline: added events notify as good, deleted
//!    events notify as warning, modified events fall through.
//! 2. Modified events are matched by exact reason against a small table.
//! 3. Events from noisy components are suppressed.
//! 4. Repeated events (`count > 1`) are suppressed.
//! 5. A `BackOff` event at exactly the escalation count always notifies as
//!    danger, overriding 3 and 4.
//!
//! Classification is pure: the same event and change kind always produce the
//! same verdict for a given configuration.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EventError, Result};
use crate::types::{ChangeKind, Event, Severity, Verdict};

/// Reason that is escalated when it recurs exactly the escalation count.
pub const BACKOFF_REASON: &str = "BackOff";

/// Default recurrence count at which a backoff is escalated.
pub const DEFAULT_BACKOFF_ESCALATION_COUNT: u32 = 3;

/// Components suppressed by default.
///
/// Both spellings of the controller manager are listed since older clusters
/// report it as `controllermanager`.
pub const DEFAULT_NOISY_COMPONENTS: &[&str] = &[
    "kubelet",
    "controller-manager",
    "controllermanager",
    "default-scheduler",
];

/// Exact-match reason rules for modified events.
const REASON_RULES: &[(&str, Severity)] = &[
    ("SuccessfulCreate", Severity::Good),
    ("NodeReady", Severity::Good),
    ("NodeNotReady", Severity::Warning),
    ("NodeOutOfDisk", Severity::Danger),
];

/// Configuration for the [`Classifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Source components whose events never notify (unless escalated).
    pub noisy_components: BTreeSet<String>,
    /// `BackOff` recurrence count that forces a danger notification.
    pub backoff_escalation_count: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            noisy_components: DEFAULT_NOISY_COMPONENTS
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            backoff_escalation_count: DEFAULT_BACKOFF_ESCALATION_COUNT,
        }
    }
}

impl ClassifierConfig {
    /// Replaces the noisy component set.
    #[must_use]
    pub fn with_noisy_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.noisy_components = components.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the backoff escalation count.
    #[must_use]
    pub const fn with_backoff_escalation_count(mut self, count: u32) -> Self {
        self.backoff_escalation_count = count;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `EventError::InvalidConfig` if the escalation count is zero or a
    /// noisy component name is blank.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_escalation_count == 0 {
            return Err(EventError::InvalidConfig {
                reason: "backoff escalation count must be greater than 0".to_string(),
            });
        }

        if self.noisy_components.iter().any(|c| c.trim().is_empty()) {
            return Err(EventError::InvalidConfig {
                reason: "noisy component names cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Parses a comma separated component list, ignoring blanks and whitespace.
#[must_use]
pub fn parse_component_list(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// The rule that settled a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Added or deleted change kind.
    ChangeKind,
    /// Exact reason match.
    Reason,
    /// Nothing matched.
    NoMatch,
    /// Suppressed because the source component is noisy.
    NoisySource,
    /// Suppressed because the event is a repeat.
    Repeat,
    /// Forced by backoff escalation.
    BackoffEscalation,
}

impl Rule {
    /// Returns the rule as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeKind => "change_kind",
            Self::Reason => "reason",
            Self::NoMatch => "no_match",
            Self::NoisySource => "noisy_source",
            Self::Repeat => "repeat",
            Self::BackoffEscalation => "backoff_escalation",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verdict together with the rule that settled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// The final verdict.
    pub verdict: Verdict,
    /// The last rule that changed the verdict.
    pub rule: Rule,
}

/// Decides whether an event should be notified.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    /// Creates a classifier with the given configuration.
    #[must_use]
    pub const fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies an event observed with the given change kind.
    #[must_use]
    pub fn classify(&self, event: &Event, kind: ChangeKind) -> Verdict {
        self.explain(event, kind).verdict
    }

    /// Classifies an event and reports which rule settled the verdict.
    #[must_use]
    pub fn explain(&self, event: &Event, kind: ChangeKind) -> Classification {
        let (mut verdict, mut rule) = match kind {
            ChangeKind::Added => (Verdict::notify_with(Severity::Good), Rule::ChangeKind),
            ChangeKind::Deleted => (Verdict::notify_with(Severity::Warning), Rule::ChangeKind),
            ChangeKind::Modified => match reason_severity(&event.reason) {
                Some(severity) => (Verdict::notify_with(severity), Rule::Reason),
                None => (Verdict::quiet(), Rule::NoMatch),
            },
        };

        if verdict.notify && self.is_noisy(&event.source_component) {
            verdict = verdict.suppressed();
            rule = Rule::NoisySource;
        }

        if verdict.notify && event.is_repeat() {
            verdict = verdict.suppressed();
            rule = Rule::Repeat;
        }

        if self.is_backoff_escalation(event) {
            verdict = Verdict::notify_with(Severity::Danger);
            rule = Rule::BackoffEscalation;
        }

        Classification { verdict, rule }
    }

    /// Returns true if events from this component are suppressed.
    #[must_use]
    pub fn is_noisy(&self, component: &str) -> bool {
        self.config.noisy_components.contains(component)
    }

    /// Returns true if the event is a backoff at exactly the escalation count.
    #[must_use]
    pub fn is_backoff_escalation(&self, event: &Event) -> bool {
        event.reason == BACKOFF_REASON && event.count == self.config.backoff_escalation_count
    }
}

fn reason_severity(reason: &str) -> Option<Severity> {
    REASON_RULES
        .iter()
        .find(|(r, _)| *r == reason)
        .map(|(_, severity)| *severity)
}
