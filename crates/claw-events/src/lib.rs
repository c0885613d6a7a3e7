//! Cluster event classification for Clawbernetes.
//!
//! `claw-events` decides which cluster lifecycle events are worth a human's
//! attention. A watch delivers every event in the cluster; the [`Classifier`]
//! turns each one into a [`Verdict`] saying whether to notify and how loudly.
//!
//! # Rules
//!
//! - **Change kind**: newly added events notify as good, deleted events as warning
//! - **Reasons**: node state flips and successful creates notify on modification
//! - **Noisy sources**: kubelet, controller manager and scheduler are suppressed
//! - **Repeats**: an event recurring (`count > 1`) is suppressed
//! - **Backoff escalation**: the third `BackOff` always notifies as danger
//!
//! # Example
//!
//! ```rust
//! use claw_events::{ChangeKind, Classifier, Event, Severity};
//!
//! let classifier = Classifier::default();
//!
//! let event = Event::new("BackOff")
//!     .with_message("Back-off restarting failed container")
//!     .with_source("kubelet")
//!     .with_count(3);
//!
//! let verdict = classifier.classify(&event, ChangeKind::Modified);
//! assert!(verdict.notify);
//! assert_eq!(verdict.severity, Severity::Danger);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod classifier;
pub mod error;
pub mod types;

// Re-export main types at crate root
pub use classifier::{
    BACKOFF_REASON, Classification, Classifier, ClassifierConfig,
    DEFAULT_BACKOFF_ESCALATION_COUNT, DEFAULT_NOISY_COMPONENTS, Rule, parse_component_list,
};
pub use error::{EventError, Result};
pub use types::{ChangeKind, Event, Severity, Verdict};
