//! The dispatch loop.
//!
//! [`Dispatcher`] pulls one event at a time from an [`EventSource`], runs it
//! through the [`Classifier`] and, for events that should notify, waits for
//! the [`Notifier`] before pulling the next one. Notification failures are
//! logged and counted; the end of the source is returned to the caller as
//! the error that stopped the loop.

use std::time::Duration;

use claw_events::{ChangeKind, Classifier, Event};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_NOTIFY_TIMEOUT_SECS;
use crate::error::{Result, WatchError};
use crate::notifier::{Notifier, NotifyOutcome};
use crate::source::{EventSource, Received};

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The classifier decided not to notify.
    Dropped,
    /// The notification was delivered.
    Delivered,
    /// The notifier skipped it below the severity threshold.
    Gated,
    /// Delivery failed or timed out.
    Failed,
}

/// Counters over the lifetime of a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events received from the source.
    pub received: u64,
    /// Events the classifier dropped.
    pub dropped: u64,
    /// Notifications delivered.
    pub delivered: u64,
    /// Notifications skipped by the severity gate.
    pub gated: u64,
    /// Notifications that failed.
    pub failed: u64,
}

impl DispatchStats {
    fn record(&mut self, step: Step) {
        self.received += 1;
        match step {
            Step::Dropped => self.dropped += 1,
            Step::Delivered => self.delivered += 1,
            Step::Gated => self.gated += 1,
            Step::Failed => self.failed += 1,
        }
    }
}

/// Sequential event dispatcher.
#[derive(Debug)]
pub struct Dispatcher<S, N> {
    source: S,
    classifier: Classifier,
    notifier: N,
    notify_timeout: Duration,
    stats: DispatchStats,
}

impl<S: EventSource, N: Notifier> Dispatcher<S, N> {
    /// Creates a dispatcher with the default notification timeout.
    #[must_use]
    pub const fn new(source: S, classifier: Classifier, notifier: N) -> Self {
        Self {
            source,
            classifier,
            notifier,
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
            stats: DispatchStats {
                received: 0,
                dropped: 0,
                delivered: 0,
                gated: 0,
                failed: 0,
            },
        }
    }

    /// Sets the upper bound on a single notification attempt.
    #[must_use]
    pub const fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Returns the counters so far.
    #[must_use]
    pub const fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Returns the notifier.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Runs until the source closes or fails and returns why it stopped.
    pub async fn run(mut self) -> WatchError {
        info!(
            notifier = %self.notifier.name(),
            timeout = ?self.notify_timeout,
            "dispatching events"
        );

        loop {
            if let Err(e) = self.step().await {
                error!(
                    error = %e,
                    received = self.stats.received,
                    delivered = self.stats.delivered,
                    dropped = self.stats.dropped,
                    gated = self.stats.gated,
                    failed = self.stats.failed,
                    "event stream ended"
                );
                return e;
            }
        }
    }

    /// Waits for the next event and processes it.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::StreamClosed` when the source closes, or the
    /// source's own error if it fails.
    pub async fn step(&mut self) -> Result<Step> {
        match self.source.recv().await? {
            Received::Event(kind, event) => Ok(self.process(kind, &event).await),
            Received::Closed => Err(WatchError::StreamClosed),
        }
    }

    /// Classifies one event and notifies if required.
    pub async fn process(&mut self, kind: ChangeKind, event: &Event) -> Step {
        debug!(
            kind = %kind,
            reason = %event.reason,
            message = %event.message,
            count = event.count,
            first_timestamp = ?event.first_timestamp,
            last_timestamp = ?event.last_timestamp,
            "received event"
        );

        let classification = self.classifier.explain(event, kind);
        let verdict = classification.verdict;

        let step = if verdict.notify {
            let attempt =
                tokio::time::timeout(self.notify_timeout, self.notifier.notify(event, &verdict))
                    .await
                    .unwrap_or(Err(WatchError::NotificationTimeout(self.notify_timeout)));

            match attempt {
                Ok(NotifyOutcome::Delivered(_)) => Step::Delivered,
                Ok(NotifyOutcome::Gated) => Step::Gated,
                Err(e) => {
                    warn!(
                        error = %e,
                        reason = %event.reason,
                        namespace = %event.namespace,
                        name = %event.name,
                        "failed to send notification"
                    );
                    Step::Failed
                }
            }
        } else {
            debug!(
                reason = %event.reason,
                rule = %classification.rule,
                "event dropped"
            );
            Step::Dropped
        };

        self.stats.record(step);
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Delivery;
    use crate::source::ChannelEventSource;
    use async_trait::async_trait;
    use claw_events::{Severity, Verdict};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeNotifier {
        seen: Mutex<Vec<(String, Verdict)>>,
        fail_reasons: Vec<&'static str>,
        stall: bool,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn name(&self) -> &str {
            "fake"
        }

        async fn notify(&self, event: &Event, verdict: &Verdict) -> Result<NotifyOutcome> {
            self.seen
                .lock()
                .unwrap()
                .push((event.reason.clone(), *verdict));
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_reasons.iter().any(|r| *r == event.reason) {
                return Err(WatchError::NotificationFailed("boom".to_string()));
            }
            Ok(NotifyOutcome::Delivered(Delivery {
                channel: "C0123".to_string(),
                timestamp: "1.0".to_string(),
            }))
        }
    }

    fn quiet_source(reason: &str) -> Event {
        Event::new(reason).with_source("my-operator")
    }

    #[tokio::test]
    async fn test_process_delivers_notify_verdicts() {
        let (_tx, source) = ChannelEventSource::channel(1);
        let mut dispatcher =
            Dispatcher::new(source, Classifier::default(), FakeNotifier::default());

        let step = dispatcher
            .process(ChangeKind::Modified, &quiet_source("NodeOutOfDisk"))
            .await;

        assert_eq!(step, Step::Delivered);
        let seen = dispatcher.notifier().seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(
                "NodeOutOfDisk".to_string(),
                Verdict::notify_with(Severity::Danger)
            )]
        );
    }

    #[tokio::test]
    async fn test_process_drops_without_notifying() {
        let (_tx, source) = ChannelEventSource::channel(1);
        let mut dispatcher =
            Dispatcher::new(source, Classifier::default(), FakeNotifier::default());

        let step = dispatcher
            .process(ChangeKind::Modified, &quiet_source("Pulled"))
            .await;

        assert_eq!(step, Step::Dropped);
        assert!(dispatcher.notifier().seen.lock().unwrap().is_empty());
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_next_event() {
        let (tx, source) = ChannelEventSource::channel(4);
        let notifier = FakeNotifier {
            fail_reasons: vec!["NodeNotReady"],
            ..FakeNotifier::default()
        };
        let mut dispatcher = Dispatcher::new(source, Classifier::default(), notifier);

        tx.send((ChangeKind::Modified, quiet_source("NodeNotReady")))
            .await
            .unwrap();
        tx.send((ChangeKind::Modified, quiet_source("NodeReady")))
            .await
            .unwrap();

        assert_eq!(dispatcher.step().await.unwrap(), Step::Failed);
        assert_eq!(dispatcher.step().await.unwrap(), Step::Delivered);
        assert_eq!(dispatcher.notifier().seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stalled_notifier_times_out() {
        let (_tx, source) = ChannelEventSource::channel(1);
        let notifier = FakeNotifier {
            stall: true,
            ..FakeNotifier::default()
        };
        let mut dispatcher = Dispatcher::new(source, Classifier::default(), notifier)
            .with_notify_timeout(Duration::from_millis(50));

        let step = dispatcher
            .process(ChangeKind::Added, &quiet_source("Scheduled"))
            .await;

        assert_eq!(step, Step::Failed);
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_closed_source_is_terminal() {
        let (tx, source) = ChannelEventSource::channel(1);
        drop(tx);
        let mut dispatcher =
            Dispatcher::new(source, Classifier::default(), FakeNotifier::default());

        assert!(matches!(
            dispatcher.step().await,
            Err(WatchError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn test_run_returns_stream_closed() {
        let (tx, source) = ChannelEventSource::channel(4);
        tx.send((ChangeKind::Added, quiet_source("Scheduled")))
            .await
            .unwrap();
        drop(tx);

        let dispatcher =
            Dispatcher::new(source, Classifier::default(), FakeNotifier::default());
        let err = dispatcher.run().await;

        assert!(matches!(err, WatchError::StreamClosed));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = DispatchStats::default();
        stats.record(Step::Delivered);
        stats.record(Step::Dropped);
        stats.record(Step::Dropped);
        stats.record(Step::Failed);
        stats.record(Step::Gated);

        assert_eq!(stats.received, 5);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.gated, 1);
    }
}
