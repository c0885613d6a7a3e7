//! Event sources.
//!
//! An [`EventSource`] is a single subscription handle. [`EventSource::recv`]
//! suspends until the next event arrives and reports the end of the
//! subscription as [`Received::Closed`], never as an empty event.

use async_trait::async_trait;
use claw_events::{ChangeKind, Event};
use tokio::sync::mpsc;

use crate::error::Result;

/// One item received from an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// An observed event and how it changed.
    Event(ChangeKind, Event),
    /// The subscription ended.
    Closed,
}

/// A live subscription to cluster events.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fails. Callers treat this, like
    /// [`Received::Closed`], as the end of the stream.
    async fn recv(&mut self) -> Result<Received>;
}

/// An event source fed through an in-process channel.
///
/// Useful for embedding the dispatcher behind another watch implementation.
#[derive(Debug)]
pub struct ChannelEventSource {
    rx: mpsc::Receiver<(ChangeKind, Event)>,
}

impl ChannelEventSource {
    /// Creates a bounded channel and the source reading from it.
    ///
    /// The source reports [`Received::Closed`] once every sender is dropped
    /// and the buffer is drained.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<(ChangeKind, Event)>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn recv(&mut self) -> Result<Received> {
        Ok(match self.rx.recv().await {
            Some((kind, event)) => Received::Event(kind, event),
            None => Received::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_yields_in_order() {
        let (tx, mut source) = ChannelEventSource::channel(4);
        tx.send((ChangeKind::Added, Event::new("Scheduled"))).await.unwrap();
        tx.send((ChangeKind::Modified, Event::new("BackOff"))).await.unwrap();

        assert_eq!(
            source.recv().await.unwrap(),
            Received::Event(ChangeKind::Added, Event::new("Scheduled"))
        );
        assert_eq!(
            source.recv().await.unwrap(),
            Received::Event(ChangeKind::Modified, Event::new("BackOff"))
        );
    }

    #[tokio::test]
    async fn test_channel_source_closes_after_drain() {
        let (tx, mut source) = ChannelEventSource::channel(4);
        tx.send((ChangeKind::Deleted, Event::new("Killing"))).await.unwrap();
        drop(tx);

        assert!(matches!(source.recv().await.unwrap(), Received::Event(..)));
        assert_eq!(source.recv().await.unwrap(), Received::Closed);
        assert_eq!(source.recv().await.unwrap(), Received::Closed);
    }
}
