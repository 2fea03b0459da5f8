//! Bounded multi-producer, single-consumer event channel.
//!
//! Each pipeline runner owns a cloned [`EventSender`]; the scheduler owns the
//! only [`EventReceiver`]. A full channel suspends the producer, which is the
//! run's only backpressure mechanism.

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::domain::Event;

/// Default number of buffered events before producers suspend
pub const DEFAULT_CAPACITY: usize = 64;

/// Create a connected sender/receiver pair
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer handle
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Push an event, waiting for capacity.
    ///
    /// Returns false when the receiver is gone; the event is discarded.
    pub async fn emit(&self, event: Event) -> bool {
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(rejected) => {
                debug!(kind = rejected.0.kind(), "Event receiver closed, dropping event");
                false
            }
        }
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event; None once every sender is dropped and the
    /// buffer is empty
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take one buffered event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take every event that is buffered right now, in arrival order
    pub fn drain_buffered(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Some(event) = self.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Convert into a `Stream` of events
    pub fn into_stream(self) -> ReceiverStream<Event> {
        ReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PipelineId;

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = event_channel(8);
        for i in 0..3 {
            assert!(tx.emit(Event::status(format!("step {}", i))).await);
        }

        let drained = rx.drain_buffered();
        assert_eq!(
            drained,
            vec![
                Event::status("step 0"),
                Event::status("step 1"),
                Event::status("step 2"),
            ]
        );
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_dropped() {
        let (tx, mut rx) = event_channel(4);
        let producer = tx.clone();
        drop(tx);

        producer
            .emit(Event::log(PipelineId::new("a"), "last"))
            .await;
        drop(producer);

        assert_eq!(rx.recv().await, Some(Event::log(PipelineId::new("a"), "last")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (tx, rx) = event_channel(1);
        drop(rx);

        assert!(tx.is_closed());
        assert!(!tx.emit(Event::status("nobody listening")).await);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (tx, mut rx) = event_channel(0);
        assert!(tx.emit(Event::Done).await);
        assert_eq!(rx.try_recv(), Some(Event::Done));
    }
}
