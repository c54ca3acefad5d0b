//! Notification bridge between background workers and the presentation layer.
//!
//! Publishing never blocks: the queue is unbounded and its depth is tracked
//! so that a consumer falling behind shows up in the log instead of stalling
//! a session worker. The consumer side suspends (`recv`) or parks its thread
//! (`blocking_recv`) until an event or the close arrives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::BridgeEvent;

/// Default queue depth above which a back-pressure warning is logged.
pub const DEFAULT_HIGH_WATER: usize = 256;

/// Returned by [`Publisher::publish`] once the bridge is closed.
///
/// Carries the rejected event back to the caller.
#[derive(Debug, Error)]
#[error("notification bridge is closed")]
pub struct BridgeClosed(pub BridgeEvent);

enum Envelope {
    Event(BridgeEvent),
    Close,
}

struct Shared {
    /// Publish/close gate. Publishers hold it shared, `close` exclusively.
    closed: RwLock<bool>,
    depth: AtomicUsize,
    high_water: usize,
    /// Latched while the depth is above the high-water mark.
    over_high_water: AtomicBool,
}

impl Shared {
    fn on_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if depth > self.high_water && !self.over_high_water.swap(true, Ordering::AcqRel) {
            warn!(depth, high_water = self.high_water, "notification consumer is falling behind");
        }
    }

    fn on_dequeue(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if depth <= self.high_water / 2 && self.over_high_water.swap(false, Ordering::AcqRel) {
            debug!(depth, "notification backlog drained");
        }
    }
}

/// Creates a connected publisher/subscriber pair.
pub fn channel(high_water: usize) -> (Publisher, Subscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        closed: RwLock::new(false),
        depth: AtomicUsize::new(0),
        high_water: high_water.max(1),
        over_high_water: AtomicBool::new(false),
    });

    (
        Publisher {
            tx,
            shared: shared.clone(),
        },
        Subscriber {
            rx,
            shared,
            finished: false,
        },
    )
}

/// Producer side. Cheap to clone; every session worker holds one.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Envelope>,
    shared: Arc<Shared>,
}

impl Publisher {
    /// Queues an event for the consumer without waiting.
    pub fn publish(&self, event: impl Into<BridgeEvent>) -> Result<(), BridgeClosed> {
        let event = event.into();
        let closed = self.shared.closed.read();
        if *closed {
            return Err(BridgeClosed(event));
        }

        self.shared.on_enqueue();
        self.tx.send(Envelope::Event(event)).map_err(|rejected| {
            self.shared.depth.fetch_sub(1, Ordering::AcqRel);
            match rejected.0 {
                Envelope::Event(event) => BridgeClosed(event),
                Envelope::Close => unreachable!("publish only sends events"),
            }
        })
    }

    /// Rejects further publishes. Events already queued are still delivered.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let mut closed = self.shared.closed.write();
        if *closed {
            return;
        }
        *closed = true;
        // The consumer may already be gone; nothing left to deliver then
        let _ = self.tx.send(Envelope::Close);
        debug!("notification bridge closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.read() || self.tx.is_closed()
    }

    /// Events queued and not yet received.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }
}

/// Consumer side. There is exactly one.
pub struct Subscriber {
    rx: mpsc::UnboundedReceiver<Envelope>,
    shared: Arc<Shared>,
    finished: bool,
}

impl Subscriber {
    /// Waits for the next event.
    ///
    /// Returns `None` after the bridge was closed and every earlier event was
    /// received, or when all publishers are gone.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        if self.finished {
            return None;
        }
        let envelope = self.rx.recv().await;
        self.open(envelope)
    }

    /// Like [`recv`](Self::recv), for a thread outside the async runtime.
    ///
    /// # Panics
    /// When called from within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<BridgeEvent> {
        if self.finished {
            return None;
        }
        let envelope = self.rx.blocking_recv();
        self.open(envelope)
    }

    /// Events queued and not yet received.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    fn open(&mut self, envelope: Option<Envelope>) -> Option<BridgeEvent> {
        match envelope {
            Some(Envelope::Event(event)) => {
                self.shared.on_dequeue();
                Some(event)
            }
            Some(Envelope::Close) | None => {
                self.finished = true;
                self.rx.close();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingEvent, RowId, SessionEvent, SessionOutcome};
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready_eq};

    fn started(id: RowId) -> BridgeEvent {
        SessionEvent::new(id, SessionOutcome::Started).into()
    }

    fn stopped(id: RowId) -> BridgeEvent {
        SessionEvent::new(id, SessionOutcome::StoppedByUser).into()
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let (publisher, mut subscriber) = channel(DEFAULT_HIGH_WATER);
        let id = RowId::new();

        assert_ok!(publisher.publish(started(id)));
        assert_ok!(publisher.publish(stopped(id)));
        assert_ok!(publisher.publish(ListingEvent::Namespaces(Ok(vec!["default".into()]))));

        assert_eq!(subscriber.recv().await, Some(started(id)));
        assert_eq!(subscriber.recv().await, Some(stopped(id)));
        assert!(matches!(
            subscriber.recv().await,
            Some(BridgeEvent::Listing(ListingEvent::Namespaces(Ok(_))))
        ));
        assert_eq!(subscriber.depth(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (publisher, mut subscriber) = channel(DEFAULT_HIGH_WATER);
        let id = RowId::new();

        assert_ok!(publisher.publish(started(id)));
        publisher.close();
        publisher.close();

        let rejected = assert_err!(publisher.publish(stopped(id)));
        assert_eq!(rejected.0, stopped(id));
        assert!(publisher.is_closed());

        assert_eq!(subscriber.recv().await, Some(started(id)));
        assert_eq!(subscriber.recv().await, None);
        assert_eq!(subscriber.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_suspends_until_publish() {
        let (publisher, mut subscriber) = channel(DEFAULT_HIGH_WATER);
        let id = RowId::new();

        let mut recv = tokio_test::task::spawn(subscriber.recv());
        assert_pending!(recv.poll());

        assert_ok!(publisher.publish(started(id)));
        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Some(started(id)));
    }

    #[test]
    fn test_blocking_recv_from_plain_thread() {
        let (publisher, mut subscriber) = channel(DEFAULT_HIGH_WATER);
        let id = RowId::new();

        let consumer = std::thread::spawn(move || {
            let mut received = Vec::new();
            while let Some(event) = subscriber.blocking_recv() {
                received.push(event);
            }
            received
        });

        publisher.publish(started(id)).unwrap();
        publisher.publish(stopped(id)).unwrap();
        publisher.close();

        assert_eq!(consumer.join().unwrap(), vec![started(id), stopped(id)]);
    }

    #[tokio::test]
    async fn test_ends_when_publishers_dropped() {
        let (publisher, mut subscriber) = channel(DEFAULT_HIGH_WATER);
        let clone = publisher.clone();
        drop(publisher);
        drop(clone);

        assert_eq!(subscriber.recv().await, None);
    }

    #[tokio::test]
    async fn test_publish_fails_without_subscriber() {
        let (publisher, subscriber) = channel(DEFAULT_HIGH_WATER);
        drop(subscriber);

        assert_err!(publisher.publish(started(RowId::new())));
        assert_eq!(publisher.depth(), 0);
    }

    #[tokio::test]
    async fn test_high_water_latch() {
        let (publisher, mut subscriber) = channel(2);
        let id = RowId::new();

        for _ in 0..3 {
            publisher.publish(started(id)).unwrap();
        }
        assert_eq!(publisher.depth(), 3);
        assert!(publisher.shared.over_high_water.load(Ordering::Acquire));

        for _ in 0..3 {
            subscriber.recv().await.unwrap();
        }
        assert_eq!(publisher.depth(), 0);
        assert!(!publisher.shared.over_high_water.load(Ordering::Acquire));
    }
}
