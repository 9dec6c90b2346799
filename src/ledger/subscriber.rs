//! Change notification
//!
//! Two paths, both fed in registration order after every successful append:
//! - [`LedgerObserver`]: in-line callbacks for derived state (thread deriver)
//! - [`Subscription`]: bounded tokio queue per consumer; a full queue drops the
//!   notification for that consumer instead of stalling the writer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use super::event::Event;
use crate::observability::{LogEvent, MetricsRegistry};

/// In-line observer of ledger changes.
///
/// Called under the ledger's writer lock; implementations must not write to
/// the ledger they observe.
pub trait LedgerObserver: Send + Sync {
    /// A new event is live
    fn on_append(&self, event: &Arc<Event>);

    /// The ledger was cleared
    fn on_clear(&self) {}
}

#[derive(Debug)]
struct Slot {
    id: u64,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Registered subscriber queues
#[derive(Debug)]
pub struct SubscriberRegistry {
    capacity: usize,
    next_id: AtomicU64,
    slots: Mutex<Vec<Slot>>,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Register a new bounded queue
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push(Slot { id, sender });
        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.slots.lock().retain(|s| s.id != id);
    }

    /// Number of attached subscribers
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue to every subscriber in registration order; never blocks
    pub fn publish(&self, event: &Arc<Event>, metrics: &MetricsRegistry) {
        let mut slots = self.slots.lock();
        slots.retain(|slot| match slot.sender.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics.increment_subscriber_drops();
                tracing::warn!(
                    event = LogEvent::SubscriberLagged.as_str(),
                    subscriber = slot.id,
                    event_id = %event.id,
                    "subscriber queue full, notification dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

/// Handle to a subscriber queue; dropping it detaches the subscriber
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Arc<Event>>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the ledger is gone
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Detach explicitly
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::event::{EventSource, EventTarget};
    use crate::ledger::payload::EventPayload;

    fn event(id: &str) -> Arc<Event> {
        Arc::new(Event::new(
            id,
            EventSource::System,
            "test.event",
            EventTarget::new("node", id),
            EventPayload::empty(),
        ))
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new(4));
        let metrics = MetricsRegistry::new();
        let mut sub = registry.subscribe();

        registry.publish(&event("a"), &metrics);
        assert_eq!(sub.try_recv().unwrap().id, "a");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let registry = Arc::new(SubscriberRegistry::new(1));
        let metrics = MetricsRegistry::new();
        let mut sub = registry.subscribe();

        registry.publish(&event("a"), &metrics);
        registry.publish(&event("b"), &metrics);

        assert_eq!(metrics.snapshot().subscriber_drops, 1);
        assert_eq!(sub.try_recv().unwrap().id, "a");
        assert!(sub.try_recv().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let registry = Arc::new(SubscriberRegistry::new(4));
        let sub = registry.subscribe();
        let other = registry.subscribe();
        assert_eq!(registry.len(), 2);

        drop(sub);
        assert_eq!(registry.len(), 1);
        other.unsubscribe();
        assert!(registry.is_empty());
    }
}
