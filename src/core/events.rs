//! Publish/subscribe bus for typed component events.
//!
//! Every component that emits events (transport channel, speech coordinator,
//! call manager) owns one `EventBus<E>` over its own event enum. Subscribers
//! register a handler and receive a [`Subscription`] handle; dropping the
//! handle (or calling [`Subscription::unsubscribe`]) removes the handler.
//!
//! # Failure Isolation
//!
//! Each handler invocation runs inside `catch_unwind`. A handler that panics
//! is logged and skipped; delivery continues with the remaining handlers.
//!
//! ```rust
//! use waav_telephony::core::events::EventBus;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let bus: EventBus<String> = EventBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! let _sub = bus.subscribe(move |_event: &String| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! bus.publish(&"hello".to_string());
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Handler invoked for every published event.
pub type EventHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct BusInner<E> {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(u64, EventHandler<E>)>>,
}

/// Typed event bus with isolated handler delivery.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                handlers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a handler. The handler stays registered for as long as the
    /// returned [`Subscription`] is alive.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.write().push((id, Arc::new(handler)));

        let weak: Weak<BusInner<E>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            remove: Some(Box::new(move |id| {
                if let Some(inner) = weak.upgrade() {
                    inner.handlers.write().retain(|(hid, _)| *hid != id);
                }
            })),
        }
    }

    /// Deliver an event to every registered handler.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot so handlers may subscribe/unsubscribe while we deliver
        let handlers: Vec<EventHandler<E>> = self
            .inner
            .handlers
            .read()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(panic_info) => {
                    let msg = extract_panic_message(&panic_info);
                    tracing::error!(message = %msg, "Event handler panicked, continuing delivery");
                }
            }
        }
        delivered
    }

    /// Number of currently registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.read().len()
    }
}

/// Handle for a registered event handler.
///
/// Dropping the handle unsubscribes the handler.
pub struct Subscription {
    id: u64,
    remove: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl Subscription {
    /// Identifier of the registered handler.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Explicitly remove the handler from its bus.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Extract a readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = total.clone();
        let _a = bus.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = total.clone();
        let _b = bus.subscribe(move |v| {
            t2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&5), 2);
        assert_eq!(total.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus: EventBus<&'static str> = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = bus.subscribe(|_| panic!("listener failure"));
        let s = seen.clone();
        let _good = bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = bus.publish(&"event");
        assert_eq!(delivered, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // The bus keeps working after a panic
        bus.publish(&"event");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let bus: EventBus<()> = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sub = bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus: EventBus<()> = EventBus::new();
        {
            let _sub = bus.subscribe(|_| {});
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let sub = {
            let bus: EventBus<()> = EventBus::new();
            bus.subscribe(|_| {})
        };
        // Removing from a dropped bus is a no-op
        sub.unsubscribe();
    }
}
