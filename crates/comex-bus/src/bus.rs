//! Synchronous publish/subscribe bus
//!
//! Delivery guarantees:
//! - `emit` delivers to every handler registered for the event's kind at the
//!   moment `emit` is called, in registration order, before returning.
//! - Handlers may call back into the bus (emit, subscribe, unsubscribe).
//!   The handler list is snapshotted before delivery, so a handler detached
//!   by an earlier handler still receives the event being delivered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::event::{Event, EventKind};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Opaque handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// In-process event bus
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    // Handlers never run while the lock is held, so poisoning can only come
    // from a panic inside this module; the list itself stays consistent.
    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for every future event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        trace!(%id, %kind, "subscribed");
        id
    }

    /// Detach a subscription.
    ///
    /// Returns `false` if the subscription was already detached; calling
    /// this more than once is harmless.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if removed {
            trace!(%id, "unsubscribed");
        }
        removed
    }

    /// Deliver `event` to all handlers currently registered for its kind.
    ///
    /// Returns the number of handlers the event was delivered to.
    pub fn emit(&self, event: Event) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscriptions()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        trace!(%kind, handlers = handlers.len(), "emit");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Number of live subscriptions for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions().iter().filter(|s| s.kind == kind).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions().len())
            .finish()
    }
}
