//! Settlement barrier
//!
//! Waits for a known number of units to settle (succeed or fail) and then
//! runs a terminal callback exactly once.
//!
//! Barrier states: WAITING(k) → {DONE | ABANDONED}
//! - Every UNIT_SUCCEEDED or UNIT_FAILED moves WAITING(k) to WAITING(k-1),
//!   or to DONE when k = 1.
//! - Entering DONE detaches both subscriptions and then runs the callback.
//!   Nothing else runs the callback.
//! - ABANDONED is entered only through [`BarrierHandle::abandon`]; it
//!   detaches without running the callback.
//! - DONE and ABANDONED are terminal; later signals are counted as ignored.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use comex_bus::{EventBus, EventKind, SubscriptionId};
use serde::Serialize;
use tracing::{debug, info};

/// Barrier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierState {
    /// `remaining` units (always > 0) have not settled yet
    Waiting { remaining: usize },
    /// Every unit settled and the callback ran
    Done,
    /// Given up before completion; the callback never runs
    Abandoned,
}

impl BarrierState {
    /// Initial state for `n` units
    pub fn new(n: usize) -> Self {
        if n == 0 {
            BarrierState::Done
        } else {
            BarrierState::Waiting { remaining: n }
        }
    }

    /// State after one more unit settles
    pub fn settle(self) -> Self {
        match self {
            BarrierState::Waiting { remaining } if remaining > 1 => BarrierState::Waiting {
                remaining: remaining - 1,
            },
            BarrierState::Waiting { .. } => BarrierState::Done,
            terminal => terminal,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BarrierState::Waiting { .. })
    }

    /// Units still outstanding
    pub fn remaining(&self) -> usize {
        match self {
            BarrierState::Waiting { remaining } => *remaining,
            _ => 0,
        }
    }
}

type OnZero = Box<dyn FnOnce() + Send>;

struct BarrierInner {
    state: BarrierState,
    subscriptions: Vec<SubscriptionId>,
    on_zero: Option<OnZero>,
    observed: usize,
    ignored: usize,
}

/// Creates settlement barriers on a bus
pub struct Barrier;

impl Barrier {
    /// Arm a barrier for `n` units on `bus`.
    ///
    /// With `n == 0` the callback runs before this returns and the handle
    /// comes back already DONE with nothing subscribed. Otherwise one
    /// handler is subscribed to UNIT_SUCCEEDED and UNIT_FAILED; arm the
    /// barrier before dispatching so no early settlement is missed.
    pub fn arm<F>(bus: &Arc<EventBus>, n: usize, on_zero: F) -> BarrierHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::new(Mutex::new(BarrierInner {
            state: BarrierState::new(n),
            subscriptions: Vec::new(),
            on_zero: Some(Box::new(on_zero)),
            observed: 0,
            ignored: 0,
        }));
        let handle = BarrierHandle {
            inner,
            bus: Arc::downgrade(bus),
        };

        if n == 0 {
            debug!("barrier armed with zero units, firing immediately");
            handle.fire();
            return handle;
        }

        let ids: Vec<SubscriptionId> = EventKind::settlements()
            .map(|kind| {
                let handle = handle.clone();
                bus.on(kind, move |_| handle.on_settled())
            })
            .collect();

        let late = {
            let mut inner = handle.lock();
            if inner.state.is_terminal() {
                true
            } else {
                inner.subscriptions = ids.clone();
                false
            }
        };
        // Settled on another thread between `on` and here
        if late {
            for id in ids {
                bus.off(id);
            }
        }

        debug!(units = n, "barrier armed");
        handle
    }
}

/// Handle to an armed barrier
///
/// Dropping the handle does not disarm the barrier.
#[derive(Clone)]
pub struct BarrierHandle {
    inner: Arc<Mutex<BarrierInner>>,
    bus: Weak<EventBus>,
}

impl BarrierHandle {
    fn lock(&self) -> MutexGuard<'_, BarrierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_settled(&self) {
        let fired = {
            let mut inner = self.lock();
            inner.observed += 1;
            let before = inner.state;
            if before.is_terminal() {
                inner.ignored += 1;
                debug!(state = ?before, "settlement after barrier closed, ignoring");
                return;
            }
            inner.state = before.settle();
            debug!(remaining = inner.state.remaining(), "unit settled");
            inner.state == BarrierState::Done
        };

        if fired {
            self.fire();
        }
    }

    // Entry into DONE: detach, then run the callback outside the lock.
    fn fire(&self) {
        self.detach();
        let on_zero = self.lock().on_zero.take();
        if let Some(on_zero) = on_zero {
            info!("all units settled");
            on_zero();
        }
    }

    /// Drop both subscriptions. Safe to call any number of times.
    fn detach(&self) {
        let ids = mem::take(&mut self.lock().subscriptions);
        if let Some(bus) = self.bus.upgrade() {
            for id in ids {
                bus.off(id);
            }
        }
    }

    /// Give up on a waiting barrier without running the callback.
    ///
    /// Returns `false` if the barrier had already reached a terminal state.
    pub fn abandon(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = BarrierState::Abandoned;
            inner.on_zero = None;
        }
        self.detach();
        info!("barrier abandoned");
        true
    }

    /// Current state
    pub fn state(&self) -> BarrierState {
        self.lock().state
    }

    /// Units still outstanding
    pub fn remaining(&self) -> usize {
        self.lock().state.remaining()
    }

    /// Whether the callback has run
    pub fn is_done(&self) -> bool {
        self.state() == BarrierState::Done
    }

    /// Settlement signals delivered to this barrier, including ignored ones
    pub fn observed(&self) -> usize {
        self.lock().observed
    }

    /// Settlement signals that arrived after the barrier closed
    pub fn ignored(&self) -> usize {
        self.lock().ignored
    }

    /// Whether the barrier still holds bus subscriptions
    pub fn is_attached(&self) -> bool {
        !self.lock().subscriptions.is_empty()
    }
}

impl fmt::Debug for BarrierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("BarrierHandle")
            .field("state", &inner.state)
            .field("subscriptions", &inner.subscriptions)
            .field("observed", &inner.observed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comex_bus::Event;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        (fired, move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_state_transitions() {
        let state = BarrierState::new(2);
        assert_eq!(state, BarrierState::Waiting { remaining: 2 });
        let state = state.settle();
        assert_eq!(state, BarrierState::Waiting { remaining: 1 });
        let state = state.settle();
        assert_eq!(state, BarrierState::Done);
        assert_eq!(state.settle(), BarrierState::Done);
        assert_eq!(BarrierState::Abandoned.settle(), BarrierState::Abandoned);
        assert_eq!(BarrierState::new(0), BarrierState::Done);
    }

    #[test]
    fn test_zero_fires_synchronously() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();

        let handle = Barrier::arm(&bus, 0, on_zero);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_done());
        assert!(!handle.is_attached());
        assert_eq!(bus.subscriber_count(EventKind::UnitSucceeded), 0);
        assert_eq!(bus.subscriber_count(EventKind::UnitFailed), 0);
    }

    #[test]
    fn test_mixed_settlements_fire_once() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        let handle = Barrier::arm(&bus, 3, on_zero);

        assert_eq!(bus.subscriber_count(EventKind::UnitSucceeded), 1);
        assert_eq!(bus.subscriber_count(EventKind::UnitFailed), 1);

        bus.emit(Event::succeeded("a", Value::Null));
        bus.emit(Event::failed("b", "timeout upstream"));
        assert_eq!(handle.remaining(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        bus.emit(Event::succeeded("c", Value::Null));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_done());
        assert!(!handle.is_attached());
        assert_eq!(bus.subscriber_count(EventKind::UnitSucceeded), 0);
        assert_eq!(bus.subscriber_count(EventKind::UnitFailed), 0);

        // Stragglers no longer reach the barrier at all.
        bus.emit(Event::failed("d", "late"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(handle.observed(), 3);
    }

    #[test]
    fn test_started_signals_do_not_count() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        let handle = Barrier::arm(&bus, 1, on_zero);

        bus.emit(Event::started("a"));
        bus.emit(Event::AllSettled);
        assert_eq!(handle.remaining(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_straggler_in_same_delivery_is_ignored() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        let handle = Barrier::arm(&bus, 1, on_zero);

        // Calling the handler twice simulates a duplicate delivered from a
        // snapshot taken before the barrier detached.
        handle.on_settled();
        handle.on_settled();
        handle.detach();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(handle.ignored(), 1);
        assert_eq!(handle.state(), BarrierState::Done);
    }

    #[test]
    fn test_abandon_detaches_without_firing() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        let handle = Barrier::arm(&bus, 2, on_zero);

        bus.emit(Event::succeeded("a", Value::Null));
        assert!(handle.abandon());
        assert!(!handle.abandon());
        assert_eq!(handle.state(), BarrierState::Abandoned);
        assert_eq!(bus.subscriber_count(EventKind::UnitSucceeded), 0);

        bus.emit(Event::succeeded("b", Value::Null));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abandon_after_done_is_noop() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        let handle = Barrier::arm(&bus, 1, on_zero);

        bus.emit(Event::failed("a", "gone"));
        assert!(!handle.abandon());
        assert_eq!(handle.state(), BarrierState::Done);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_emit_on_bus() {
        let bus = Arc::new(EventBus::new());
        let settled = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&settled);
        bus.on(EventKind::AllSettled, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let emitter = Arc::clone(&bus);
        Barrier::arm(&bus, 1, move || {
            emitter.emit(Event::AllSettled);
        });
        bus.emit(Event::succeeded("a", Value::Null));

        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_handle_keeps_barrier_armed() {
        let bus = Arc::new(EventBus::new());
        let (fired, on_zero) = counter();
        drop(Barrier::arm(&bus, 1, on_zero));

        bus.emit(Event::succeeded("a", Value::Null));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
