//! Fetch collaborators
//!
//! A fetcher listens for UNIT_STARTED and eventually answers with
//! UNIT_SUCCEEDED or UNIT_FAILED for the same source. Real fetchers talk to
//! the network; [`ScriptedFetcher`] answers from a table and is what the CLI
//! and the tests drive the loader with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use comex_bus::{Event, EventBus, EventKind, SubscriptionId};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Attaches a fetcher to a bus
pub trait Fetcher: Send + Sync {
    /// Subscribe to UNIT_STARTED on `bus`.
    fn attach(self: Arc<Self>, bus: &Arc<EventBus>) -> SubscriptionId;
}

/// Scripted answer for one source
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Answer UNIT_SUCCEEDED with this payload
    Succeed(Value),
    /// Answer UNIT_FAILED with this reason
    Fail(String),
    /// Never answer
    Hang,
}

impl Outcome {
    fn into_event(self, source: &str) -> Option<Event> {
        match self {
            Outcome::Succeed(payload) => Some(Event::succeeded(source, payload)),
            Outcome::Fail(reason) => Some(Event::failed(source, reason)),
            Outcome::Hang => None,
        }
    }
}

/// Answers fetch requests from a table of scripted outcomes.
///
/// By default answers are emitted immediately, from inside the UNIT_STARTED
/// handler. In deferred mode they are queued instead and released with
/// [`ScriptedFetcher::flush`] or [`ScriptedFetcher::take_pending`].
#[derive(Debug)]
pub struct ScriptedFetcher {
    outcomes: HashMap<String, Outcome>,
    default: Outcome,
    deferred: bool,
    pending: Mutex<Vec<Event>>,
    bus: Mutex<Weak<EventBus>>,
}

impl ScriptedFetcher {
    /// Every source succeeds unless scripted otherwise
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            default: Outcome::Succeed(json!({})),
            deferred: false,
            pending: Mutex::new(Vec::new()),
            bus: Mutex::new(Weak::new()),
        }
    }

    /// Script the outcome for `source`
    pub fn with_outcome(mut self, source: impl Into<String>, outcome: Outcome) -> Self {
        self.outcomes.insert(source.into(), outcome);
        self
    }

    /// Outcome for sources with no scripted entry
    pub fn with_default(mut self, outcome: Outcome) -> Self {
        self.default = outcome;
        self
    }

    /// Queue answers instead of emitting them immediately
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    fn pending(&self) -> MutexGuard<'_, Vec<Event>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outcome_for(&self, source: &str) -> Outcome {
        self.outcomes
            .get(source)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn on_started(&self, source: &str) {
        let Some(answer) = self.outcome_for(source).into_event(source) else {
            debug!(source, "fetch will never settle");
            return;
        };
        if let Event::UnitFailed { reason, .. } = &answer {
            warn!(source, reason = %reason, "fetch failed");
        }

        if self.deferred {
            self.pending().push(answer);
            return;
        }

        let bus = self
            .bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade();
        if let Some(bus) = bus {
            bus.emit(answer);
        }
    }

    /// Remove and return queued answers without emitting them
    pub fn take_pending(&self) -> Vec<Event> {
        std::mem::take(&mut *self.pending())
    }

    /// Emit all queued answers in arrival order. Returns how many were emitted.
    pub fn flush(&self, bus: &EventBus) -> usize {
        let answers = self.take_pending();
        let count = answers.len();
        for answer in answers {
            bus.emit(answer);
        }
        count
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for ScriptedFetcher {
    fn attach(self: Arc<Self>, bus: &Arc<EventBus>) -> SubscriptionId {
        *self.bus.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(bus);
        bus.on(EventKind::UnitStarted, move |event| {
            if let Event::UnitStarted { source } = event {
                self.on_started(source);
            }
        })
    }
}
