//! Signal types carried by the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a signal, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A fetch for one source was requested.
    UnitStarted,
    /// A source was fetched successfully.
    UnitSucceeded,
    /// Fetching a source failed.
    UnitFailed,
    /// Every dispatched source has settled.
    AllSettled,
}

impl EventKind {
    /// Every kind, in signal order.
    pub const ALL: [EventKind; 4] = [
        EventKind::UnitStarted,
        EventKind::UnitSucceeded,
        EventKind::UnitFailed,
        EventKind::AllSettled,
    ];

    /// Kinds that mark a unit as settled.
    pub fn settlements() -> impl Iterator<Item = EventKind> {
        Self::ALL.into_iter().filter(EventKind::is_settlement)
    }

    /// Whether this kind marks a unit as settled.
    pub fn is_settlement(&self) -> bool {
        matches!(self, EventKind::UnitSucceeded | EventKind::UnitFailed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitStarted => write!(f, "UNIT_STARTED"),
            Self::UnitSucceeded => write!(f, "UNIT_SUCCEEDED"),
            Self::UnitFailed => write!(f, "UNIT_FAILED"),
            Self::AllSettled => write!(f, "ALL_SETTLED"),
        }
    }
}

/// A signal published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Request to fetch `source`.
    UnitStarted { source: String },

    /// `source` was fetched; `payload` is whatever the fetcher produced.
    UnitSucceeded {
        source: String,
        #[serde(default)]
        payload: Value,
    },

    /// `source` could not be fetched.
    UnitFailed { source: String, reason: String },

    /// Terminal "ready" signal.
    AllSettled,
}

impl Event {
    /// Create a UNIT_STARTED signal
    pub fn started(source: impl Into<String>) -> Self {
        Event::UnitStarted {
            source: source.into(),
        }
    }

    /// Create a UNIT_SUCCEEDED signal
    pub fn succeeded(source: impl Into<String>, payload: Value) -> Self {
        Event::UnitSucceeded {
            source: source.into(),
            payload,
        }
    }

    /// Create a UNIT_FAILED signal
    pub fn failed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Event::UnitFailed {
            source: source.into(),
            reason: reason.into(),
        }
    }

    /// The kind this signal is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UnitStarted { .. } => EventKind::UnitStarted,
            Event::UnitSucceeded { .. } => EventKind::UnitSucceeded,
            Event::UnitFailed { .. } => EventKind::UnitFailed,
            Event::AllSettled => EventKind::AllSettled,
        }
    }

    /// The source this signal refers to, if any.
    pub fn source(&self) -> Option<&str> {
        match self {
            Event::UnitStarted { source }
            | Event::UnitSucceeded { source, .. }
            | Event::UnitFailed { source, .. } => Some(source),
            Event::AllSettled => None,
        }
    }
}
