//! Comex Event Bus
//!
//! Defines the signals exchanged while loading sources and the in-process
//! bus that carries them between the loader and its collaborators.

pub mod bus;
pub mod event;

pub use bus::{EventBus, SubscriptionId};
pub use event::{Event, EventKind};
