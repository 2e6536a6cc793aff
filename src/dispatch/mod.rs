//! Dispatch loop
//!
//! Emits one UNIT_STARTED per source, in order. Fetching is whoever
//! subscribes to UNIT_STARTED; this loop neither waits for nor limits them.

use comex_bus::{Event, EventBus};
use tracing::debug;

/// Emit UNIT_STARTED for every source. Returns the number of signals emitted.
pub fn dispatch<S: AsRef<str>>(bus: &EventBus, sources: &[S]) -> usize {
    for source in sources {
        let source = source.as_ref();
        let delivered = bus.emit(Event::started(source));
        debug!(source, delivered, "dispatched");
    }
    sources.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use comex_bus::EventKind;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_dispatch_in_order_with_duplicates() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.on(EventKind::UnitStarted, move |event| {
            if let Some(source) = event.source() {
                s.lock().unwrap().push(source.to_string());
            }
        });

        let count = dispatch(&bus, &["u1", "u2", "u1"]);

        assert_eq!(count, 3);
        assert_eq!(*seen.lock().unwrap(), vec!["u1", "u2", "u1"]);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let bus = EventBus::new();
        let sources: Vec<String> = Vec::new();
        assert_eq!(dispatch(&bus, &sources), 0);
        assert_eq!(dispatch(&bus, &["lonely"]), 1);
    }
}
