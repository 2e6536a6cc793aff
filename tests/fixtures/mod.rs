//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use comex_sources::{EventBus, EventKind, ExampleCatalog};

/// Path to the test catalog
pub fn catalog_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/data/catalog.toml")
}

/// Path to the sample share state
pub fn share_state_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/data/share_state.json")
}

/// Load the test catalog
pub fn catalog() -> ExampleCatalog {
    ExampleCatalog::load(&catalog_path()).expect("test catalog must load")
}

/// Count every event of `kind` delivered on `bus`
pub fn count_kind(bus: &EventBus, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.on(kind, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

/// Read a counter
pub fn get(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}
