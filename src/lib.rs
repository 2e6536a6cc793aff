//! Comex source loader
//!
//! Resolves which sources a comment graph is built from, fetches them
//! through the event bus, and signals ready exactly once when every fetch
//! has settled.

pub mod barrier;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod pipeline;
pub mod resolve;
pub mod share;

pub use barrier::{Barrier, BarrierHandle, BarrierState};
pub use catalog::{CatalogError, ExampleCatalog, ExampleEntry};
pub use comex_bus::{Event, EventBus, EventKind, SubscriptionId};
pub use config::{Configuration, LoaderSettings, MergeError, OverrideFragment};
pub use pipeline::{LoadRun, Loader, PipelineError, RunReport};
pub use resolve::{Resolution, ResolveError, Resolver};
pub use share::{JsonShareState, ShareState};
