//! Load pipeline
//!
//! Runs one load cycle:
//! - Resolve sources and overrides from share state
//! - Build the effective graph configuration
//! - Arm the settlement barrier (before any dispatch)
//! - Dispatch one UNIT_STARTED per source
//!
//! The barrier emits ALL_SETTLED on the bus once every dispatched unit has
//! settled. An empty source list arms no barrier and never signals ready,
//! unless `ready_on_empty` is set in the loader settings.
//!
//! One loader runs one cycle at a time: a new run is refused while the
//! previous run's barrier is still waiting.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use comex_bus::{Event, EventBus, EventKind, SubscriptionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::barrier::{Barrier, BarrierHandle, BarrierState};
use crate::catalog::{CatalogError, ExampleCatalog};
use crate::config::{merge_overrides, Configuration, LoaderSettings, MergeError, SettingsError};
use crate::dispatch::dispatch;
use crate::resolve::{Resolution, ResolveError, Resolver};
use crate::share::{ShareState, ShareStateError};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("share state error: {0}")]
    ShareState(#[from] ShareStateError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("{0}")]
    Merge(#[from] MergeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run {run_id} is still waiting for its sources")]
    RunInProgress { run_id: String },
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Settings(_) => 1,
            PipelineError::Catalog(_) => 1,
            PipelineError::ShareState(_) => 2,
            PipelineError::Resolve(ResolveError::InvalidExampleIndex { .. }) => 3,
            PipelineError::Resolve(ResolveError::Override(_)) => 4,
            PipelineError::Resolve(ResolveError::ShareState(_)) => 2,
            PipelineError::Merge(_) => 4,
            PipelineError::Serialization(_) => 1,
            PipelineError::RunInProgress { .. } => 5,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How one unit settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Succeeded,
    Failed,
}

/// Settlement observed for one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub source: String,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct Observations {
    outcomes: Vec<UnitOutcome>,
    settled_at: Option<DateTime<Utc>>,
    recording: bool,
}

/// Records per-unit outcomes and the ready time for a run.
///
/// The barrier only answers "are we done"; this is where failures stay
/// visible. Recording stops when the run's own barrier closes, so units of
/// a later run on the same bus are never attributed to this one.
struct Recorder {
    observations: Arc<Mutex<Observations>>,
    subscriptions: Vec<SubscriptionId>,
}

impl Recorder {
    fn attach(bus: &EventBus, recording: bool) -> Self {
        let observations = Arc::new(Mutex::new(Observations {
            recording,
            ..Observations::default()
        }));
        let subscriptions = EventKind::settlements()
            .map(|kind| {
                let observations = Arc::clone(&observations);
                bus.on(kind, move |event| {
                    let mut obs = observations.lock().unwrap_or_else(PoisonError::into_inner);
                    if !obs.recording {
                        return;
                    }
                    let outcome = match event {
                        Event::UnitSucceeded { source, .. } => UnitOutcome {
                            source: source.clone(),
                            status: UnitStatus::Succeeded,
                            reason: None,
                        },
                        Event::UnitFailed { source, reason } => UnitOutcome {
                            source: source.clone(),
                            status: UnitStatus::Failed,
                            reason: Some(reason.clone()),
                        },
                        _ => return,
                    };
                    obs.outcomes.push(outcome);
                })
            })
            .collect();

        Self {
            observations,
            subscriptions,
        }
    }

    /// Barrier callback: stamp the ready time, then signal ALL_SETTLED.
    fn on_ready(&self, bus: &Arc<EventBus>) -> impl FnOnce() + Send + 'static {
        let observations = Arc::clone(&self.observations);
        let bus = Arc::downgrade(bus);
        move || {
            {
                let mut obs = observations.lock().unwrap_or_else(PoisonError::into_inner);
                obs.recording = false;
                obs.settled_at.get_or_insert_with(Utc::now);
            }
            if let Some(bus) = bus.upgrade() {
                bus.emit(Event::AllSettled);
            }
        }
    }

    fn observations(&self) -> MutexGuard<'_, Observations> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        self.observations().recording = false;
    }

    fn detach(&mut self, bus: &EventBus) {
        for id in self.subscriptions.drain(..) {
            bus.off(id);
        }
    }
}

/// Barrier of the most recent run that armed one
struct ActiveRun {
    run_id: String,
    barrier: BarrierHandle,
}

/// Loads sources for a graph
pub struct Loader {
    bus: Arc<EventBus>,
    catalog: ExampleCatalog,
    settings: LoaderSettings,
    active: Mutex<Option<ActiveRun>>,
}

impl Loader {
    /// Create a loader on an existing bus
    pub fn new(bus: Arc<EventBus>, catalog: ExampleCatalog, settings: LoaderSettings) -> Self {
        Self {
            bus,
            catalog,
            settings,
            active: Mutex::new(None),
        }
    }

    /// Build a loader from a settings file (defaults if the file is absent).
    ///
    /// Uses the catalog named by the settings, or the built-in catalog.
    pub fn from_settings_file(bus: Arc<EventBus>, path: &Path) -> PipelineResult<Self> {
        let settings = LoaderSettings::load_or_default(path)?;
        Self::from_settings(bus, settings)
    }

    /// Build a loader from parsed settings
    pub fn from_settings(bus: Arc<EventBus>, settings: LoaderSettings) -> PipelineResult<Self> {
        let mut catalog = match &settings.catalog {
            Some(path) => ExampleCatalog::load(path)?,
            None => ExampleCatalog::builtin(),
        };
        if let Some(fallback) = settings.fallback_example {
            catalog = catalog.with_fallback(fallback)?;
        }
        Ok(Self::new(bus, catalog, settings))
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn catalog(&self) -> &ExampleCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Resolve sources and build the effective configuration without
    /// dispatching anything.
    pub fn prepare(&self, share: &dyn ShareState) -> PipelineResult<(Resolution, Configuration)> {
        let resolution = Resolver::new(&self.catalog).resolve(share)?;
        let mut configuration = self.settings.base_configuration()?;
        merge_overrides(&mut configuration, &resolution.overrides)?;
        Ok((resolution, configuration))
    }

    /// Run one load cycle.
    ///
    /// Fetchers must already be attached to the bus. If they answer
    /// synchronously the returned run may already be ready. Fails with
    /// [`PipelineError::RunInProgress`] while the previous run on this
    /// loader is still waiting.
    pub fn run(&self, share: &dyn ShareState) -> PipelineResult<LoadRun> {
        let started_at = Utc::now();
        let run_id = format!("run-{}", Uuid::new_v4());

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.as_ref() {
            if !previous.barrier.state().is_terminal() {
                return Err(PipelineError::RunInProgress {
                    run_id: previous.run_id.clone(),
                });
            }
        }

        let (resolution, configuration) = self.prepare(share)?;
        let units = resolution.sources.len();
        let recorder = Recorder::attach(&self.bus, units > 0);

        // A zero-unit barrier fires inside `arm`, so it is armed after the
        // lock is released.
        let barrier = if units > 0 {
            let barrier = Barrier::arm(&self.bus, units, recorder.on_ready(&self.bus));
            *active = Some(ActiveRun {
                run_id: run_id.clone(),
                barrier: barrier.clone(),
            });
            drop(active);
            Some(barrier)
        } else {
            *active = None;
            drop(active);
            if self.settings.ready_on_empty {
                Some(Barrier::arm(&self.bus, 0, recorder.on_ready(&self.bus)))
            } else {
                info!(%run_id, "no sources resolved, nothing to load");
                None
            }
        };

        info!(%run_id, sources = units, "dispatching");
        dispatch(&self.bus, &resolution.sources);

        Ok(LoadRun {
            run_id,
            started_at,
            resolution,
            configuration: Arc::new(configuration),
            barrier,
            recorder,
            bus: Arc::clone(&self.bus),
        })
    }
}

/// One in-flight or finished load cycle
///
/// Dropping a run detaches its recorder and abandons its barrier if it is
/// still waiting.
pub struct LoadRun {
    run_id: String,
    started_at: DateTime<Utc>,
    resolution: Resolution,
    configuration: Arc<Configuration>,
    barrier: Option<BarrierHandle>,
    recorder: Recorder,
    bus: Arc<EventBus>,
}

impl LoadRun {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// The effective configuration, shared read-only with downstream consumers
    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.configuration)
    }

    /// The barrier, if one was armed
    pub fn barrier(&self) -> Option<&BarrierHandle> {
        self.barrier.as_ref()
    }

    /// Whether this run's barrier has fired
    pub fn is_ready(&self) -> bool {
        self.recorder.observations().settled_at.is_some()
    }

    /// Give up waiting: detach the barrier without signalling ready
    pub fn abandon(&self) -> bool {
        let abandoned = self.barrier.as_ref().map(BarrierHandle::abandon).unwrap_or(false);
        if abandoned {
            self.recorder.stop();
        }
        abandoned
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> PipelineResult<RunReport> {
        let obs = self.recorder.observations();
        Ok(RunReport {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            settled_at: obs.settled_at,
            resolution: self.resolution.clone(),
            configuration: (*self.configuration).clone(),
            config_digest: self.configuration.digest()?,
            barrier: self.barrier.as_ref().map(BarrierHandle::state),
            outcomes: obs.outcomes.clone(),
            ready: obs.settled_at.is_some(),
        })
    }

    /// Produce the final report and release the run
    pub fn finish(self) -> PipelineResult<RunReport> {
        self.report()
    }
}

impl Drop for LoadRun {
    fn drop(&mut self) {
        self.abandon();
        self.recorder.detach(&self.bus);
    }
}

/// Serializable summary of a load cycle
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    pub resolution: Resolution,
    pub configuration: Configuration,
    pub config_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier: Option<BarrierState>,
    pub outcomes: Vec<UnitOutcome>,
    pub ready: bool,
}

impl RunReport {
    /// Number of units that failed
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == UnitStatus::Failed)
            .count()
    }

    /// Serialize to JSON (pretty printed)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
