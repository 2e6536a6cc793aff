//! Comex loader CLI
//!
//! Entry point for the `comex` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use comex_sources::config::DEFAULT_SETTINGS_FILE;
use comex_sources::fetch::{Fetcher, Outcome, ScriptedFetcher};
use comex_sources::share::{EXAMPLE_PARAM, GRAPH_CONFIG_PARAM, SOURCE_PARAM};
use comex_sources::{EventBus, JsonShareState, Loader, PipelineError};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "comex")]
#[command(about = "Resolve and load comment sources for a graph", version)]
struct Cli {
    /// Path to loader settings (default: comex.toml)
    #[arg(long, short = 's', global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved sources and effective graph configuration
    Resolve {
        #[command(flatten)]
        share: ShareArgs,
    },

    /// Resolve, dispatch, and wait for every source to settle
    Run {
        #[command(flatten)]
        share: ShareArgs,

        /// Make fetching this source fail (repeatable)
        #[arg(long, value_name = "SOURCE")]
        fail: Vec<String>,

        /// Make fetching this source never settle (repeatable)
        #[arg(long, value_name = "SOURCE")]
        hang: Vec<String>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the example catalog
    Examples {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ShareArgs {
    /// Share state JSON file
    #[arg(long, conflicts_with = "state_json")]
    state: Option<PathBuf>,

    /// Share state as an inline JSON object
    #[arg(long)]
    state_json: Option<String>,

    /// Source to load (repeatable, replaces share-state sources)
    #[arg(long)]
    source: Vec<String>,

    /// Graph config override as `section|{json}` (repeatable)
    #[arg(long, value_name = "FRAGMENT")]
    graph_config: Vec<String>,

    /// Select a catalog example by index
    #[arg(long, allow_negative_numbers = true)]
    example: Option<i64>,
}

impl ShareArgs {
    fn into_share_state(self) -> Result<JsonShareState, PipelineError> {
        let mut state = match (self.state, self.state_json) {
            (Some(path), _) => JsonShareState::load(&path)?,
            (None, Some(inline)) => JsonShareState::parse(&inline)?,
            (None, None) => JsonShareState::new(),
        };
        if !self.source.is_empty() {
            state = state.with(SOURCE_PARAM, json!(self.source));
        }
        if !self.graph_config.is_empty() {
            state = state.with(GRAPH_CONFIG_PARAM, json!(self.graph_config));
        }
        if let Some(example) = self.example {
            state = state.with(EXAMPLE_PARAM, json!(example));
        }
        Ok(state)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli
        .settings
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    let result = match cli.command {
        Commands::Resolve { share } => run_resolve(&settings, share),
        Commands::Run {
            share,
            fail,
            hang,
            json,
        } => run_load(&settings, share, fail, hang, json),
        Commands::Examples { json } => run_examples(&settings, json),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn loader(settings: &Path) -> Result<Loader, PipelineError> {
    Loader::from_settings_file(Arc::new(EventBus::new()), settings)
}

fn run_resolve(settings: &Path, share: ShareArgs) -> Result<i32, PipelineError> {
    let loader = loader(settings)?;
    let state = share.into_share_state()?;
    let (resolution, configuration) = loader.prepare(&state)?;

    let output = json!({
        "resolution": resolution,
        "configuration": configuration,
        "config_digest": configuration.digest()?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}

fn run_load(
    settings: &Path,
    share: ShareArgs,
    fail: Vec<String>,
    hang: Vec<String>,
    json: bool,
) -> Result<i32, PipelineError> {
    let loader = loader(settings)?;
    let state = share.into_share_state()?;

    let mut fetcher = ScriptedFetcher::new();
    for source in fail {
        fetcher = fetcher.with_outcome(source, Outcome::Fail("scripted failure".to_string()));
    }
    for source in hang {
        fetcher = fetcher.with_outcome(source, Outcome::Hang);
    }
    Arc::new(fetcher).attach(loader.bus());

    let run = loader.run(&state)?;
    if !run.is_ready() {
        run.abandon();
    }
    let report = run.finish()?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("Run {}", report.run_id);
        println!("  Sources: {}", report.resolution.sources.len());
        for outcome in &report.outcomes {
            match &outcome.reason {
                Some(reason) => println!("    FAILED    {} ({})", outcome.source, reason),
                None => println!("    SUCCEEDED {}", outcome.source),
            }
        }
        println!("  Config digest: {}", report.config_digest);
        println!("  Ready: {}", if report.ready { "yes" } else { "no" });
    }

    // Not ready means some source never settled (or none resolved).
    Ok(if report.ready { 0 } else { 10 })
}

fn run_examples(settings: &Path, json: bool) -> Result<i32, PipelineError> {
    let loader = loader(settings)?;
    let catalog = loader.catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(catalog)?);
        return Ok(0);
    }

    for (index, entry) in catalog.iter().enumerate() {
        let marker = if index == catalog.fallback_index() { "*" } else { " " };
        println!("{}{:>3}  {} ({} sources)", marker, index, entry.name, entry.sources.len());
    }
    Ok(0)
}
