// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! echo-physics CLI entrypoint.
//!
//! Runs the canonical physics scenes headless and prints a JSON report, and
//! manages the persisted physics configuration.
//!
//! # Usage
//! ```text
//! echo-physics [--config-dir <DIR>] run <SCENARIO> [--steps N] [--dt S] [--check]
//! echo-physics [--config-dir <DIR>] config <show|init|path>
//! ```
//!
//! Logs go to stderr (filtered by `RUST_LOG`), reports to stdout. The CLI
//! exits with code `0` on success and non-zero on error or a failed `--check`.

// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod scenario;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use echo_physics::config::{BroadPhaseKind, ConfigService, PHYSICS_CONFIG_KEY};
use echo_physics::PhysicsConfig;
use echo_physics_config_fs::FsConfigStore;

use scenario::{RunOptions, Scenario};

#[derive(Parser, Debug)]
#[command(name = "echo-physics", author, version, about = "Echo physics developer tools")]
struct Cli {
    /// Directory holding `physics.json` (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario and print a JSON report
    Run {
        scenario: Scenario,
        /// Number of steps (scenario default when omitted)
        #[arg(long)]
        steps: Option<u32>,
        /// Fixed time step in seconds
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,
        /// Restitution of the head-on spheres
        #[arg(long, default_value_t = 0.0)]
        restitution: f32,
        /// Override the configured broad phase
        #[arg(long)]
        broad_phase: Option<BroadPhaseArg>,
        /// Exit non-zero when the scenario misses its expected outcome
        #[arg(long)]
        check: bool,
    },
    /// Inspect or initialise the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration (unless one exists)
    Init,
    /// Print the path of the configuration file
    Path,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum BroadPhaseArg {
    Sap,
    Tree,
}

impl From<BroadPhaseArg> for BroadPhaseKind {
    fn from(arg: BroadPhaseArg) -> Self {
        match arg {
            BroadPhaseArg::Sap => Self::SweepAndPrune,
            BroadPhaseArg::Tree => Self::AabbTree,
        }
    }
}

fn open_store(config_dir: Option<PathBuf>) -> Result<FsConfigStore> {
    let store = match config_dir {
        Some(dir) => FsConfigStore::with_base_dir(&dir)
            .with_context(|| format!("failed to open config dir {}", dir.display()))?,
        None => FsConfigStore::new().context("failed to open platform config dir")?,
    };
    Ok(store)
}

fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    let store = open_store(cli.config_dir)?;
    let config_path = store.path_for(PHYSICS_CONFIG_KEY);
    let service = ConfigService::new(store);

    match cli.command {
        Commands::Run { scenario, steps, dt, restitution, broad_phase, check } => {
            if !(dt.is_finite() && dt > 0.0) {
                bail!("--dt must be a positive number of seconds");
            }
            let mut config = service.load_physics().context("failed to load physics config")?;
            if let Some(kind) = broad_phase {
                config.broad_phase.kind = kind.into();
            }
            let steps = steps.unwrap_or_else(|| scenario.default_steps());
            let options = RunOptions { steps, dt, restitution };
            let report = scenario::run(scenario, &config, &options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if check && !report.passed {
                bail!("scenario {scenario:?} missed its expected outcome");
            }
        }
        Commands::Config { action: ConfigAction::Show } => {
            let config = service.load_physics().context("failed to load physics config")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Config { action: ConfigAction::Init } => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            service.save(PHYSICS_CONFIG_KEY, &PhysicsConfig::default())?;
            println!("{}", config_path.display());
        }
        Commands::Config { action: ConfigAction::Path } => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    entrypoint()
}
