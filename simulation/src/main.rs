//! Ferry - DTN Simulation
//!
//! Runs delay-tolerant network scenarios with subscription-gated epidemic
//! and neighbor-aware routing, and writes drop and event reports.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ferry_simulation::scenarios::{self, BuiltinScenario};
use ferry_simulation::{DropReport, EventLogReport, Report, ScenarioConfig, World};

#[derive(Parser)]
#[command(
    name = "ferry-sim",
    about = "Delay-tolerant network simulation with publish/subscribe routing",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario described by a JSON file
    Run {
        /// Scenario file
        #[arg(short, long)]
        config: PathBuf,

        /// Run this many ticks instead of the configured duration
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Write the CSV drop report here
        #[arg(long)]
        drop_report: Option<PathBuf>,

        /// Write the event log here
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// Run a built-in scenario
    Scenario {
        #[arg(value_enum)]
        name: BuiltinScenario,
    },

    /// Print the default scenario as JSON
    DefaultConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            drop_report,
            event_log,
        } => {
            let scenario = ScenarioConfig::load(&config)
                .with_context(|| format!("failed to load scenario {}", config.display()))?;
            let mut world = World::new(scenario).context("failed to build the world")?;
            match ticks {
                Some(n) => world.run_ticks(n)?,
                None => world.run()?,
            }
            scenarios::print_final_statistics(&world);

            if let Some(path) = drop_report {
                write_report(&DropReport, &world, &path)?;
            }
            if let Some(path) = event_log {
                write_report(&EventLogReport, &world, &path)?;
            }
        }
        Commands::Scenario { name } => {
            name.run()?;
        }
        Commands::DefaultConfig => {
            println!("{}", ScenarioConfig::default().to_json()?);
        }
    }

    Ok(())
}

fn write_report<R: Report>(report: &R, world: &World, path: &Path) -> anyhow::Result<()> {
    report
        .save(world.events(), path)
        .with_context(|| format!("failed to write {} to {}", report.name(), path.display()))?;
    info!(report = report.name(), path = %path.display(), "Report written");
    Ok(())
}
