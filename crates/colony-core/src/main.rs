//! Colony simulation runner
//!
//! Runs the wealth exchange model and writes population snapshots as JSON Lines.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use colony_core::{default_config_toml, SimConfig, SimError, TableLogger, WealthModel};

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "colony_sim")]
#[command(about = "Agent-based wealth exchange simulation")]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for reproducibility (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Number of steps to simulate (overrides the config)
    #[arg(long)]
    steps: Option<u64>,

    /// Snapshot output file (overrides the config)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.print_config {
        print!("{}", default_config_toml());
        return ExitCode::SUCCESS;
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: could not install log subscriber: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<SimConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    if let Some(steps) = args.steps {
        config.run.steps = steps;
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), SimError> {
    let config = load_config(args)?;
    info!(
        seed = config.run.seed,
        steps = config.run.steps,
        traders = config.population.count,
        output = %config.output.path.display(),
        "starting colony simulation"
    );

    let mut model = WealthModel::new(&config)?;
    let mut logger = TableLogger::new(&config.output.path)?;
    let summaries = model.run(config.run.steps, config.output.export_interval, &mut logger)?;

    if let Some(last) = summaries.last() {
        info!(
            step = last.step,
            population = last.population,
            total_wealth = last.total_wealth,
            gini = last.gini,
            "simulation complete"
        );
    }
    for (id, account) in model.richest(5)? {
        info!(trader = %id, account, "top trader");
    }
    info!(rows = logger.rows_written(), "snapshots written");
    Ok(())
}
