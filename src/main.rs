use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use econsim::{proportional_split, Amount, Config, EconomyModel};

//==================== CLI ====================//

#[derive(Parser)]
#[command(name = "econsim", version, about = "Agent-based monthly economy simulator")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulation and write per-step metrics as CSV
    Run {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        #[arg(long, default_value = "results/metrics.csv")]
        output: PathBuf,
        /// Overrides model.steps
        #[arg(long)]
        steps: Option<u64>,
        /// Overrides model.seed
        #[arg(long)]
        seed: Option<u64>,
        /// Write the final ledger snapshot as JSON
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Load and validate a configuration file
    Validate {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Print the largest-remainder split of TOTAL by comma-separated weights
    Split {
        #[arg(long, allow_hyphen_values = true)]
        total: Amount,
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        weights: Vec<u64>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(fmt::layer().without_time())
        .init();
}

//==================== Commands ====================//

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn cmd_run(
    config: &Path,
    output: &Path,
    steps: Option<u64>,
    seed: Option<u64>,
    snapshot: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(steps) = steps {
        config.model.steps = steps;
    }
    if let Some(seed) = seed {
        config.model.seed = seed;
    }
    let steps = config.model.steps;
    info!(steps, seed = config.model.seed, "starting simulation");

    let mut model = EconomyModel::new(&config).context("initialising economy")?;
    model.run(steps).context("running simulation")?;

    model
        .metrics()
        .save(output)
        .with_context(|| format!("writing metrics to {}", output.display()))?;
    info!(rows = model.metrics().rows().len(), path = %output.display(), "metrics saved");

    if let Some(path) = snapshot {
        let snapshot = model.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot).context("encoding snapshot")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, json).with_context(|| format!("writing snapshot to {}", path.display()))?;
        info!(digest = %snapshot.digest_hex(), path = %path.display(), "snapshot saved");
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    // load validates
    let config = load_config(path)?;
    info!(
        steps = config.model.steps,
        seed = config.model.seed,
        households = config.households.count,
        firms = config.firms.count,
        self_employed = config.self_employed.count,
        tax_rate = config.tax.rate,
        "config ok"
    );
    Ok(())
}

fn cmd_split(total: Amount, weights: &[u64]) -> Result<()> {
    let parts = proportional_split(total, weights)?;
    let line: Vec<String> = parts.iter().map(ToString::to_string).collect();
    println!("{}", line.join(","));
    Ok(())
}

//==================== main ====================//

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            output,
            steps,
            seed,
            snapshot,
        } => cmd_run(&config, &output, steps, seed, snapshot.as_deref()),
        Command::Validate { config } => cmd_validate(&config),
        Command::Split { total, weights } => cmd_split(total, &weights),
    }
}
