//! CEAM Run - executes the screening model over one or many input draws.
//!
//! Loads a JSON simulation specification, runs one simulation per input
//! draw in parallel, and writes each draw's results CSVs under its own
//! subdirectory. Draw `n` folds `n` into the configured seed, so the draws
//! are independent but individually reproducible.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ceam_framework::{run_simulation, Component, ConfigTree};
use ceam_modules::{
    BloodPressure, CostLedger, DeathObserver, Demographics, HealthcareAccess,
    OpportunisticScreening,
};

#[derive(Parser, Debug)]
#[command(name = "ceam-run")]
#[command(about = "Run the CEAM blood-pressure screening model")]
struct Cli {
    /// Path to a JSON simulation specification
    spec: PathBuf,

    /// Directory for results, one subdirectory per draw
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Number of input draws to run in parallel
    #[arg(long, default_value = "1")]
    draws: u64,

    /// Override the specification's random seed
    #[arg(long)]
    seed: Option<u64>,
}

/// The `configuration` block of a simulation specification file.
fn load_configuration(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading specification {}", path.display()))?;
    let spec: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing specification {}", path.display()))?;
    match spec.get("configuration") {
        Some(configuration @ Value::Object(_)) => Ok(configuration.clone()),
        Some(_) => bail!("specification 'configuration' is not an object"),
        None => bail!("specification has no 'configuration' block"),
    }
}

/// The configuration for one draw: the specification plus the draw number
/// and any seed override.
fn draw_configuration(
    configuration: &Value,
    seed: Option<u64>,
    draw: u64,
    source: &str,
) -> Result<ConfigTree> {
    let mut configuration = configuration.clone();
    let randomness = configuration
        .as_object_mut()
        .context("configuration is not an object")?
        .entry("randomness")
        .or_insert_with(|| Value::Object(Default::default()));
    let randomness = randomness
        .as_object_mut()
        .context("configuration 'randomness' is not an object")?;
    randomness.insert("input_draw".to_string(), Value::from(draw));
    if let Some(seed) = seed {
        randomness.insert("seed".to_string(), Value::from(seed));
    }
    Ok(ConfigTree::from_overrides(configuration, source)?)
}

fn model_components(healthcare: &CostLedger, screening: &CostLedger) -> Vec<Box<dyn Component>> {
    vec![
        Box::new(Demographics::new()),
        Box::new(BloodPressure::new()),
        Box::new(HealthcareAccess::new(healthcare.clone())),
        Box::new(OpportunisticScreening::new(screening.clone())),
        Box::new(DeathObserver::new()),
    ]
}

fn run_draw(cli: &Cli, configuration: &Value, draw: u64) -> Result<()> {
    let source = cli.spec.display().to_string();
    let config = draw_configuration(configuration, cli.seed, draw, &source)?;
    let results_dir = cli.results_dir.join(format!("draw_{draw}"));

    let healthcare = CostLedger::new();
    let screening = CostLedger::new();
    run_simulation(
        config,
        model_components(&healthcare, &screening),
        Some(&results_dir),
    )
    .with_context(|| format!("draw {draw}"))?;

    info!(
        draw,
        healthcare_cost = healthcare.total(),
        screening_cost = screening.total(),
        results = %results_dir.display(),
        "draw complete"
    );
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ceam=info,ceam_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let configuration = match load_configuration(&cli.spec) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load specification: {e:#}");
            std::process::exit(1);
        }
    };

    info!(
        spec = %cli.spec.display(),
        draws = cli.draws,
        results = %cli.results_dir.display(),
        "starting"
    );

    let failures: Vec<_> = (0..cli.draws)
        .into_par_iter()
        .filter_map(|draw| run_draw(&cli, &configuration, draw).err())
        .collect();
    if !failures.is_empty() {
        for failure in &failures {
            error!("{failure:#}");
        }
        std::process::exit(1);
    }
}
