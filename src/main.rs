// src/main.rs - Trajectory dynamic-limit calibration entry point
use clap::Parser;
use stretch_factory::app::{self, RunOptions, RunResult};
use stretch_factory::cli::CalibrateArgs;
use stretch_factory::config::{self, Config};
use stretch_simulator::{SimulatedBattery, SimulatedJoint};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = CalibrateArgs::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path.display(), e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => Config::default(),
    };
    config.validate()?;

    let kind = args.joint_kind();
    let mut joint = SimulatedJoint::new(kind, config.simulation.joint(kind));
    let mut battery = SimulatedBattery::new(config.simulation.battery.clone());
    tracing::info!("Calibrating {} ({:?})", kind, args.mode());

    let options = RunOptions::from(&args);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let outcomes = app::run(&mut joint, &mut battery, &config, &options, &mut stdin).await?;

    for outcome in &outcomes {
        match &outcome.result {
            RunResult::DynamicLimits { report, limits } => tracing::info!(
                trials = report.trial_count(),
                limits = limits.len(),
                written = outcome.params_written,
                "Data saved to {}",
                outcome.run_dir.display()
            ),
            RunResult::TrajectoryEffort(results) => tracing::info!(
                cycles = results.effort_pct_pos.len(),
                safety_stops = results.safety_stops,
                written = outcome.params_written,
                "Data saved to {}",
                outcome.run_dir.display()
            ),
        }
    }
    Ok(())
}
