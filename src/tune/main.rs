// src/tune/main.rs - Position-controller tuning console
use clap::Parser;
use stretch_factory::cli::TuneArgs;
use stretch_factory::config::{self, Config};
use stretch_factory::persistence::YamlParamStore;
use stretch_factory::tuning::{self, TuningSnapshot};
use stretch_shared::{CalibratableJoint, MotionLimits};
use stretch_simulator::SimulatedJoint;
use tokio::io::BufReader;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = TuneArgs::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    config.validate()?;

    let kind = args.joint.kind();
    let joint = SimulatedJoint::homed(kind, config.simulation.joint(kind));
    let joint_name = joint.name().to_string();
    let (min, max) = joint.trajectory_range();
    let targets = config.battery.idle_positions.map(|p| p.clamp(min, max));
    let initial = TuningSnapshot::new(joint.gains().clone(), MotionLimits::default(), targets);

    let mut store = YamlParamStore::open(&config.params.path)?;
    let (tx, rx) = watch::channel(initial);
    let cycle = tokio::spawn(tuning::run_cycle_task(joint, rx));

    let mut stdin = BufReader::new(tokio::io::stdin());
    let last = tuning::run_console(&mut stdin, tx, &mut store, &joint_name).await?;

    let (_joint, cycles) = cycle.await??;
    tracing::info!(cycles, gains = ?last.gains, "Tuning finished");
    Ok(())
}
