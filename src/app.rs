// src/app.rs - One invocation of the calibration tool, from homing to parameter write-back
use crate::battery::{idle_until_voltage, voltage_targets};
use crate::calibration::executor::{ExecutorSettings, MotionExecutor};
use crate::calibration::limits::DynamicLimits;
use crate::calibration::session::{CalibrationSession, SessionReport};
use crate::cli::{CalibrateArgs, CalibrationMode};
use crate::config::Config;
use crate::console;
use crate::effort::{EffortSweepResults, run_effort_sweep, write_contact_thresholds};
use crate::error::CalibrationError;
use crate::persistence::{ParamStore, SnapshotRecorder, YamlParamStore};
use chrono::Utc;
use std::path::PathBuf;
use stretch_shared::{BatteryInfo, BatteryMonitor, CalibratableJoint, MotionProfile};
use tokio::io::AsyncBufRead;

/// What the operator asked for on the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: CalibrationMode,
    pub profile: MotionProfile,
    pub ncycle: usize,
    pub skip_homing: bool,
    pub run_until_battery_low: bool,
    pub assume_yes: bool,
}

impl From<&CalibrateArgs> for RunOptions {
    fn from(args: &CalibrateArgs) -> Self {
        Self {
            mode: args.mode(),
            profile: args.profile,
            ncycle: args.ncycle,
            skip_homing: args.skip_homing,
            run_until_battery_low: args.run_continuously_until_battery_low,
            assume_yes: args.yes,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunResult {
    DynamicLimits {
        report: SessionReport,
        limits: Vec<DynamicLimits>,
    },
    TrajectoryEffort(EffortSweepResults),
}

/// One calibration pass and where its data went
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub battery: BatteryInfo,
    pub result: RunResult,
    /// Whether the parameter file was updated
    pub params_written: bool,
}

/// Home (unless skipped), confirm the range of motion, then calibrate once or once per
/// voltage step.
pub async fn run<J, B, R>(
    joint: &mut J,
    battery: &mut B,
    config: &Config,
    options: &RunOptions,
    input: &mut R,
) -> Result<Vec<RunOutcome>, CalibrationError>
where
    J: CalibratableJoint + ?Sized,
    B: BatteryMonitor + ?Sized,
    R: AsyncBufRead + Unpin,
{
    ensure_homed(joint, options, input).await?;

    let prompt = format!(
        "Joint {} will go through its full range of motion. Ensure the workspace is collision free. Proceed?",
        joint.name()
    );
    if !console::confirm(input, &prompt, options.assume_yes).await? {
        return Err(CalibrationError::Aborted);
    }

    if !options.run_until_battery_low {
        return Ok(vec![calibrate(joint, battery, config, options, input).await?]);
    }

    let start = BatteryInfo::read(battery).await?;
    let targets = voltage_targets(
        start.battery_voltage,
        config.battery.low_voltage,
        config.battery.voltage_step,
    );
    tracing::info!(
        ?targets,
        current = start.battery_voltage,
        "Running continuously until battery low"
    );

    let settings = ExecutorSettings::from(&config.calibration);
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        idle_until_voltage(
            joint,
            battery,
            target,
            &config.battery,
            settings.runstop_poll_interval,
            settings.positioning_timeout,
        )
        .await?;
        tracing::info!(target, "Target battery voltage reached, starting calibration");
        outcomes.push(calibrate(joint, battery, config, options, input).await?);
    }
    Ok(outcomes)
}

async fn ensure_homed<J, R>(
    joint: &mut J,
    options: &RunOptions,
    input: &mut R,
) -> Result<(), CalibrationError>
where
    J: CalibratableJoint + ?Sized,
    R: AsyncBufRead + Unpin,
{
    if !options.skip_homing {
        let prompt = format!(
            "Joint {} will be homed first. Ensure the workspace is collision free. Proceed?",
            joint.name()
        );
        if !console::confirm(input, &prompt, options.assume_yes).await? {
            return Err(CalibrationError::Aborted);
        }
        joint.home().await?;
    }
    if !joint.is_calibrated().await? {
        return Err(CalibrationError::NotHomed {
            joint: joint.name().to_string(),
        });
    }
    Ok(())
}

/// `<robot>_<unix millis>`, unique per pass
pub fn run_label(config: &Config) -> String {
    let robot = config.calibration.robot_name.as_deref().unwrap_or("stretch");
    format!("{robot}_{}", Utc::now().timestamp_millis())
}

async fn calibrate<J, B, R>(
    joint: &mut J,
    battery: &mut B,
    config: &Config,
    options: &RunOptions,
    input: &mut R,
) -> Result<RunOutcome, CalibrationError>
where
    J: CalibratableJoint + ?Sized,
    B: BatteryMonitor + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let info = BatteryInfo::read(battery).await?;
    tracing::info!("{info}");
    let recorder = SnapshotRecorder::create(&config.calibration.output_dir, &run_label(config))?
        .with_battery(info);
    let joint_name = joint.name().to_string();

    match options.mode {
        CalibrationMode::DynamicLimits => {
            let report = CalibrationSession::new(joint, config, &recorder).run().await?;
            let limits = report.dynamic_limits();
            recorder.write_json("dynamic_limits", &limits)?;
            println!("{}", console::limits_overview(&joint_name, &limits));

            let prompt = format!("Write these limits to {}?", config.params.path);
            let params_written = console::confirm(input, &prompt, options.assume_yes).await?;
            if params_written {
                let mut store = YamlParamStore::open(&config.params.path)?;
                for limit in &limits {
                    limit.write_to(&joint_name, &mut store)?;
                }
                store.save()?;
            }
            Ok(RunOutcome {
                run_dir: recorder.run_dir().to_path_buf(),
                battery: info,
                result: RunResult::DynamicLimits { report, limits },
                params_written,
            })
        }
        CalibrationMode::TrajectoryEffort => {
            let executor = MotionExecutor::new((&config.calibration).into());
            let targets = config.targets.for_profile(options.profile);
            let results = run_effort_sweep(
                joint,
                &executor,
                &targets,
                options.profile,
                options.ncycle,
                config.calibration.min_position_offset_m,
                &config.contact,
            )
            .await?;
            recorder.write_json(&format!("{joint_name}_effort_sweep"), &results)?;

            let [neg, pos] = results.contact_thresh_proposed;
            println!(
                "Proposed contact_thresh_default for {joint_name}: [{neg}, {pos}] (max {} %, min {} %)",
                results.max_effort_pct_pos, results.min_effort_pct_neg
            );
            let prompt = format!("Write contact thresholds to {}?", config.params.path);
            let params_written = console::confirm(input, &prompt, options.assume_yes).await?;
            if params_written {
                let mut store = YamlParamStore::open(&config.params.path)?;
                write_contact_thresholds(&joint_name, results.contact_thresh_proposed, &mut store)?;
                store.save()?;
            }
            Ok(RunOutcome {
                run_dir: recorder.run_dir().to_path_buf(),
                battery: info,
                result: RunResult::TrajectoryEffort(results),
                params_written,
            })
        }
    }
}
