// src/cli.rs - Command-line flags for the calibration and tuning binaries
use clap::{ArgGroup, Args, Parser};
use std::path::PathBuf;
use stretch_shared::{JointKind, MotionProfile};

/// Joint selection shared by both binaries
#[derive(Args, Debug, Clone, Copy)]
#[group(id = "joint", required = true, multiple = false)]
pub struct JointSelection {
    /// Calibrate the telescoping arm
    #[arg(long)]
    pub arm: bool,

    /// Calibrate the lift
    #[arg(long)]
    pub lift: bool,

    /// Calibrate the mobile base (translation)
    #[arg(long)]
    pub base: bool,
}

impl JointSelection {
    pub fn kind(&self) -> JointKind {
        if self.lift {
            JointKind::Lift
        } else if self.base {
            JointKind::Base
        } else {
            JointKind::Arm
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    /// Search the fastest travel duration per profile and direction
    DynamicLimits,
    /// Sweep full-range moves and propose guarded-contact thresholds
    TrajectoryEffort,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rex-calibrate-trajectory-limits")]
#[command(about = "Calibrate dynamic trajectory limits for a Stretch joint", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("mode").args(["dynamic_limit_mode", "trajectory_effort_mode"])))]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub joint: JointSelection,

    /// Find the dynamic limits of every profile (default)
    #[arg(long, alias = "dynamic_limit_mode")]
    pub dynamic_limit_mode: bool,

    /// Measure effort over repeated moves of one profile
    #[arg(long, alias = "trajectory_effort_mode")]
    pub trajectory_effort_mode: bool,

    /// Effort sweep cycles
    #[arg(long, default_value_t = 4)]
    pub ncycle: usize,

    /// Profile used by the effort sweep (linear, cubic, quintic)
    #[arg(long, default_value = "linear")]
    pub profile: MotionProfile,

    /// Do not home the joint before starting
    #[arg(long, alias = "skip_homing")]
    pub skip_homing: bool,

    /// Repeat the calibration at decreasing battery voltages
    #[arg(long, alias = "run_continuously_until_battery_low")]
    pub run_continuously_until_battery_low: bool,

    /// Path to calibration.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Answer yes to every prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CalibrateArgs {
    pub fn joint_kind(&self) -> JointKind {
        self.joint.kind()
    }

    pub fn mode(&self) -> CalibrationMode {
        if self.trajectory_effort_mode {
            CalibrationMode::TrajectoryEffort
        } else {
            CalibrationMode::DynamicLimits
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rex-tune-ctrl")]
#[command(about = "Interactively tune a joint's position controller", long_about = None)]
pub struct TuneArgs {
    #[command(flatten)]
    pub joint: JointSelection,

    /// Path to calibration.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}
