// src/lib.rs - Stretch factory calibration tools
pub mod app;
pub mod battery;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod console;
pub mod effort;
pub mod error;
pub mod persistence;
pub mod tuning;

pub use calibration::{
    CalibrationSession, CalibrationState, CalibrationTargets, Direction, DynamicLimits,
    MotionExecutor, SearchPolicy, TrialResult, Verdict,
};
pub use config::{Config, ConfigError, load_config};
pub use error::CalibrationError;
