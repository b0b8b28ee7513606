//! # Calibration Configuration
//!
//! Every section and field is optional; anything left out falls back to the factory
//! defaults used on the production line.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [calibration]
//! sampling_interval_ms = 100
//! settle_time_ms = 2000
//! output_dir = "calibration_trajectory_dynamic_limits"
//!
//! [targets.quintic]
//! effort_percent_target = 70.0
//! goal_error_absolute_target_cm = 1.0
//! goal_error_percentage_target = 30.0
//! travel_duration_start_seconds = 15.0
//! travel_duration_decrement_by_max_seconds = 0.9
//!
//! [search]
//! end_condition_time_step = 0.3
//! max_trials = 40
//!
//! [contact]
//! margin_pct = 10.0
//! ```
//!
//! - `[simulation.arm]`, `[simulation.lift]` and `[simulation.base]` replace the whole
//!   simulated joint model, so every field must be given.
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use stretch_factory::config::Config;
//! let config: Config = toml::from_str("[search]\nmax_trials = 20").unwrap();
//! assert_eq!(config.search.max_trials, 20);
//! assert_eq!(config.search.end_condition_time_step, 0.3);
//! assert!(config.validate().is_ok());
//! ```

// src/config.rs - Single configuration file
use crate::calibration::targets::{CalibrationTargets, SearchPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stretch_shared::{JointKind, MotionProfile};
use stretch_simulator::{SimBatteryParams, SimJointParams};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the calibration and tuning tools.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub search: SearchPolicy,
    #[serde(default)]
    pub contact: ContactConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate().map_err(ConfigError::Invalid)?;
        for profile in MotionProfile::ALL {
            self.targets
                .for_profile(profile)
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("targets.{profile}: {e}")))?;
        }
        self.search
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("search: {e}")))?;
        self.contact.validate().map_err(ConfigError::Invalid)?;
        self.battery.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

/// Trial timing and run output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    #[serde(default = "default_settle_time_ms")]
    pub settle_time_ms: u64,
    #[serde(default = "default_runstop_poll_interval_ms")]
    pub runstop_poll_interval_ms: u64,
    #[serde(default = "default_positioning_timeout_ms")]
    pub positioning_timeout_ms: u64,
    /// Trials keep this far clear of the lower end of travel (m)
    #[serde(default = "default_min_position_offset_m")]
    pub min_position_offset_m: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub robot_name: Option<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: default_sampling_interval_ms(),
            settle_time_ms: default_settle_time_ms(),
            runstop_poll_interval_ms: default_runstop_poll_interval_ms(),
            positioning_timeout_ms: default_positioning_timeout_ms(),
            min_position_offset_m: default_min_position_offset_m(),
            output_dir: default_output_dir(),
            robot_name: None,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sampling_interval_ms == 0 {
            return Err("sampling_interval_ms must be > 0".to_string());
        }
        if self.runstop_poll_interval_ms == 0 {
            return Err("runstop_poll_interval_ms must be > 0".to_string());
        }
        if self.min_position_offset_m < 0.0 {
            return Err("min_position_offset_m must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Per-profile acceptance thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetsConfig {
    #[serde(default = "CalibrationTargets::linear")]
    pub linear: CalibrationTargets,
    #[serde(default = "CalibrationTargets::cubic")]
    pub cubic: CalibrationTargets,
    #[serde(default = "CalibrationTargets::quintic")]
    pub quintic: CalibrationTargets,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            linear: CalibrationTargets::linear(),
            cubic: CalibrationTargets::cubic(),
            quintic: CalibrationTargets::quintic(),
        }
    }
}

impl TargetsConfig {
    pub fn for_profile(&self, profile: MotionProfile) -> CalibrationTargets {
        match profile {
            MotionProfile::Linear => self.linear,
            MotionProfile::Cubic => self.cubic,
            MotionProfile::Quintic => self.quintic,
        }
    }
}

/// Guarded-contact threshold proposal used by the effort sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContactConfig {
    /// Headroom added beyond the observed efforts (%)
    #[serde(default = "default_contact_margin_pct")]
    pub margin_pct: f64,
    /// Hard bounds `[negative, positive]` for proposed thresholds (%)
    #[serde(default = "default_contact_thresh_max")]
    pub thresh_max: [f64; 2],
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            margin_pct: default_contact_margin_pct(),
            thresh_max: default_contact_thresh_max(),
        }
    }
}

impl ContactConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.margin_pct < 0.0 {
            return Err("contact.margin_pct must be >= 0".to_string());
        }
        if self.thresh_max[0] >= 0.0 || self.thresh_max[1] <= 0.0 {
            return Err("contact.thresh_max must be [negative, positive]".to_string());
        }
        Ok(())
    }
}

/// Battery-aware continuous mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatteryConfig {
    #[serde(default = "default_low_voltage")]
    pub low_voltage: f64,
    #[serde(default = "default_voltage_step")]
    pub voltage_step: f64,
    /// Positions the joint idles between while the pack drains (m)
    #[serde(default = "default_idle_positions")]
    pub idle_positions: [f64; 2],
    #[serde(default = "default_idle_pause_ms")]
    pub idle_pause_ms: u64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            low_voltage: default_low_voltage(),
            voltage_step: default_voltage_step(),
            idle_positions: default_idle_positions(),
            idle_pause_ms: default_idle_pause_ms(),
        }
    }
}

impl BatteryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.voltage_step <= 0.0 {
            return Err("battery.voltage_step must be > 0".to_string());
        }
        if self.low_voltage <= 0.0 {
            return Err("battery.low_voltage must be > 0".to_string());
        }
        Ok(())
    }
}

/// Location of the robot's parameter file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParamsConfig {
    #[serde(default = "default_params_path")]
    pub path: String,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self { path: default_params_path() }
    }
}

/// Simulated hardware used when no robot transport is attached.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "SimJointParams::arm")]
    pub arm: SimJointParams,
    #[serde(default = "SimJointParams::lift")]
    pub lift: SimJointParams,
    #[serde(default = "SimJointParams::base")]
    pub base: SimJointParams,
    #[serde(default)]
    pub battery: SimBatteryParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arm: SimJointParams::arm(),
            lift: SimJointParams::lift(),
            base: SimJointParams::base(),
            battery: SimBatteryParams::default(),
        }
    }
}

impl SimulationConfig {
    pub fn joint(&self, kind: JointKind) -> SimJointParams {
        match kind {
            JointKind::Arm => self.arm.clone(),
            JointKind::Lift => self.lift.clone(),
            JointKind::Base => self.base.clone(),
        }
    }
}

// Default value functions
fn default_sampling_interval_ms() -> u64 { 100 }
fn default_settle_time_ms() -> u64 { 2000 }
fn default_runstop_poll_interval_ms() -> u64 { 3000 }
fn default_positioning_timeout_ms() -> u64 { 20_000 }
fn default_min_position_offset_m() -> f64 { 0.1 }
fn default_output_dir() -> String { "calibration_trajectory_dynamic_limits".to_string() }
fn default_contact_margin_pct() -> f64 { 10.0 }
fn default_contact_thresh_max() -> [f64; 2] { [-100.0, 100.0] }
fn default_low_voltage() -> f64 { 11.0 }
fn default_voltage_step() -> f64 { 0.5 }
fn default_idle_positions() -> [f64; 2] { [0.2, 0.4] }
fn default_idle_pause_ms() -> u64 { 5000 }
fn default_params_path() -> String { "stretch_configuration_params.yaml".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.calibration.sampling_interval_ms, 100);
        assert_eq!(config.calibration.settle_time_ms, 2000);
        assert_eq!(config.calibration.min_position_offset_m, 0.1);
        assert_eq!(config.targets.quintic.travel_duration_start_seconds, 15.0);
        assert_eq!(config.search.max_trials, 40);
        assert_eq!(config.battery.low_voltage, 11.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("calibration.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[calibration]\nsettle_time_ms = 500\n\n[search]\nend_condition_time_step = 0.2\n\n[simulation.battery]\nstart_voltage = 12.0"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.calibration.settle_time_ms, 500);
        assert_eq!(config.search.end_condition_time_step, 0.2);
        assert_eq!(config.simulation.battery.start_voltage, 12.0);
        assert_eq!(config.simulation.battery.drain_per_read_v, 0.05);
        // Defaults for missing fields
        assert_eq!(config.calibration.sampling_interval_ms, 100);
        assert_eq!(config.search.safety_backoff_fraction, 0.25);
        assert_eq!(config.targets.linear, CalibrationTargets::linear());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        std::fs::write(&file_path, "[search\nmax_trials = ").unwrap();
        assert!(matches!(load_config(&file_path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_bad_contact_bounds() {
        let mut config = Config::default();
        config.contact.thresh_max = [10.0, 100.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
