// src/calibration/targets.rs - Acceptance thresholds and search tuning
use serde::{Deserialize, Serialize};
use std::fmt;
use stretch_shared::MotionProfile;

/// Thresholds a trial must stay under to count as GOOD, plus the duration schedule
/// used while no trial has failed yet.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CalibrationTargets {
    /// Largest allowed |effort| during the trial (%)
    pub effort_percent_target: f64,
    /// Largest allowed distance between goal and final position (cm)
    pub goal_error_absolute_target_cm: f64,
    /// Largest allowed final error relative to the goal position (%)
    pub goal_error_percentage_target: f64,
    /// Duration of the first trial (s)
    pub travel_duration_start_seconds: f64,
    /// Largest step between consecutive durations before the first failure (s)
    pub travel_duration_decrement_by_max_seconds: f64,
}

impl CalibrationTargets {
    pub fn linear() -> Self {
        Self {
            effort_percent_target: 80.0,
            goal_error_absolute_target_cm: 1.5,
            goal_error_percentage_target: 30.0,
            travel_duration_start_seconds: 10.0,
            travel_duration_decrement_by_max_seconds: 1.5,
        }
    }

    pub fn cubic() -> Self {
        Self {
            travel_duration_decrement_by_max_seconds: 0.9,
            ..Self::linear()
        }
    }

    pub fn quintic() -> Self {
        Self {
            travel_duration_start_seconds: 15.0,
            travel_duration_decrement_by_max_seconds: 0.9,
            ..Self::linear()
        }
    }

    pub fn for_profile(profile: MotionProfile) -> Self {
        match profile {
            MotionProfile::Linear => Self::linear(),
            MotionProfile::Cubic => Self::cubic(),
            MotionProfile::Quintic => Self::quintic(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.effort_percent_target <= 0.0 {
            return Err("effort_percent_target must be > 0".to_string());
        }
        if self.goal_error_absolute_target_cm <= 0.0 || self.goal_error_percentage_target <= 0.0 {
            return Err("goal error targets must be > 0".to_string());
        }
        if self.travel_duration_start_seconds <= 0.0 {
            return Err("travel_duration_start_seconds must be > 0".to_string());
        }
        if self.travel_duration_decrement_by_max_seconds <= 0.0 {
            return Err("travel_duration_decrement_by_max_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// Tuning of the duration search shared by every profile
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SearchPolicy {
    #[serde(default = "default_decrement_min")]
    pub travel_duration_decrement_by_min_seconds: f64,
    /// Converge once the next bisection step would be shorter than this (s)
    #[serde(default = "default_end_condition_time_step")]
    pub end_condition_time_step: f64,
    /// Share of the bracket kept back from a bound that tripped the effort safety stop
    #[serde(default = "default_safety_backoff_fraction")]
    pub safety_backoff_fraction: f64,
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            travel_duration_decrement_by_min_seconds: default_decrement_min(),
            end_condition_time_step: default_end_condition_time_step(),
            safety_backoff_fraction: default_safety_backoff_fraction(),
            max_trials: default_max_trials(),
        }
    }
}

impl SearchPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.travel_duration_decrement_by_min_seconds <= 0.0 {
            return Err("travel_duration_decrement_by_min_seconds must be > 0".to_string());
        }
        if self.end_condition_time_step <= 0.0 {
            return Err("end_condition_time_step must be > 0".to_string());
        }
        if !(0.0..0.5).contains(&self.safety_backoff_fraction) {
            return Err("safety_backoff_fraction must be in [0, 0.5)".to_string());
        }
        if self.max_trials == 0 {
            return Err("max_trials must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Direction of travel across the joint range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Trial order within a profile.
    pub const ALL: [Direction; 2] = [Direction::Positive, Direction::Negative];

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }

    /// `(start, goal)` for a move across `range`, keeping `min_offset` clear of the lower stop.
    pub fn endpoints(&self, range: (f64, f64), min_offset: f64) -> (f64, f64) {
        let (low, high) = (range.0 + min_offset, range.1);
        match self {
            Direction::Positive => (low, high),
            Direction::Negative => (high, low),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_decrement_min() -> f64 { 0.1 }
fn default_end_condition_time_step() -> f64 { 0.3 }
fn default_safety_backoff_fraction() -> f64 { 0.25 }
fn default_max_trials() -> usize { 40 }
