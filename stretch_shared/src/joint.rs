// Trait-based joint interfaces used by the calibration tools (shared)

use crate::trajectory::Trajectory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JointError {
    #[error("Joint not connected: {0}")]
    NotConnected(String),
    #[error("Command rejected: {0}")]
    CommandRejected(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    Arm,
    Lift,
    Base,
}

impl JointKind {
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Arm => "arm",
            JointKind::Lift => "lift",
            JointKind::Base => "base",
        }
    }

    /// Motors reporting effort for this joint. The base reports `[left, right]` wheels.
    pub fn motor_count(&self) -> usize {
        match self {
            JointKind::Base => 2,
            JointKind::Arm | JointKind::Lift => 1,
        }
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One telemetry observation taken while a trajectory runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Seconds on the joint's monotonic clock
    pub timestamp: f64,

    /// Joint position (m)
    pub position: f64,

    /// Joint velocity (m/s)
    pub velocity: f64,

    /// Effort per motor as a percentage of the motor's rated effort
    pub effort_pct: Vec<f64>,

    /// Motor current per motor (A)
    pub current: Vec<f64>,
}

impl MotionSample {
    /// Largest effort magnitude across all motors.
    pub fn max_abs_effort(&self) -> f64 {
        self.effort_pct.iter().fold(0.0, |max, e| max.max(e.abs()))
    }

    /// The effort with the largest magnitude, sign preserved.
    pub fn dominant_effort(&self) -> f64 {
        self.effort_pct
            .iter()
            .copied()
            .fold(0.0, |best, e| if e.abs() > best.abs() { e } else { best })
    }
}

/// Position controller gains, named after the firmware parameters they map to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorGains {
    /// pKp_d
    pub pos_kp: f64,
    /// pKi_d
    pub pos_ki: f64,
    /// pKd_d
    pub pos_kd: f64,
    /// pKi_limit
    pub pos_ki_limit: f64,
    /// pLPF
    pub pos_lpf: f64,
    /// phase_advance_d
    pub phase_advance: f64,
    /// iMax_pos
    pub i_max_pos: f64,
    /// iMax_neg
    pub i_max_neg: f64,
}

impl Default for MotorGains {
    fn default() -> Self {
        Self {
            pos_kp: 6.0,
            pos_ki: 0.05,
            pos_kd: 20.0,
            pos_ki_limit: 100.0,
            pos_lpf: 100.0,
            phase_advance: 1.8,
            i_max_pos: 3.0,
            i_max_neg: -3.0,
        }
    }
}

/// Motion limits applied alongside gains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionLimits {
    pub vel_m: f64,
    pub accel_m: f64,
    pub stiffness: f64,
    pub i_feedforward: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            vel_m: 0.1,
            accel_m: 0.2,
            stiffness: 1.0,
            i_feedforward: 0.0,
        }
    }
}

/// A joint that can be driven through trajectories and sampled for effort.
///
/// Implementations wrap the robot's transport (or the simulator). Every command is a
/// suspension point; errors surface as [`JointError`] and are never retried here.
#[async_trait]
pub trait CalibratableJoint: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> JointKind;
    /// Usable travel `(min, max)` in meters.
    fn trajectory_range(&self) -> (f64, f64);

    async fn set_trajectory(&mut self, trajectory: &Trajectory) -> Result<(), JointError>;
    async fn follow_trajectory(&mut self) -> Result<(), JointError>;
    async fn is_trajectory_active(&mut self) -> Result<bool, JointError>;
    async fn stop_trajectory(&mut self) -> Result<(), JointError>;
    /// Pull fresh status from the joint and return it as a sample.
    async fn sample(&mut self) -> Result<MotionSample, JointError>;

    /// Immediate stop after an effort excursion.
    async fn enable_safety(&mut self) -> Result<(), JointError>;
    async fn disable_guarded_mode(&mut self) -> Result<(), JointError>;
    async fn enable_guarded_mode(&mut self) -> Result<(), JointError>;
    async fn is_runstopped(&mut self) -> Result<bool, JointError>;

    async fn is_calibrated(&mut self) -> Result<bool, JointError>;
    async fn home(&mut self) -> Result<(), JointError>;
    async fn move_to(&mut self, position: f64) -> Result<(), JointError>;
    async fn is_at_setpoint(&mut self) -> Result<bool, JointError>;
}

/// A joint whose position controller can be retuned while it runs.
#[async_trait]
pub trait TunableMotor: CalibratableJoint {
    async fn apply_gains(
        &mut self,
        gains: &MotorGains,
        limits: &MotionLimits,
    ) -> Result<(), JointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_effort_keeps_sign_of_largest_motor() {
        let sample = MotionSample {
            timestamp: 0.0,
            position: 0.0,
            velocity: 0.0,
            effort_pct: vec![12.0, -40.0],
            current: vec![0.4, 1.2],
        };
        assert_eq!(sample.max_abs_effort(), 40.0);
        assert_eq!(sample.dominant_effort(), -40.0);
    }
}
