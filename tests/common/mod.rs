// Shared helpers for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use stretch_factory::calibration::{CalibrationTargets, SafetyStop, TrialRecord, TrialResult};
use stretch_shared::{
    CalibratableJoint, JointError, JointKind, MotionProfile, MotionSample, Trajectory,
};

pub fn sample(timestamp: f64, position: f64, effort: f64) -> MotionSample {
    MotionSample {
        timestamp,
        position,
        velocity: 0.0,
        effort_pct: vec![effort],
        current: vec![effort * 0.03],
    }
}

/// A finished trial from `start_m` to `goal_m` that ended at `actual_m`, with one sample
/// per effort value.
pub fn record(
    duration: f64,
    start_m: f64,
    goal_m: f64,
    actual_m: f64,
    efforts: &[f64],
) -> TrialRecord {
    let trajectory =
        Trajectory::spanning(start_m, goal_m, duration, MotionProfile::Linear).unwrap();
    let n = efforts.len().max(1);
    let samples = efforts
        .iter()
        .enumerate()
        .map(|(i, &e)| {
            let position = if i + 1 == n {
                actual_m
            } else {
                start_m + (goal_m - start_m) * (i + 1) as f64 / n as f64
            };
            sample(duration * (i + 1) as f64 / n as f64, position, e)
        })
        .collect();
    TrialRecord::new(trajectory, samples)
}

/// Trial that reaches its goal with low effort.
pub fn good_trial(duration: f64, effort: f64, targets: &CalibrationTargets) -> TrialResult {
    TrialResult::new(record(duration, 0.1, 0.5, 0.5, &[effort]), targets).unwrap()
}

/// Trial that misses its goal by 5 cm.
pub fn bad_trial(duration: f64, targets: &CalibrationTargets) -> TrialResult {
    TrialResult::new(record(duration, 0.1, 0.5, 0.45, &[10.0]), targets).unwrap()
}

pub fn stopped_trial(
    duration: f64,
    stop: SafetyStop,
    targets: &CalibrationTargets,
) -> TrialResult {
    let record = record(duration, 0.1, 0.5, 0.3, &[10.0, 90.0]).stopped_for(stop);
    TrialResult::new(record, targets).unwrap()
}

/// Joint that replays a fixed list of samples while its trajectory is active. Outside a
/// trajectory it reports rest at the last commanded position.
#[derive(Debug, Default)]
pub struct ScriptedJoint {
    pub samples: VecDeque<MotionSample>,
    /// Runstop becomes active once this many samples have been taken
    pub runstop_after: Option<usize>,
    /// Runstop polls answered "still pressed" before release
    pub runstop_polls: usize,
    pub taken: usize,
    pub guarded: bool,
    pub guarded_changes: Vec<bool>,
    pub following: bool,
    pub stops: usize,
    pub safety_stops: usize,
    pub moves: Vec<f64>,
    pub position: f64,
}

impl ScriptedJoint {
    pub fn new(samples: Vec<MotionSample>) -> Self {
        Self {
            samples: samples.into(),
            guarded: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CalibratableJoint for ScriptedJoint {
    fn name(&self) -> &str {
        "arm"
    }

    fn kind(&self) -> JointKind {
        JointKind::Arm
    }

    fn trajectory_range(&self) -> (f64, f64) {
        (0.0, 0.52)
    }

    async fn set_trajectory(&mut self, _trajectory: &Trajectory) -> Result<(), JointError> {
        Ok(())
    }

    async fn follow_trajectory(&mut self) -> Result<(), JointError> {
        self.following = true;
        Ok(())
    }

    async fn is_trajectory_active(&mut self) -> Result<bool, JointError> {
        Ok(self.following && !self.samples.is_empty())
    }

    async fn stop_trajectory(&mut self) -> Result<(), JointError> {
        self.following = false;
        self.stops += 1;
        Ok(())
    }

    async fn sample(&mut self) -> Result<MotionSample, JointError> {
        if !self.following {
            return Ok(sample(0.0, self.position, 0.0));
        }
        self.taken += 1;
        match self.samples.pop_front() {
            Some(s) => {
                self.position = s.position;
                Ok(s)
            }
            None => Ok(sample(0.0, self.position, 0.0)),
        }
    }

    async fn enable_safety(&mut self) -> Result<(), JointError> {
        self.safety_stops += 1;
        Ok(())
    }

    async fn disable_guarded_mode(&mut self) -> Result<(), JointError> {
        self.guarded = false;
        self.guarded_changes.push(false);
        Ok(())
    }

    async fn enable_guarded_mode(&mut self) -> Result<(), JointError> {
        self.guarded = true;
        self.guarded_changes.push(true);
        Ok(())
    }

    async fn is_runstopped(&mut self) -> Result<bool, JointError> {
        match self.runstop_after {
            Some(n) if self.taken >= n => {
                if self.following {
                    return Ok(true);
                }
                if self.runstop_polls == 0 {
                    self.runstop_after = None;
                    return Ok(false);
                }
                self.runstop_polls -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_calibrated(&mut self) -> Result<bool, JointError> {
        Ok(true)
    }

    async fn home(&mut self) -> Result<(), JointError> {
        Ok(())
    }

    async fn move_to(&mut self, position: f64) -> Result<(), JointError> {
        self.moves.push(position);
        self.position = position;
        Ok(())
    }

    async fn is_at_setpoint(&mut self) -> Result<bool, JointError> {
        Ok(true)
    }
}
