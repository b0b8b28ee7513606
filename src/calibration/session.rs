// src/calibration/session.rs - Calibrates every profile in both directions for one joint
use crate::calibration::controller::{CalibrationState, Transition};
use crate::calibration::evaluator::TrialResult;
use crate::calibration::executor::MotionExecutor;
use crate::calibration::limits::DynamicLimits;
use crate::calibration::targets::{Direction, SearchPolicy};
use crate::config::{Config, TargetsConfig};
use crate::console;
use crate::error::CalibrationError;
use crate::persistence::SnapshotRecorder;
use serde::{Deserialize, Serialize};
use stretch_shared::{CalibratableJoint, JointKind, MotionProfile, Trajectory};

/// Both directions of one profile, converged
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileCalibration {
    pub profile: MotionProfile,
    pub positive: CalibrationState,
    pub negative: CalibrationState,
}

impl ProfileCalibration {
    pub fn states(&self) -> [&CalibrationState; 2] {
        [&self.positive, &self.negative]
    }

    pub fn dynamic_limits(&self) -> Vec<DynamicLimits> {
        self.states()
            .into_iter()
            .filter_map(DynamicLimits::from_state)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionReport {
    pub joint: String,
    pub kind: JointKind,
    pub profiles: Vec<ProfileCalibration>,
}

impl SessionReport {
    pub fn dynamic_limits(&self) -> Vec<DynamicLimits> {
        self.profiles.iter().flat_map(|p| p.dynamic_limits()).collect()
    }

    pub fn trial_count(&self) -> usize {
        self.profiles
            .iter()
            .flat_map(|p| p.states())
            .map(|s| s.history().len())
            .sum()
    }
}

/// Runs the duration search for one joint.
///
/// Trials alternate between the positive and negative direction so every trial starts
/// where the previous one ended. A direction that has converged is skipped while the
/// other keeps searching.
pub struct CalibrationSession<'a, J: CalibratableJoint + ?Sized> {
    joint: &'a mut J,
    executor: MotionExecutor,
    targets: TargetsConfig,
    policy: SearchPolicy,
    min_position_offset_m: f64,
    recorder: &'a SnapshotRecorder,
}

impl<'a, J: CalibratableJoint + ?Sized> CalibrationSession<'a, J> {
    pub fn new(joint: &'a mut J, config: &Config, recorder: &'a SnapshotRecorder) -> Self {
        Self {
            joint,
            executor: MotionExecutor::new((&config.calibration).into()),
            targets: config.targets.clone(),
            policy: config.search,
            min_position_offset_m: config.calibration.min_position_offset_m,
            recorder,
        }
    }

    /// Linear, cubic and quintic in that order.
    pub async fn run(&mut self) -> Result<SessionReport, CalibrationError> {
        self.run_profiles(&MotionProfile::ALL).await
    }

    pub async fn run_profiles(
        &mut self,
        profiles: &[MotionProfile],
    ) -> Result<SessionReport, CalibrationError> {
        let mut report = SessionReport {
            joint: self.joint.name().to_string(),
            kind: self.joint.kind(),
            profiles: Vec::with_capacity(profiles.len()),
        };
        for &profile in profiles {
            report.profiles.push(self.run_profile(profile).await?);
        }
        tracing::info!(
            joint = %report.joint,
            trials = report.trial_count(),
            "Calibration session complete"
        );
        Ok(report)
    }

    pub async fn run_profile(
        &mut self,
        profile: MotionProfile,
    ) -> Result<ProfileCalibration, CalibrationError> {
        let targets = self.targets.for_profile(profile);
        let joint_name = self.joint.name().to_string();
        tracing::info!(joint = %joint_name, %profile, "Calibrating profile");

        let mut states = Direction::ALL.map(|d| CalibrationState::new(profile, d, targets));
        while states.iter().any(|s| !s.is_converged()) {
            for state in states.iter_mut().filter(|s| !s.is_converged()) {
                state.ensure_trial_budget(&self.policy)?;
                let trajectory = self.trajectory_for(state)?;
                let record = self
                    .executor
                    .run_trial(&mut *self.joint, &trajectory, &targets)
                    .await?;
                let trial = TrialResult::new(record, &targets)?;

                let direction = state.direction();
                let current =
                    std::mem::replace(state, CalibrationState::new(profile, direction, targets));
                let (next, transition) = match current.advance(&self.policy, trial.clone()) {
                    Ok(advanced) => advanced,
                    Err(e) => {
                        if let Err(save) = self.recorder.record_aborted(&joint_name, state, trial) {
                            tracing::warn!("Failed to snapshot the rejected trial: {save}");
                        }
                        return Err(e);
                    }
                };
                *state = next;

                if let Some(entry) = state.latest() {
                    println!("{}", console::motion_overview(&joint_name, state, entry));
                }
                tracing::info!("{}", console::transition_message(state, transition));
                self.recorder.record_trial(&joint_name, state)?;
                if transition == Transition::Converged {
                    self.recorder.record_optimal(&joint_name, state)?;
                }
            }
        }

        let [positive, negative] = states;
        Ok(ProfileCalibration {
            profile,
            positive,
            negative,
        })
    }

    fn trajectory_for(&self, state: &CalibrationState) -> Result<Trajectory, CalibrationError> {
        let (start, goal) = state
            .direction()
            .endpoints(self.joint.trajectory_range(), self.min_position_offset_m);
        Ok(Trajectory::spanning(
            start,
            goal,
            state.next_duration(),
            state.profile(),
        )?)
    }
}
