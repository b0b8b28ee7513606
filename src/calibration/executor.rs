// src/calibration/executor.rs - Runs one trial trajectory and records telemetry
use crate::calibration::targets::CalibrationTargets;
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stretch_shared::{CalibratableJoint, MotionSample, Trajectory, TrajectoryError};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};

/// Allowed distance between the joint and the first waypoint when a trial starts (m)
const START_TOLERANCE_M: f64 = 0.005;
/// Repositioning attempts before giving up on reaching the first waypoint
const MAX_START_ATTEMPTS: u32 = 3;

/// Why a trial was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SafetyStop {
    /// |effort| crossed the effort target
    EffortLimit,
    /// The runstop was pressed mid-trial
    Runstop,
}

/// Raw outcome of one trial, before classification
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrialRecord {
    pub trajectory: Trajectory,
    pub samples: Vec<MotionSample>,
    pub safety_stop: Option<SafetyStop>,
}

impl TrialRecord {
    pub fn new(trajectory: Trajectory, samples: Vec<MotionSample>) -> Self {
        Self {
            trajectory,
            samples,
            safety_stop: None,
        }
    }

    pub fn stopped_for(mut self, stop: SafetyStop) -> Self {
        self.safety_stop = Some(stop);
        self
    }

    pub fn is_stopped_for_safety(&self) -> bool {
        self.safety_stop.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.trajectory.duration()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorSettings {
    pub sampling_interval: Duration,
    pub settle_time: Duration,
    pub runstop_poll_interval: Duration,
    pub positioning_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&CalibrationConfig::default())
    }
}

impl From<&CalibrationConfig> for ExecutorSettings {
    fn from(config: &CalibrationConfig) -> Self {
        Self {
            sampling_interval: Duration::from_millis(config.sampling_interval_ms),
            settle_time: Duration::from_millis(config.settle_time_ms),
            runstop_poll_interval: Duration::from_millis(config.runstop_poll_interval_ms),
            positioning_timeout: Duration::from_millis(config.positioning_timeout_ms),
        }
    }
}

/// Drives a joint through one trajectory at a time.
///
/// Guarded mode is disabled while a trial runs so the effort target, not the contact
/// model, decides when to stop. It is re-enabled before `run_trial` returns.
#[derive(Debug, Clone, Default)]
pub struct MotionExecutor {
    settings: ExecutorSettings,
}

impl MotionExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn run_trial<J>(
        &self,
        joint: &mut J,
        trajectory: &Trajectory,
        targets: &CalibrationTargets,
    ) -> Result<TrialRecord, CalibrationError>
    where
        J: CalibratableJoint + ?Sized,
    {
        trajectory.validate()?;
        let start = trajectory.start().ok_or(TrajectoryError::Empty)?.x_m;

        joint.disable_guarded_mode().await?;
        let outcome = self.execute(joint, trajectory, targets, start).await;
        let restored = joint.enable_guarded_mode().await;
        let record = outcome?;
        restored?;
        Ok(record)
    }

    async fn execute<J>(
        &self,
        joint: &mut J,
        trajectory: &Trajectory,
        targets: &CalibrationTargets,
        start: f64,
    ) -> Result<TrialRecord, CalibrationError>
    where
        J: CalibratableJoint + ?Sized,
    {
        self.prepare_start(joint, trajectory, start).await?;
        joint.follow_trajectory().await?;
        tracing::debug!(
            joint = joint.name(),
            profile = %trajectory.profile(),
            duration = trajectory.duration(),
            "Following trajectory"
        );

        let mut record = TrialRecord::new(trajectory.clone(), Vec::new());
        let mut ticker = interval(self.settings.sampling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if joint.is_runstopped().await? {
                tracing::warn!(joint = joint.name(), "Runstop pressed, stopping trajectory");
                joint.stop_trajectory().await?;
                self.wait_for_runstop_release(joint).await?;
                record.samples.push(joint.sample().await?);
                return Ok(record.stopped_for(SafetyStop::Runstop));
            }

            let sample = joint.sample().await?;
            let effort = sample.max_abs_effort();
            tracing::debug!(
                position = sample.position,
                velocity = sample.velocity,
                effort,
                "Sample"
            );
            record.samples.push(sample);

            if effort > targets.effort_percent_target {
                joint.stop_trajectory().await?;
                joint.enable_safety().await?;
                tracing::warn!(
                    joint = joint.name(),
                    effort,
                    target = targets.effort_percent_target,
                    "Effort above target, motion stopped for safety"
                );
                return Ok(record.stopped_for(SafetyStop::EffortLimit));
            }

            if !joint.is_trajectory_active().await? {
                return Ok(record);
            }
        }
    }

    /// Bring the joint to rest at `start` with `trajectory` loaded.
    ///
    /// A runstop before the trajectory starts is waited out and the joint is moved to
    /// `start` again, since the runstop holds the joint wherever it was.
    async fn prepare_start<J>(
        &self,
        joint: &mut J,
        trajectory: &Trajectory,
        start: f64,
    ) -> Result<(), CalibrationError>
    where
        J: CalibratableJoint + ?Sized,
    {
        let mut misses = 0;
        loop {
            if joint.is_runstopped().await? {
                tracing::warn!(joint = joint.name(), "Runstop active before trial start");
                self.wait_for_runstop_release(joint).await?;
            }
            move_and_wait(
                joint,
                start,
                self.settings.sampling_interval,
                self.settings.positioning_timeout,
            )
            .await?;
            if joint.is_runstopped().await? {
                continue;
            }
            joint.set_trajectory(trajectory).await?;
            sleep(self.settings.settle_time).await;
            if joint.is_runstopped().await? {
                continue;
            }

            let position = joint.sample().await?.position;
            if (position - start).abs() <= START_TOLERANCE_M {
                return Ok(());
            }
            misses += 1;
            if misses >= MAX_START_ATTEMPTS {
                return Err(CalibrationError::PositioningTimeout { target: start });
            }
            tracing::warn!(
                joint = joint.name(),
                position,
                start,
                "Joint settled away from the trajectory start, repositioning"
            );
        }
    }

    async fn wait_for_runstop_release<J>(&self, joint: &mut J) -> Result<(), CalibrationError>
    where
        J: CalibratableJoint + ?Sized,
    {
        loop {
            sleep(self.settings.runstop_poll_interval).await;
            if !joint.is_runstopped().await? {
                tracing::info!(joint = joint.name(), "Runstop released");
                return Ok(());
            }
            tracing::warn!(joint = joint.name(), "Waiting for runstop to be released");
        }
    }
}

/// Command a position move and poll until the joint settles there.
pub async fn move_and_wait<J>(
    joint: &mut J,
    position: f64,
    poll: Duration,
    timeout: Duration,
) -> Result<(), CalibrationError>
where
    J: CalibratableJoint + ?Sized,
{
    joint.move_to(position).await?;
    let deadline = Instant::now() + timeout;
    loop {
        if joint.is_at_setpoint().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CalibrationError::PositioningTimeout { target: position });
        }
        sleep(poll).await;
    }
}
