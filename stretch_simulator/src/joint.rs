use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stretch_shared::{
    CalibratableJoint, JointError, JointKind, MotionLimits, MotionSample, MotorGains, Trajectory,
    TunableMotor,
};
use tokio::time::Instant;

/// Integration step (s)
const SIM_STEP_S: f64 = 0.002;
/// Time constant of the firmware effort filter (s)
const EFFORT_FILTER_S: f64 = 0.1;
/// Motor current per percent of effort (A)
const CURRENT_PER_EFFORT_PCT: f64 = 0.03;
/// Hard stops sit this far outside the usable range (m)
const HARD_STOP_MARGIN_M: f64 = 0.005;
/// Velocity below which the joint counts as settled (m/s)
const SETTLED_VELOCITY: f64 = 0.01;

/// Physical model of one simulated joint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimJointParams {
    /// Usable travel `[min, max]` (m)
    pub range_m: [f64; 2],
    pub max_velocity_m_s: f64,
    pub max_acceleration_m_s2: f64,
    /// Position tracking time constant at default gains (s)
    pub tracking_time_constant_s: f64,
    /// Mass reflected to the joint (kg)
    pub moving_mass_kg: f64,
    /// Viscous friction (N per m/s)
    pub viscous_friction: f64,
    pub coulomb_friction_n: f64,
    /// Constant load the motor holds against, e.g. lift weight (N)
    pub gravity_load_n: f64,
    /// Force at 100% effort (N)
    pub max_force_n: f64,
    /// Guarded mode stops the joint above this effort (%)
    pub guarded_contact_pct: f64,
    /// Uniform effort noise amplitude (%)
    pub effort_noise_pct: f64,
    /// Left/right effort split for two-motor joints
    pub wheel_asymmetry: f64,
    pub setpoint_tolerance_m: f64,
    pub seed: u64,
}

impl SimJointParams {
    pub fn for_kind(kind: JointKind) -> Self {
        match kind {
            JointKind::Arm => Self::arm(),
            JointKind::Lift => Self::lift(),
            JointKind::Base => Self::base(),
        }
    }

    pub fn arm() -> Self {
        Self {
            range_m: [0.0, 0.52],
            max_velocity_m_s: 0.25,
            max_acceleration_m_s2: 1.0,
            tracking_time_constant_s: 0.02,
            moving_mass_kg: 15.0,
            viscous_friction: 60.0,
            coulomb_friction_n: 6.0,
            gravity_load_n: 0.0,
            max_force_n: 100.0,
            guarded_contact_pct: 60.0,
            effort_noise_pct: 0.5,
            wheel_asymmetry: 0.0,
            setpoint_tolerance_m: 0.002,
            seed: 7,
        }
    }

    pub fn lift() -> Self {
        Self {
            range_m: [0.0, 1.1],
            max_velocity_m_s: 0.2,
            max_acceleration_m_s2: 0.6,
            moving_mass_kg: 20.0,
            viscous_friction: 80.0,
            coulomb_friction_n: 8.0,
            gravity_load_n: 25.0,
            max_force_n: 140.0,
            guarded_contact_pct: 70.0,
            seed: 11,
            ..Self::arm()
        }
    }

    pub fn base() -> Self {
        Self {
            range_m: [0.0, 0.5],
            max_velocity_m_s: 0.3,
            max_acceleration_m_s2: 0.8,
            moving_mass_kg: 25.0,
            viscous_friction: 40.0,
            coulomb_friction_n: 15.0,
            max_force_n: 200.0,
            wheel_asymmetry: 0.05,
            seed: 13,
            ..Self::arm()
        }
    }
}

/// Shared runstop button. Cloned handles observe the same state.
#[derive(Debug, Clone, Default)]
pub struct RunstopHandle(Arc<AtomicBool>);

impl RunstopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Hold { target: f64 },
    Positioning { target: f64 },
    Following {
        trajectory: Trajectory,
        started_at: f64,
    },
}

/// A single simulated joint. The arm and lift drive one motor, the base two wheels.
#[derive(Debug)]
pub struct SimulatedJoint {
    kind: JointKind,
    params: SimJointParams,
    gains: MotorGains,
    limits: MotionLimits,
    runstop: RunstopHandle,
    epoch: Instant,
    sim_time: f64,
    position: f64,
    velocity: f64,
    effort: f64,
    mode: Mode,
    loaded: Option<Trajectory>,
    guarded: bool,
    calibrated: bool,
    rng: StdRng,
}

impl SimulatedJoint {
    pub fn new(kind: JointKind, params: SimJointParams) -> Self {
        let rest = params.range_m[0] + 0.05;
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            kind,
            params,
            gains: MotorGains::default(),
            limits: MotionLimits::default(),
            runstop: RunstopHandle::new(),
            epoch: Instant::now(),
            sim_time: 0.0,
            position: rest,
            velocity: 0.0,
            effort: 0.0,
            mode: Mode::Hold { target: rest },
            loaded: None,
            guarded: true,
            calibrated: false,
            rng,
        }
    }

    /// Simulated joint that is already homed.
    pub fn homed(kind: JointKind, params: SimJointParams) -> Self {
        let mut joint = Self::new(kind, params);
        joint.finish_homing();
        joint
    }

    pub fn runstop(&self) -> RunstopHandle {
        self.runstop.clone()
    }

    pub fn params(&self) -> &SimJointParams {
        &self.params
    }

    pub fn gains(&self) -> &MotorGains {
        &self.gains
    }

    /// Position as of the last simulated step.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    fn finish_homing(&mut self) {
        let home = self.params.range_m[0];
        self.position = home;
        self.velocity = 0.0;
        self.mode = Mode::Hold { target: home };
        self.calibrated = true;
    }

    fn advance(&mut self) {
        let now = self.epoch.elapsed().as_secs_f64();
        while self.sim_time + SIM_STEP_S <= now {
            self.sim_time += SIM_STEP_S;
            self.step(SIM_STEP_S);
        }
    }

    fn hold_here(&mut self) {
        self.mode = Mode::Hold { target: self.position };
    }

    fn step(&mut self, dt: f64) {
        if self.runstop.is_active() && !matches!(self.mode, Mode::Hold { .. }) {
            self.hold_here();
        }

        let max_v = self.params.max_velocity_m_s;
        let mut finished_at = None;
        let (p_ref, v_ref, v_cap) = match &self.mode {
            Mode::Hold { target } => (*target, 0.0, max_v),
            Mode::Positioning { target } => (*target, 0.0, self.limits.vel_m.min(max_v)),
            Mode::Following {
                trajectory,
                started_at,
            } => {
                let elapsed = self.sim_time - started_at;
                let state = trajectory.state_at(elapsed);
                if elapsed >= trajectory.duration() {
                    finished_at = Some(state.position);
                }
                (state.position, state.velocity, max_v)
            }
        };
        if let Some(goal) = finished_at {
            self.mode = Mode::Hold { target: goal };
        }

        let a_max = self.params.max_acceleration_m_s2;
        let tau = self.params.tracking_time_constant_s * MotorGains::default().pos_kp
            / self.gains.pos_kp;
        let error = p_ref - self.position;
        let correction =
            error.signum() * (error.abs() / tau).min((2.0 * a_max * error.abs()).sqrt());
        let v_cmd = (v_ref + correction).clamp(-v_cap, v_cap);
        let dv = (v_cmd - self.velocity).clamp(-a_max * dt, a_max * dt);
        self.velocity += dv;
        self.position += self.velocity * dt;

        let [lo, hi] = self.params.range_m;
        if self.position < lo - HARD_STOP_MARGIN_M || self.position > hi + HARD_STOP_MARGIN_M {
            self.position = self
                .position
                .clamp(lo - HARD_STOP_MARGIN_M, hi + HARD_STOP_MARGIN_M);
            self.velocity = 0.0;
        }

        let friction = if self.velocity.abs() > 1e-4 {
            self.params.coulomb_friction_n * self.velocity.signum()
        } else {
            0.0
        };
        let force = self.params.moving_mass_kg * dv / dt
            + self.params.viscous_friction * self.velocity
            + friction
            + self.params.gravity_load_n;
        let raw = force / self.params.max_force_n * 100.0;
        self.effort += (raw - self.effort) * (dt / EFFORT_FILTER_S).min(1.0);

        if self.guarded
            && self.effort.abs() > self.params.guarded_contact_pct
            && !matches!(self.mode, Mode::Hold { .. })
        {
            tracing::debug!(joint = self.kind.name(), effort = self.effort, "Guarded contact");
            self.hold_here();
        }
    }

    fn check_runstop(&self, command: &str) -> Result<(), JointError> {
        if self.runstop.is_active() {
            return Err(JointError::CommandRejected(format!(
                "{command} while runstop is active"
            )));
        }
        Ok(())
    }

    fn check_in_range(&self, position: f64) -> Result<(), JointError> {
        let [lo, hi] = self.params.range_m;
        if position < lo - 1e-9 || position > hi + 1e-9 {
            return Err(JointError::CommandRejected(format!(
                "position {position:.3} outside [{lo:.3}, {hi:.3}]"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CalibratableJoint for SimulatedJoint {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn kind(&self) -> JointKind {
        self.kind
    }

    fn trajectory_range(&self) -> (f64, f64) {
        (self.params.range_m[0], self.params.range_m[1])
    }

    async fn set_trajectory(&mut self, trajectory: &Trajectory) -> Result<(), JointError> {
        trajectory
            .validate()
            .map_err(|e| JointError::CommandRejected(e.to_string()))?;
        for waypoint in trajectory.waypoints() {
            self.check_in_range(waypoint.x_m)?;
        }
        self.loaded = Some(trajectory.clone());
        Ok(())
    }

    async fn follow_trajectory(&mut self) -> Result<(), JointError> {
        self.advance();
        self.check_runstop("follow_trajectory")?;
        let trajectory = self
            .loaded
            .clone()
            .ok_or_else(|| JointError::CommandRejected("no trajectory loaded".to_string()))?;
        self.mode = Mode::Following {
            trajectory,
            started_at: self.sim_time,
        };
        Ok(())
    }

    async fn is_trajectory_active(&mut self) -> Result<bool, JointError> {
        self.advance();
        Ok(matches!(self.mode, Mode::Following { .. }))
    }

    async fn stop_trajectory(&mut self) -> Result<(), JointError> {
        self.advance();
        self.hold_here();
        Ok(())
    }

    async fn sample(&mut self) -> Result<MotionSample, JointError> {
        self.advance();
        let noise = self.params.effort_noise_pct.abs();
        let split: Vec<f64> = match self.kind.motor_count() {
            1 => vec![self.effort],
            _ => vec![
                self.effort * (1.0 + self.params.wheel_asymmetry),
                self.effort * (1.0 - self.params.wheel_asymmetry),
            ],
        };
        let effort_pct: Vec<f64> = split
            .into_iter()
            .map(|e| e + self.rng.random_range(-noise..=noise))
            .collect();
        let current = effort_pct.iter().map(|e| e * CURRENT_PER_EFFORT_PCT).collect();
        Ok(MotionSample {
            timestamp: self.sim_time,
            position: self.position,
            velocity: self.velocity,
            effort_pct,
            current,
        })
    }

    async fn enable_safety(&mut self) -> Result<(), JointError> {
        self.advance();
        self.velocity = 0.0;
        self.hold_here();
        Ok(())
    }

    async fn disable_guarded_mode(&mut self) -> Result<(), JointError> {
        self.guarded = false;
        Ok(())
    }

    async fn enable_guarded_mode(&mut self) -> Result<(), JointError> {
        self.guarded = true;
        Ok(())
    }

    async fn is_runstopped(&mut self) -> Result<bool, JointError> {
        Ok(self.runstop.is_active())
    }

    async fn is_calibrated(&mut self) -> Result<bool, JointError> {
        Ok(self.calibrated)
    }

    async fn home(&mut self) -> Result<(), JointError> {
        self.advance();
        self.check_runstop("home")?;
        self.finish_homing();
        tracing::info!(joint = self.kind.name(), "Homing complete");
        Ok(())
    }

    async fn move_to(&mut self, position: f64) -> Result<(), JointError> {
        self.advance();
        self.check_runstop("move_to")?;
        self.check_in_range(position)?;
        self.mode = Mode::Positioning { target: position };
        Ok(())
    }

    async fn is_at_setpoint(&mut self) -> Result<bool, JointError> {
        self.advance();
        Ok(match self.mode {
            Mode::Hold { target } | Mode::Positioning { target } => {
                (self.position - target).abs() < self.params.setpoint_tolerance_m
                    && self.velocity.abs() < SETTLED_VELOCITY
            }
            Mode::Following { .. } => false,
        })
    }
}

#[async_trait]
impl TunableMotor for SimulatedJoint {
    async fn apply_gains(
        &mut self,
        gains: &MotorGains,
        limits: &MotionLimits,
    ) -> Result<(), JointError> {
        if gains.pos_kp <= 0.0 {
            return Err(JointError::CommandRejected(
                "pKp_d must be positive".to_string(),
            ));
        }
        if limits.vel_m <= 0.0 || limits.accel_m <= 0.0 {
            return Err(JointError::CommandRejected(
                "velocity and acceleration limits must be positive".to_string(),
            ));
        }
        self.advance();
        self.gains = gains.clone();
        self.limits = limits.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stretch_shared::MotionProfile;
    use tokio::time::sleep;

    async fn settle(joint: &mut SimulatedJoint) {
        for _ in 0..400 {
            if joint.is_at_setpoint().await.unwrap() {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("joint never settled at {:.3}", joint.position());
    }

    #[tokio::test(start_paused = true)]
    async fn follows_slow_trajectory_to_goal() {
        let mut joint = SimulatedJoint::homed(JointKind::Arm, SimJointParams::arm());
        joint.move_to(0.1).await.unwrap();
        settle(&mut joint).await;

        let trajectory = Trajectory::spanning(0.1, 0.4, 6.0, MotionProfile::Cubic).unwrap();
        joint.set_trajectory(&trajectory).await.unwrap();
        joint.follow_trajectory().await.unwrap();
        assert!(joint.is_trajectory_active().await.unwrap());

        sleep(Duration::from_millis(6100)).await;
        assert!(!joint.is_trajectory_active().await.unwrap());
        let sample = joint.sample().await.unwrap();
        assert!((sample.position - 0.4).abs() < 0.01, "ended at {}", sample.position);
        assert_eq!(sample.effort_pct.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_trajectory_lags_behind_goal() {
        let mut params = SimJointParams::arm();
        params.effort_noise_pct = 0.0;
        let mut joint = SimulatedJoint::homed(JointKind::Arm, params);
        joint.move_to(0.1).await.unwrap();
        settle(&mut joint).await;

        let trajectory = Trajectory::spanning(0.1, 0.5, 0.8, MotionProfile::Linear).unwrap();
        joint.set_trajectory(&trajectory).await.unwrap();
        joint.follow_trajectory().await.unwrap();
        sleep(Duration::from_millis(800)).await;
        let sample = joint.sample().await.unwrap();
        assert!(sample.position < 0.45, "reached {}", sample.position);
        assert!(sample.max_abs_effort() > 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn runstop_halts_motion_and_rejects_commands() {
        let mut joint = SimulatedJoint::homed(JointKind::Lift, SimJointParams::lift());
        let runstop = joint.runstop();
        let trajectory = Trajectory::spanning(0.0, 0.8, 8.0, MotionProfile::Linear).unwrap();
        joint.set_trajectory(&trajectory).await.unwrap();
        joint.follow_trajectory().await.unwrap();
        sleep(Duration::from_secs(2)).await;

        runstop.trigger();
        sleep(Duration::from_millis(10)).await;
        assert!(joint.is_runstopped().await.unwrap());
        assert!(!joint.is_trajectory_active().await.unwrap());
        assert!(joint.move_to(0.5).await.is_err());

        runstop.release();
        assert!(joint.move_to(0.5).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn base_reports_both_wheels() {
        let mut joint = SimulatedJoint::homed(JointKind::Base, SimJointParams::base());
        let sample = joint.sample().await.unwrap();
        assert_eq!(sample.effort_pct.len(), 2);
        assert_eq!(sample.current.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_targets_outside_travel() {
        let mut joint = SimulatedJoint::homed(JointKind::Arm, SimJointParams::arm());
        let err = joint.move_to(0.9).await.unwrap_err();
        assert!(matches!(err, JointError::CommandRejected(_)));
        let trajectory = Trajectory::spanning(0.1, 0.9, 3.0, MotionProfile::Linear).unwrap();
        assert!(joint.set_trajectory(&trajectory).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tighter_gains_are_stored() {
        let mut joint = SimulatedJoint::homed(JointKind::Arm, SimJointParams::arm());
        let gains = MotorGains {
            pos_kp: 12.0,
            ..MotorGains::default()
        };
        joint.apply_gains(&gains, &MotionLimits::default()).await.unwrap();
        assert_eq!(joint.gains().pos_kp, 12.0);
        let bad = MotorGains {
            pos_kp: 0.0,
            ..MotorGains::default()
        };
        assert!(joint.apply_gains(&bad, &MotionLimits::default()).await.is_err());
    }
}
