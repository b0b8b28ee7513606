// src/calibration/limits.rs - Dynamic limits derived from the optimal trials
use crate::calibration::controller::CalibrationState;
use crate::calibration::targets::Direction;
use crate::persistence::{ParamStore, PersistenceError};
use serde::{Deserialize, Serialize};
use stretch_shared::MotionProfile;

/// Fastest safe motion for one (profile, direction) pair.
///
/// For a rest-to-rest move over `range` in `T` seconds the peak velocity is
/// `k_v * range / T` and the peak acceleration `k_a * range / T²`, with the factors
/// given by [`MotionProfile::peak_velocity_factor`] and
/// [`MotionProfile::peak_acceleration_factor`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DynamicLimits {
    pub profile: MotionProfile,
    pub direction: Direction,
    pub travel_duration_seconds: f64,
    pub travel_range_m: f64,
    pub vel_m: f64,
    /// Not defined for linear segments
    pub accel_m: Option<f64>,
    /// Largest |effort| seen during the optimal trial (%)
    pub effort_pct: f64,
}

impl DynamicLimits {
    pub fn from_state(state: &CalibrationState) -> Option<Self> {
        let optimal = state.optimal()?;
        let profile = state.profile();
        let duration = optimal.duration();
        let range = optimal.record().trajectory.travel_range();
        Some(Self {
            profile,
            direction: state.direction(),
            travel_duration_seconds: duration,
            travel_range_m: range,
            vel_m: round4(profile.peak_velocity_factor() * range / duration),
            accel_m: profile
                .peak_acceleration_factor()
                .map(|k| round4(k * range / (duration * duration))),
            effort_pct: optimal.evaluation().max_abs_effort_percent,
        })
    }

    /// `<joint>.motion.trajectory_max.<profile>.<direction>`
    pub fn key_prefix(&self, joint: &str) -> String {
        format!(
            "{joint}.motion.trajectory_max.{}.{}",
            self.profile.name(),
            self.direction.name()
        )
    }

    pub fn write_to<S: ParamStore + ?Sized>(
        &self,
        joint: &str,
        store: &mut S,
    ) -> Result<(), PersistenceError> {
        let prefix = self.key_prefix(joint);
        store.set(&format!("{prefix}.vel_m"), self.vel_m.into())?;
        if let Some(accel) = self.accel_m {
            store.set(&format!("{prefix}.accel_m"), accel.into())?;
        }
        store.set(&format!("{prefix}.effort_pct"), self.effort_pct.into())?;
        Ok(())
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
