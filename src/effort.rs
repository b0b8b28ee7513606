// src/effort.rs - Trajectory effort sweep and guarded-contact threshold proposal
use crate::calibration::executor::{MotionExecutor, TrialRecord};
use crate::calibration::targets::{CalibrationTargets, Direction};
use crate::config::ContactConfig;
use crate::error::CalibrationError;
use crate::persistence::{ParamStore, PersistenceError};
use serde::{Deserialize, Serialize};
use stretch_shared::{CalibratableJoint, MotionProfile, Trajectory};

/// Efforts seen over repeated full-range moves.
///
/// `effort_pct_pos[i]` and `pos_out[i]` hold the signed effort and position trace of the
/// i-th outward move; the `_neg` / `pos_in` pair holds the return moves.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EffortSweepResults {
    pub joint: String,
    pub profile: MotionProfile,
    pub travel_duration_seconds: f64,
    pub effort_pct_pos: Vec<Vec<f64>>,
    pub effort_pct_neg: Vec<Vec<f64>>,
    pub pos_out: Vec<Vec<f64>>,
    pub pos_in: Vec<Vec<f64>>,
    pub max_effort_pct_pos: f64,
    pub min_effort_pct_neg: f64,
    pub safety_stops: usize,
    /// Proposed `[negative, positive]` guarded-contact thresholds (%)
    pub contact_thresh_proposed: [f64; 2],
}

/// Widen the observed effort envelope by the configured margin, within the hard bounds.
pub fn propose_contact_thresholds(
    min_effort_neg: f64,
    max_effort_pos: f64,
    contact: &ContactConfig,
) -> [f64; 2] {
    [
        (min_effort_neg - contact.margin_pct).max(contact.thresh_max[0]),
        (max_effort_pos + contact.margin_pct).min(contact.thresh_max[1]),
    ]
}

pub fn contact_thresh_key(joint: &str) -> String {
    format!("{joint}.contact_models.effort_pct.contact_thresh_default")
}

pub fn write_contact_thresholds<S: ParamStore + ?Sized>(
    joint: &str,
    thresholds: [f64; 2],
    store: &mut S,
) -> Result<(), PersistenceError> {
    let value = serde_yaml::to_value(thresholds)?;
    store.set(&contact_thresh_key(joint), value)
}

/// Run `cycles` outward/return pairs at the profile's start duration.
pub async fn run_effort_sweep<J>(
    joint: &mut J,
    executor: &MotionExecutor,
    targets: &CalibrationTargets,
    profile: MotionProfile,
    cycles: usize,
    min_position_offset_m: f64,
    contact: &ContactConfig,
) -> Result<EffortSweepResults, CalibrationError>
where
    J: CalibratableJoint + ?Sized,
{
    let duration = targets.travel_duration_start_seconds;
    let mut results = EffortSweepResults {
        joint: joint.name().to_string(),
        profile,
        travel_duration_seconds: duration,
        effort_pct_pos: Vec::with_capacity(cycles),
        effort_pct_neg: Vec::with_capacity(cycles),
        pos_out: Vec::with_capacity(cycles),
        pos_in: Vec::with_capacity(cycles),
        max_effort_pct_pos: f64::NEG_INFINITY,
        min_effort_pct_neg: f64::INFINITY,
        safety_stops: 0,
        contact_thresh_proposed: contact.thresh_max,
    };

    for cycle in 0..cycles {
        tracing::info!(cycle = cycle + 1, cycles, "Effort sweep cycle");
        for direction in Direction::ALL {
            let (start, goal) =
                direction.endpoints(joint.trajectory_range(), min_position_offset_m);
            let trajectory = Trajectory::spanning(start, goal, duration, profile)?;
            let record = executor.run_trial(joint, &trajectory, targets).await?;
            results.absorb(direction, &record);
        }
    }

    // no samples in a direction
    if !results.max_effort_pct_pos.is_finite() {
        results.max_effort_pct_pos = 0.0;
    }
    if !results.min_effort_pct_neg.is_finite() {
        results.min_effort_pct_neg = 0.0;
    }
    results.contact_thresh_proposed = propose_contact_thresholds(
        results.min_effort_pct_neg,
        results.max_effort_pct_pos,
        contact,
    );
    tracing::info!(
        max_pos = results.max_effort_pct_pos,
        min_neg = results.min_effort_pct_neg,
        proposed = ?results.contact_thresh_proposed,
        "Effort sweep complete"
    );
    Ok(results)
}

impl EffortSweepResults {
    fn absorb(&mut self, direction: Direction, record: &TrialRecord) {
        if record.is_stopped_for_safety() {
            self.safety_stops += 1;
        }
        let efforts: Vec<f64> = record.samples.iter().map(|s| s.dominant_effort()).collect();
        let positions: Vec<f64> = record.samples.iter().map(|s| s.position).collect();
        match direction {
            Direction::Positive => {
                self.max_effort_pct_pos =
                    efforts.iter().copied().fold(self.max_effort_pct_pos, f64::max);
                self.effort_pct_pos.push(efforts);
                self.pos_out.push(positions);
            }
            Direction::Negative => {
                self.min_effort_pct_neg =
                    efforts.iter().copied().fold(self.min_effort_pct_neg, f64::min);
                self.effort_pct_neg.push(efforts);
                self.pos_in.push(positions);
            }
        }
    }
}
