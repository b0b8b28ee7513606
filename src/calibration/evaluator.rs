// src/calibration/evaluator.rs - Classifies a finished trial against the targets
use crate::calibration::executor::{SafetyStop, TrialRecord};
use crate::calibration::targets::CalibrationTargets;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use stretch_shared::TrajectoryError;

/// Goals closer to zero than this (cm) have no meaningful percentage error.
const MIN_GOAL_FOR_PERCENT_CM: f64 = 0.01;
/// Samples averaged for the settled effort.
const AVERAGE_EFFORT_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Good,
    Bad,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Good => f.write_str("GOOD"),
            Verdict::Bad => f.write_str("BAD"),
        }
    }
}

/// Metrics derived from a trial record. Positions and errors are in cm.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrialEvaluation {
    pub travel_duration_seconds: f64,
    pub travel_range_cm: f64,
    pub linear_speed_cm_per_second: f64,
    pub goal_position_cm: f64,
    pub actual_position_cm: f64,
    pub error_absolute_cm: f64,
    /// `None` when the goal sits at zero
    pub error_percent: Option<f64>,
    pub max_effort_percent: f64,
    pub min_effort_percent: f64,
    pub max_abs_effort_percent: f64,
    pub average_effort_percent: f64,
    pub exceeds_effort_target: bool,
    pub exceeds_absolute_error_target: bool,
    pub exceeds_percent_error_target: bool,
    pub safety_stop: Option<SafetyStop>,
    pub verdict: Verdict,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the trial metrics and verdict. Pure: the same record always yields the same result.
pub fn evaluate(
    record: &TrialRecord,
    targets: &CalibrationTargets,
) -> Result<TrialEvaluation, CalibrationError> {
    let goal = record.trajectory.goal().ok_or(TrajectoryError::Empty)?;
    let last = record.samples.last().ok_or(CalibrationError::NoSamples)?;

    let goal_position_cm = round2(goal.x_m * 100.0);
    let actual_position_cm = round2(last.position * 100.0);
    let error_absolute_cm = round2((goal_position_cm - actual_position_cm).abs());
    let error_percent = (goal_position_cm.abs() >= MIN_GOAL_FOR_PERCENT_CM)
        .then(|| round2(error_absolute_cm / goal_position_cm.abs() * 100.0));

    let signed: Vec<f64> = record.samples.iter().map(|s| s.dominant_effort()).collect();
    let max_effort = signed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_effort = signed.iter().copied().fold(f64::INFINITY, f64::min);
    let max_abs_effort = record
        .samples
        .iter()
        .map(|s| s.max_abs_effort())
        .fold(0.0, f64::max);
    let tail = &signed[signed.len().saturating_sub(AVERAGE_EFFORT_WINDOW)..];
    let average_effort = tail.iter().map(|e| e.abs()).sum::<f64>() / tail.len() as f64;

    let duration = record.duration();
    let travel_range_cm = round2(record.trajectory.travel_range() * 100.0);

    let exceeds_effort_target = max_abs_effort >= targets.effort_percent_target;
    let exceeds_absolute_error_target = error_absolute_cm >= targets.goal_error_absolute_target_cm;
    let exceeds_percent_error_target =
        error_percent.is_some_and(|pct| pct >= targets.goal_error_percentage_target);

    let verdict = if record.is_stopped_for_safety()
        || exceeds_effort_target
        || exceeds_absolute_error_target
        || exceeds_percent_error_target
    {
        Verdict::Bad
    } else {
        Verdict::Good
    };

    Ok(TrialEvaluation {
        travel_duration_seconds: duration,
        travel_range_cm,
        linear_speed_cm_per_second: round2(travel_range_cm / duration),
        goal_position_cm,
        actual_position_cm,
        error_absolute_cm,
        error_percent,
        max_effort_percent: round2(max_effort),
        min_effort_percent: round2(min_effort),
        max_abs_effort_percent: round2(max_abs_effort),
        average_effort_percent: round2(average_effort),
        exceeds_effort_target,
        exceeds_absolute_error_target,
        exceeds_percent_error_target,
        safety_stop: record.safety_stop,
        verdict,
    })
}

pub fn classify(
    record: &TrialRecord,
    targets: &CalibrationTargets,
) -> Result<Verdict, CalibrationError> {
    Ok(evaluate(record, targets)?.verdict)
}

/// A classified trial. Immutable once built.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrialResult {
    record: TrialRecord,
    evaluation: TrialEvaluation,
}

impl TrialResult {
    pub fn new(
        record: TrialRecord,
        targets: &CalibrationTargets,
    ) -> Result<Self, CalibrationError> {
        let evaluation = evaluate(&record, targets)?;
        Ok(Self { record, evaluation })
    }

    pub fn record(&self) -> &TrialRecord {
        &self.record
    }

    pub fn evaluation(&self) -> &TrialEvaluation {
        &self.evaluation
    }

    pub fn duration(&self) -> f64 {
        self.record.duration()
    }

    pub fn verdict(&self) -> Verdict {
        self.evaluation.verdict
    }

    pub fn is_good(&self) -> bool {
        self.evaluation.verdict == Verdict::Good
    }
}
