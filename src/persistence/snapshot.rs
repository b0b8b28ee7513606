// src/persistence/snapshot.rs - Per-trial JSON + CSV records under the run directory
use crate::calibration::controller::{CalibrationState, HistoryEntry, StepOutcome};
use crate::calibration::evaluator::TrialResult;
use crate::calibration::targets::{CalibrationTargets, Direction};
use crate::persistence::PersistenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use stretch_shared::{BatteryInfo, MotionProfile};
use uuid::Uuid;

/// Everything needed to audit one trial after the fact
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrialSnapshot {
    pub session_id: Uuid,
    pub label: String,
    pub joint: String,
    pub profile: MotionProfile,
    pub direction: Direction,
    pub captured_at: DateTime<Utc>,
    pub battery_info: Option<BatteryInfo>,
    pub calibration_targets: CalibrationTargets,
    pub outcome: StepOutcome,
    pub optimal: bool,
    pub trial: TrialResult,
}

#[derive(Debug, Serialize)]
struct SampleRow {
    timestamp: f64,
    position: f64,
    velocity: f64,
    effort_pct_0: f64,
    effort_pct_1: Option<f64>,
    current_0: f64,
    current_1: Option<f64>,
}

/// Writes snapshots for one calibration run.
///
/// Every file lands in `run_dir`, named
/// `<prefix><joint>_<direction>_<profile>_<speed>cm_per_s[_first_overshoot].{json,csv}`.
#[derive(Debug, Clone)]
pub struct SnapshotRecorder {
    run_dir: PathBuf,
    label: String,
    session_id: Uuid,
    battery_info: Option<BatteryInfo>,
}

impl SnapshotRecorder {
    /// New run directory `<base_dir>/<unix seconds>`.
    pub fn create(base_dir: impl AsRef<Path>, label: &str) -> Result<Self, PersistenceError> {
        let run_dir = base_dir.as_ref().join(Utc::now().timestamp().to_string());
        Self::in_dir(run_dir, label)
    }

    pub fn in_dir(run_dir: impl Into<PathBuf>, label: &str) -> Result<Self, PersistenceError> {
        let run_dir = run_dir.into();
        std::fs::create_dir_all(&run_dir)?;
        tracing::info!("Recording calibration data to {}", run_dir.display());
        Ok(Self {
            run_dir,
            label: label.to_string(),
            session_id: Uuid::new_v4(),
            battery_info: None,
        })
    }

    pub fn with_battery(mut self, info: BatteryInfo) -> Self {
        self.battery_info = Some(info);
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn file_stem(
        prefix: &str,
        joint: &str,
        state: &CalibrationState,
        entry: &HistoryEntry,
    ) -> String {
        let speed = entry.trial.evaluation().linear_speed_cm_per_second;
        let mut stem = format!(
            "{prefix}{joint}_{}_{}_{speed}cm_per_s",
            state.direction().name(),
            state.profile().name()
        );
        match entry.outcome {
            StepOutcome::FirstOvershoot => stem.push_str("_first_overshoot"),
            StepOutcome::RunstopRetry => stem.push_str("_runstop"),
            StepOutcome::SearchAborted => stem.push_str("_aborted"),
            _ => {}
        }
        stem.replace([' ', '/'], "_").to_lowercase()
    }

    /// Snapshot the latest trial of `state`.
    pub fn record_trial(
        &self,
        joint: &str,
        state: &CalibrationState,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(entry) = state.latest() else {
            return Ok(None);
        };
        let stem = Self::file_stem("", joint, state, entry);
        self.write(&stem, joint, state, entry, false).map(Some)
    }

    /// Snapshot a trial that `state` rejected with an error. `state` only supplies the
    /// profile, direction and targets.
    pub fn record_aborted(
        &self,
        joint: &str,
        state: &CalibrationState,
        trial: TrialResult,
    ) -> Result<PathBuf, PersistenceError> {
        let entry = HistoryEntry {
            trial,
            outcome: StepOutcome::SearchAborted,
        };
        let stem = Self::file_stem("", joint, state, &entry);
        self.write(&stem, joint, state, &entry, false)
    }

    /// Snapshot the optimal trial of a converged `state`.
    pub fn record_optimal(
        &self,
        joint: &str,
        state: &CalibrationState,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(entry) = state.optimal_entry() else {
            return Ok(None);
        };
        let stem = Self::file_stem("optimal_", joint, state, entry);
        self.write(&stem, joint, state, entry, true).map(Some)
    }

    /// Write any serializable summary as `<name>.json` in the run directory.
    pub fn write_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.run_dir.join(format!("{name}.json"));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(path)
    }

    fn write(
        &self,
        stem: &str,
        joint: &str,
        state: &CalibrationState,
        entry: &HistoryEntry,
        optimal: bool,
    ) -> Result<PathBuf, PersistenceError> {
        let snapshot = TrialSnapshot {
            session_id: self.session_id,
            label: self.label.clone(),
            joint: joint.to_string(),
            profile: state.profile(),
            direction: state.direction(),
            captured_at: Utc::now(),
            battery_info: self.battery_info,
            calibration_targets: *state.targets(),
            outcome: entry.outcome,
            optimal,
            trial: entry.trial.clone(),
        };
        let json_path = self.write_json(stem, &snapshot)?;

        let mut csv = csv::Writer::from_path(self.run_dir.join(format!("{stem}.csv")))?;
        for sample in &entry.trial.record().samples {
            csv.serialize(SampleRow {
                timestamp: sample.timestamp,
                position: sample.position,
                velocity: sample.velocity,
                effort_pct_0: sample.effort_pct.first().copied().unwrap_or(0.0),
                effort_pct_1: sample.effort_pct.get(1).copied(),
                current_0: sample.current.first().copied().unwrap_or(0.0),
                current_1: sample.current.get(1).copied(),
            })?;
        }
        csv.flush()?;
        tracing::debug!("Saved snapshot {}", json_path.display());
        Ok(json_path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<TrialSnapshot, PersistenceError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
