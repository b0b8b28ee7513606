// src/calibration/controller.rs - Duration search for one (profile, direction) pair
//
// Searching: shorten the duration after every GOOD trial, by less the closer the trial
// came to a target. The first BAD trial opens a bracket [bad, good] and the search
// switches to Backtracking, which bisects the bracket until the step would drop below
// `end_condition_time_step`. The GOOD trial that ends the search is the optimum.

use crate::calibration::evaluator::{TrialResult, Verdict, round2};
use crate::calibration::executor::SafetyStop;
use crate::calibration::targets::{CalibrationTargets, Direction, SearchPolicy};
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use stretch_shared::MotionProfile;

/// Brackets narrower than this (s) cannot be split further.
const MIN_BRACKET_WIDTH_S: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SearchPhase {
    Searching,
    Backtracking,
    Converged,
}

/// What a trial did to the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    /// GOOD before any failure; keep shortening
    TargetsNotReached,
    /// The first BAD trial
    FirstOvershoot,
    /// GOOD inside the bracket; try faster
    BacktrackingDecreasingTime,
    /// BAD inside the bracket; try slower
    BacktrackingIncreasingTime,
    /// GOOD with a step under the end condition; this trial is optimal
    TargetReached,
    /// BAD with a bracket too narrow to split; the last GOOD trial is optimal
    BracketExhausted,
    /// Interrupted by the runstop; repeat the same duration
    RunstopRetry,
    /// The trial ended the search with an error
    SearchAborted,
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::TargetsNotReached => "TARGETS_NOT_REACHED",
            StepOutcome::FirstOvershoot => "FIRST_OVERSHOOT",
            StepOutcome::BacktrackingDecreasingTime => "BACKTRACKING_DECREASING_TIME",
            StepOutcome::BacktrackingIncreasingTime => "BACKTRACKING_INCREASING_TIME",
            StepOutcome::TargetReached => "TARGET_REACHED",
            StepOutcome::BracketExhausted => "BRACKET_EXHAUSTED",
            StepOutcome::RunstopRetry => "RUNSTOP_RETRY",
            StepOutcome::SearchAborted => "SEARCH_ABORTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Run the next trial at this duration (s)
    Next(f64),
    Converged,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub trial: TrialResult,
    pub outcome: StepOutcome,
}

/// Search state for one (profile, direction) pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrationState {
    profile: MotionProfile,
    direction: Direction,
    targets: CalibrationTargets,
    phase: SearchPhase,
    next_duration: f64,
    history: Vec<HistoryEntry>,
    last_good: Option<usize>,
    last_bad: Option<usize>,
    optimal: Option<usize>,
}

impl CalibrationState {
    pub fn new(profile: MotionProfile, direction: Direction, targets: CalibrationTargets) -> Self {
        Self {
            profile,
            direction,
            targets,
            phase: SearchPhase::Searching,
            next_duration: targets.travel_duration_start_seconds,
            history: Vec::new(),
            last_good: None,
            last_bad: None,
            optimal: None,
        }
    }

    pub fn profile(&self) -> MotionProfile {
        self.profile
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn targets(&self) -> &CalibrationTargets {
        &self.targets
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn is_converged(&self) -> bool {
        self.phase == SearchPhase::Converged
    }

    /// Duration for the next trial. Meaningless once converged.
    pub fn next_duration(&self) -> f64 {
        self.next_duration
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    pub fn last_good(&self) -> Option<&TrialResult> {
        self.last_good.map(|i| &self.history[i].trial)
    }

    pub fn last_bad(&self) -> Option<&TrialResult> {
        self.last_bad.map(|i| &self.history[i].trial)
    }

    pub fn optimal(&self) -> Option<&TrialResult> {
        self.optimal_entry().map(|entry| &entry.trial)
    }

    pub fn optimal_entry(&self) -> Option<&HistoryEntry> {
        self.optimal.map(|i| &self.history[i])
    }

    /// e.g. "Positive Linear"
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            capitalize(self.direction.name()),
            capitalize(self.profile.name())
        )
    }

    /// Fails once `max_trials` trials have been fed. Check before running the next trial
    /// so the trial over the limit never reaches the joint.
    pub fn ensure_trial_budget(&self, policy: &SearchPolicy) -> Result<(), CalibrationError> {
        if self.history.len() >= policy.max_trials {
            return Err(CalibrationError::TrialLimitExceeded {
                trials: self.history.len(),
            });
        }
        Ok(())
    }

    /// Feed the result of the trial run at [`CalibrationState::next_duration`].
    pub fn advance(
        mut self,
        policy: &SearchPolicy,
        trial: TrialResult,
    ) -> Result<(Self, Transition), CalibrationError> {
        if self.is_converged() {
            return Err(CalibrationError::AlreadyConverged);
        }
        self.ensure_trial_budget(policy)?;

        let duration = trial.duration();
        let index = self.history.len();

        if trial.record().safety_stop == Some(SafetyStop::Runstop) {
            self.history.push(HistoryEntry {
                trial,
                outcome: StepOutcome::RunstopRetry,
            });
            self.next_duration = duration;
            return Ok((self, Transition::Next(duration)));
        }

        match trial.verdict() {
            Verdict::Good => {
                let bad = self.last_bad().map(TrialResult::duration);
                self.last_good = Some(index);
                match bad {
                    None => {
                        let decrement = self.decrement_after(&trial, policy);
                        let proposed = round2(duration - decrement);
                        self.history.push(HistoryEntry {
                            trial,
                            outcome: StepOutcome::TargetsNotReached,
                        });
                        if proposed <= 0.0 {
                            return Err(CalibrationError::NonPositiveDuration { proposed });
                        }
                        self.next_duration = proposed;
                        Ok((self, Transition::Next(proposed)))
                    }
                    Some(bad) if (duration - bad).abs() / 2.0 < policy.end_condition_time_step => {
                        self.history.push(HistoryEntry {
                            trial,
                            outcome: StepOutcome::TargetReached,
                        });
                        self.optimal = Some(index);
                        self.phase = SearchPhase::Converged;
                        Ok((self, Transition::Converged))
                    }
                    Some(_) => {
                        self.history.push(HistoryEntry {
                            trial,
                            outcome: StepOutcome::BacktrackingDecreasingTime,
                        });
                        self.bisect(policy)
                    }
                }
            }
            Verdict::Bad => {
                let Some(good) = self.last_good().map(TrialResult::duration) else {
                    return Err(CalibrationError::Misconfigured { duration });
                };
                let outcome = if self.last_bad.is_none() {
                    StepOutcome::FirstOvershoot
                } else {
                    StepOutcome::BacktrackingIncreasingTime
                };
                self.last_bad = Some(index);
                self.phase = SearchPhase::Backtracking;

                if (good - duration).abs() < MIN_BRACKET_WIDTH_S {
                    self.history.push(HistoryEntry {
                        trial,
                        outcome: StepOutcome::BracketExhausted,
                    });
                    self.optimal = self.last_good;
                    self.phase = SearchPhase::Converged;
                    return Ok((self, Transition::Converged));
                }
                self.history.push(HistoryEntry { trial, outcome });
                self.bisect(policy)
            }
        }
    }

    /// Decrement shrinks from the configured maximum towards the policy minimum as the
    /// trial's worst error or effort ratio approaches its target.
    fn decrement_after(&self, trial: &TrialResult, policy: &SearchPolicy) -> f64 {
        let eval = trial.evaluation();
        let max = self.targets.travel_duration_decrement_by_max_seconds;
        let min = policy.travel_duration_decrement_by_min_seconds.min(max);
        let error_ratio =
            eval.error_percent.unwrap_or(0.0) / self.targets.goal_error_percentage_target;
        let effort_ratio = eval.max_abs_effort_percent / self.targets.effort_percent_target;
        let closeness = error_ratio.max(effort_ratio).clamp(0.0, 1.0);
        max - (max - min) * closeness
    }

    fn bisect(mut self, policy: &SearchPolicy) -> Result<(Self, Transition), CalibrationError> {
        let (Some(good), Some(bad)) = (self.last_good(), self.last_bad()) else {
            return Err(CalibrationError::AlreadyConverged);
        };
        let width = good.duration() - bad.duration();
        let next = if bad.record().safety_stop == Some(SafetyStop::EffortLimit) {
            good.duration() - width * (0.5 - policy.safety_backoff_fraction)
        } else {
            bad.duration() + width / 2.0
        };
        if next <= 0.0 {
            return Err(CalibrationError::NonPositiveDuration { proposed: next });
        }
        self.next_duration = next;
        Ok((self, Transition::Next(next)))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
