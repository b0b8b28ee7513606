//! Trajectory dynamic-limit calibration.
//!
//! A session runs the [`executor`] once per trial, classifies the result with the
//! [`evaluator`], and lets the [`controller`] pick the next duration until each
//! profile and direction converges. [`limits`] turns the optimal trials into the
//! velocity and acceleration limits written to the parameter store.

pub mod controller;
pub mod evaluator;
pub mod executor;
pub mod limits;
pub mod session;
pub mod targets;

pub use controller::{CalibrationState, HistoryEntry, SearchPhase, StepOutcome, Transition};
pub use evaluator::{TrialEvaluation, TrialResult, Verdict, classify, evaluate};
pub use executor::{ExecutorSettings, MotionExecutor, SafetyStop, TrialRecord};
pub use limits::DynamicLimits;
pub use session::{CalibrationSession, ProfileCalibration, SessionReport};
pub use targets::{CalibrationTargets, Direction, SearchPolicy};
