// src/error.rs - Calibration error taxonomy
use crate::persistence::PersistenceError;
use stretch_shared::{JointError, TrajectoryError};
use thiserror::Error;

/// Everything that ends a calibration run early.
///
/// Effort and runstop aborts are not errors: they are recorded on the trial and feed
/// the search like any other failed trial.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Joint error: {0}")]
    Joint(#[from] JointError),
    #[error("Invalid trajectory: {0}")]
    Trajectory(#[from] TrajectoryError),
    #[error("First trial at {duration}s already misses the targets; raise the start duration")]
    Misconfigured { duration: f64 },
    #[error("Next travel duration would be {proposed}s; durations must stay positive")]
    NonPositiveDuration { proposed: f64 },
    #[error("Calibration has already converged")]
    AlreadyConverged,
    #[error("No convergence after {trials} trials")]
    TrialLimitExceeded { trials: usize },
    #[error("Trial produced no telemetry samples")]
    NoSamples,
    #[error("Joint did not reach {target:.3} m before the positioning timeout")]
    PositioningTimeout { target: f64 },
    #[error("Joint '{joint}' is not homed")]
    NotHomed { joint: String },
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Console IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Calibration aborted by operator")]
    Aborted,
}
