//! Files written by the calibration tools: per-trial snapshots under the run directory
//! and the robot's YAML parameter store.

pub mod params;
pub mod snapshot;

pub use params::{ParamStore, YamlParamStore};
pub use snapshot::{SnapshotRecorder, TrialSnapshot};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid parameter key path '{0}'")]
    InvalidKeyPath(String),
}
