// src/persistence/params.rs - Dotted key-path access to the robot's YAML parameters
use crate::persistence::PersistenceError;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Hierarchical parameter storage addressed by dotted keys such as
/// `arm.motion.trajectory_max.linear.positive.vel_m`.
pub trait ParamStore {
    fn get(&self, key_path: &str) -> Option<&Value>;
    fn set(&mut self, key_path: &str, value: Value) -> Result<(), PersistenceError>;
    fn save(&self) -> Result<(), PersistenceError>;
}

/// Parameter store backed by one YAML file. Changes stay in memory until [`ParamStore::save`].
#[derive(Debug, Clone)]
pub struct YamlParamStore {
    path: PathBuf,
    root: Value,
}

impl YamlParamStore {
    /// Load `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let root = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<Value>(&contents)? {
                Value::Null => Value::Mapping(Mapping::new()),
                value => value,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Mapping(Mapping::new()),
            Err(e) => {
                tracing::error!("Failed to read parameter file '{}': {}", path.display(), e);
                return Err(e.into());
            }
        };
        Ok(Self { path, root })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn split_key_path(key_path: &str) -> Result<Vec<&str>, PersistenceError> {
    let keys: Vec<&str> = key_path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(PersistenceError::InvalidKeyPath(key_path.to_string()));
    }
    Ok(keys)
}

impl ParamStore for YamlParamStore {
    fn get(&self, key_path: &str) -> Option<&Value> {
        let keys = split_key_path(key_path).ok()?;
        keys.iter().try_fold(&self.root, |node, key| node.get(*key))
    }

    fn set(&mut self, key_path: &str, value: Value) -> Result<(), PersistenceError> {
        let keys = split_key_path(key_path)?;
        let invalid = || PersistenceError::InvalidKeyPath(key_path.to_string());
        let (last, parents) = keys.split_last().ok_or_else(invalid)?;

        let mut node = &mut self.root;
        for key in parents {
            node = match node {
                Value::Mapping(map) => {
                    let key = Value::String(key.to_string());
                    if !map.contains_key(&key) {
                        map.insert(key.clone(), Value::Mapping(Mapping::new()));
                    }
                    map.get_mut(&key).ok_or_else(invalid)?
                }
                _ => return Err(invalid()),
            };
        }
        match node {
            Value::Mapping(map) => {
                map.insert(Value::String(last.to_string()), value);
                Ok(())
            }
            _ => Err(invalid()),
        }
    }

    fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_yaml::to_string(&self.root)?)?;
        tracing::info!("Saved parameters to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_creates_intermediate_tables() {
        let dir = tempdir().unwrap();
        let mut store = YamlParamStore::open(dir.path().join("params.yaml")).unwrap();
        store.set("arm.motion.trajectory_max.linear.positive.vel_m", 0.21.into()).unwrap();
        store.set("arm.motion.trajectory_max.linear.negative.vel_m", 0.19.into()).unwrap();
        assert_eq!(
            store.get("arm.motion.trajectory_max.linear.positive.vel_m"),
            Some(&Value::from(0.21))
        );
        assert!(store.get("arm.motion.trajectory_max.cubic").is_none());
    }

    #[test]
    fn rejects_empty_segments_and_scalar_parents() {
        let dir = tempdir().unwrap();
        let mut store = YamlParamStore::open(dir.path().join("params.yaml")).unwrap();
        assert!(matches!(
            store.set("arm..vel_m", 1.0.into()),
            Err(PersistenceError::InvalidKeyPath(_))
        ));
        store.set("arm.gains", 3.0.into()).unwrap();
        assert!(matches!(
            store.set("arm.gains.pKp_d", 1.0.into()),
            Err(PersistenceError::InvalidKeyPath(_))
        ));
    }

    #[test]
    fn save_and_reopen_keeps_existing_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.yaml");
        std::fs::write(&path, "robot:\n  serial_no: stretch-re2-0001\n").unwrap();

        let mut store = YamlParamStore::open(&path).unwrap();
        store.set("lift.motion.trajectory_max.quintic.positive.accel_m", 0.4.into()).unwrap();
        store.save().unwrap();

        let reopened = YamlParamStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("robot.serial_no"),
            Some(&Value::String("stretch-re2-0001".to_string()))
        );
        assert_eq!(
            reopened.get("lift.motion.trajectory_max.quintic.positive.accel_m"),
            Some(&Value::from(0.4))
        );
    }
}
