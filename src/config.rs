use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity given to workspaces created by the data model itself.
    pub gravity: Vec3,
    /// Fixed simulation step in seconds.
    pub timestep: f32,
    pub max_substeps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -196.2, 0.0),
            timestep: 1.0 / 60.0,
            max_substeps: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of undo states kept before the oldest is evicted.
    pub undo_capacity: usize,
    pub physics: PhysicsConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_capacity: 256,
            physics: PhysicsConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("[config] loaded editor config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.undo_capacity == 0 {
            return Err(ConfigError::Invalid("undo_capacity must be at least 1".into()));
        }
        if !(self.physics.timestep.is_finite() && self.physics.timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "physics.timestep must be positive, got {}",
                self.physics.timestep
            )));
        }
        if self.physics.max_substeps == 0 {
            return Err(ConfigError::Invalid("physics.max_substeps must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = EditorConfig::from_json_str(r#"{ "undo_capacity": 8 }"#).expect("parse");
        assert_eq!(config.undo_capacity, 8);
        assert_eq!(config.physics, PhysicsConfig::default());
    }

    #[test]
    fn nested_physics_overrides_are_applied() {
        let config = EditorConfig::from_json_str(
            r#"{ "physics": { "gravity": [0.0, -9.81, 0.0], "max_substeps": 2 } }"#,
        )
        .expect("parse");
        assert_eq!(config.physics.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.physics.max_substeps, 2);
        assert_eq!(config.undo_capacity, EditorConfig::default().undo_capacity);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EditorConfig::from_json_str(r#"{ "undo_capacity": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_json_str(r#"{ "physics": { "timestep": -1.0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("editor.json");
        std::fs::write(&path, r#"{ "undo_capacity": 3 }"#).expect("write config");
        let config = EditorConfig::load(&path).expect("load");
        assert_eq!(config.undo_capacity, 3);
        assert!(matches!(
            EditorConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
