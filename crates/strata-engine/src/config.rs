//! Engine configuration loaded from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration describing a
//! 60 Hz framework with no scenes and a `warn` log filter.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds per frame passed to `Scene::update`.
    /// Must be positive and finite.
    pub frame_time: f64,
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Scenes created when the framework starts.
    pub scenes: Vec<SceneConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_time: 1.0 / 60.0,
            log_filter: "warn".to_owned(),
            scenes: Vec::new(),
        }
    }
}

/// One scene to create at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    #[serde(default)]
    pub view_enabled: bool,
    #[serde(default = "default_authority")]
    pub authority: bool,
}

fn default_authority() -> bool {
    true
}

impl SceneConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            view_enabled: false,
            authority: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), scenes = config.scenes.len(), "loaded engine config");
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the frame time and that scene names are non-empty and unique.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.frame_time > 0.0 && self.frame_time.is_finite()) {
            return Err(EngineError::Config {
                details: format!("frame_time must be positive and finite, got {}", self.frame_time),
            });
        }
        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if scene.name.trim().is_empty() {
                return Err(EngineError::Config {
                    details: "scene names must not be empty".to_owned(),
                });
            }
            if !seen.insert(scene.name.as_str()) {
                return Err(EngineError::Config {
                    details: format!("scene {:?} is listed more than once", scene.name),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!((config.frame_time - 1.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn scene_flags_default_to_headless_authority() {
        let config = EngineConfig::from_json_str(r#"{"scenes":[{"name":"world"}]}"#).unwrap();
        assert_eq!(config.scenes, vec![SceneConfig::new("world")]);
    }

    #[test]
    fn rejects_non_positive_frame_time() {
        let err = EngineConfig::from_json_str(r#"{"frame_time":0.0}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
        let err = EngineConfig::from_json_str(r#"{"frame_time":-1.0}"#).unwrap_err();
        assert!(err.to_string().contains("frame_time"));
    }

    #[test]
    fn rejects_duplicate_and_blank_scene_names() {
        let dup = r#"{"scenes":[{"name":"a"},{"name":"a"}]}"#;
        assert!(matches!(
            EngineConfig::from_json_str(dup),
            Err(EngineError::Config { .. })
        ));
        let blank = r#"{"scenes":[{"name":"  "}]}"#;
        assert!(EngineConfig::from_json_str(blank).is_err());
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ scenes: "),
            Err(EngineError::Json(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let mut config = EngineConfig::default();
        config.scenes.push(SceneConfig {
            name: "client".to_owned(),
            view_enabled: true,
            authority: false,
        });
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }
}
