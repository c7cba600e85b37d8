use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::model::Preset;

pub const DEFAULT_STATE_DIR: &str = ".hemomatch";
pub const CONFIG_FILE: &str = "config.json";

/// Workspace configuration for the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Radius at which the distance factor saturates at 1.0.
    #[serde(default = "default_max_relevant_km")]
    pub max_relevant_km: f64,

    /// How many matches a performance snapshot lists, most recent first.
    #[serde(default = "default_recent_matches")]
    pub recent_matches: usize,

    /// Optional policy floor; rankings drop candidates scoring below it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_match_score: Option<f64>,

    /// Preset published as version 1 of a fresh weight history.
    #[serde(default = "default_preset")]
    pub initial_preset: Preset,
}

fn default_max_relevant_km() -> f64 {
    50.0
}

fn default_recent_matches() -> usize {
    10
}

fn default_preset() -> Preset {
    Preset::Balanced
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_relevant_km: default_max_relevant_km(),
            recent_matches: default_recent_matches(),
            min_match_score: None,
            initial_preset: default_preset(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_relevant_km.is_finite() || self.max_relevant_km <= 0.0 {
            return Err(ConfigError::InvalidRadius(self.max_relevant_km));
        }
        Ok(())
    }

    /// Load `<state_dir>/config.json`. A missing file yields the defaults;
    /// an unreadable or invalid file is an error.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("{}: invalid config JSON", path.display()))?;
        config
            .validate()
            .with_context(|| format!("{}: invalid config", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("cannot create {}", state_dir.display()))?;
        let path = state_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("cannot write config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_relevant_km, 50.0);
        assert_eq!(config.recent_matches, 10);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"max_relevant_km": 25.0, "initial_preset": "urgencyFocused"}"#,
        )
        .unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_relevant_km, 25.0);
        assert_eq!(config.recent_matches, 10);
        assert_eq!(config.initial_preset, Preset::UrgencyFocused);
    }

    #[test]
    fn zero_radius_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"max_relevant_km": 0}"#).unwrap();
        assert!(EngineConfig::load(dir.path()).is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            min_match_score: Some(120.0),
            ..EngineConfig::default()
        };
        config.save(dir.path()).unwrap();
        assert_eq!(EngineConfig::load(dir.path()).unwrap(), config);
    }
}
