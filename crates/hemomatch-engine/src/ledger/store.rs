use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use hemomatch_core::model::Preset;

use super::atomic::atomic_write;
use crate::weights::config::{WeightConfig, WeightVersion};

/// File layout of a state directory.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn weights_path(&self) -> PathBuf {
        self.root.join("weights.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("matches.jsonl")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("matches.checkpoint.json")
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("cannot create state dir {}", self.root.display()))
    }
}

/// On-disk form of a weight history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightHistoryFile {
    active: u64,
    versions: Vec<WeightVersion>,
}

/// Load the weight history, or start a fresh one from `initial`.
pub fn load_weights(path: &Path, initial: Preset) -> Result<WeightConfig> {
    if !path.exists() {
        return Ok(WeightConfig::new(initial));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read weights {}", path.display()))?;
    let file: WeightHistoryFile = serde_json::from_str(&content)
        .with_context(|| format!("{}: invalid weights JSON", path.display()))?;
    WeightConfig::restore(file.versions, file.active)
        .with_context(|| format!("{}: corrupt weight history", path.display()))
}

pub fn save_weights(path: &Path, config: &WeightConfig) -> Result<()> {
    write_history(path, config.current().version, config.history())
}

/// Persist a history that has not been published yet, with `active` as its
/// active version.
pub fn save_pending_weights(
    path: &Path,
    active: u64,
    versions: &[Arc<WeightVersion>],
) -> Result<()> {
    write_history(path, active, versions.iter().map(|v| v.as_ref().clone()).collect())
}

fn write_history(path: &Path, active: u64, versions: Vec<WeightVersion>) -> Result<()> {
    let file = WeightHistoryFile { active, versions };
    let json = serde_json::to_string_pretty(&file)?;
    atomic_write(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemomatch_core::model::WeightTriple;

    #[test]
    fn missing_file_starts_from_initial_preset() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        let config = load_weights(&state.weights_path(), Preset::DonorFocused).unwrap();
        assert_eq!(config.current().weights, Preset::DonorFocused.weights());
    }

    #[test]
    fn history_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        let config = WeightConfig::default();
        config.set_weights(WeightTriple::new(2.0, 2.0, 2.0)).unwrap();
        config.apply_preset("urgencyFocused").unwrap();
        save_weights(&state.weights_path(), &config).unwrap();

        let loaded = load_weights(&state.weights_path(), Preset::Balanced).unwrap();
        assert_eq!(loaded.current().version, 3);
        assert_eq!(loaded.history(), config.history());
    }

    #[test]
    fn out_of_bounds_history_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let config = WeightConfig::default();
        save_weights(&path, &config).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        doc["versions"][0]["weights"]["rus_weight"] = serde_json::json!(9.0);
        std::fs::write(&path, doc.to_string()).unwrap();

        assert!(load_weights(&path, Preset::Balanced).is_err());
    }
}
