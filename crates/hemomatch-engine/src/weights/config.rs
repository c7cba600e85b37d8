use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use hemomatch_core::errors::{ConfigError, MatchError};
use hemomatch_core::model::{Preset, WeightTriple};

/// Where a weight version came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightSource {
    Initial { preset: Preset },
    Manual,
    Preset { preset: Preset },
}

/// One immutable, published weight triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVersion {
    pub version: u64,
    pub weights: WeightTriple,
    pub source: WeightSource,
    pub published_at: DateTime<Utc>,
}

/// Versioned, bounds-checked weight configuration.
///
/// Versions are append-only and numbered from 1. Writers are serialized on
/// the history mutex and publish with a single pointer swap; `current()`
/// loads that pointer without taking any lock, so readers never wait on a
/// writer and never see a partially written triple.
#[derive(Debug)]
pub struct WeightConfig {
    history: Mutex<Vec<Arc<WeightVersion>>>,
    active: ArcSwap<WeightVersion>,
}

impl WeightConfig {
    pub fn new(initial: Preset) -> Self {
        let first = Arc::new(WeightVersion {
            version: 1,
            weights: initial.weights(),
            source: WeightSource::Initial { preset: initial },
            published_at: Utc::now(),
        });
        Self {
            history: Mutex::new(vec![Arc::clone(&first)]),
            active: ArcSwap::new(first),
        }
    }

    /// Rebuild from a persisted history.
    ///
    /// Versions must run 1..=n without gaps, every triple must be in bounds
    /// and `active` must name one of them.
    pub fn restore(versions: Vec<WeightVersion>, active: u64) -> Result<Self, ConfigError> {
        if versions.is_empty() {
            return Err(ConfigError::EmptyHistory);
        }
        for (position, v) in versions.iter().enumerate() {
            let expected = position as u64 + 1;
            if v.version != expected {
                return Err(ConfigError::BrokenChain {
                    position,
                    expected,
                    found: v.version,
                });
            }
            v.weights.validate()?;
        }
        let history: Vec<Arc<WeightVersion>> = versions.into_iter().map(Arc::new).collect();
        let current = history
            .iter()
            .find(|v| v.version == active)
            .cloned()
            .ok_or(ConfigError::MissingActive(active))?;
        Ok(Self {
            history: Mutex::new(history),
            active: ArcSwap::new(current),
        })
    }

    /// Single atomic read of the active version.
    pub fn current(&self) -> Arc<WeightVersion> {
        self.active.load_full()
    }

    pub fn set_weights(&self, weights: WeightTriple) -> Result<Arc<WeightVersion>, MatchError> {
        self.set_weights_with(weights, |_, _| Ok(()))
    }

    pub fn apply_preset(&self, name: &str) -> Result<Arc<WeightVersion>, MatchError> {
        self.apply_preset_with(name, |_, _| Ok(()))
    }

    /// Like `set_weights`, but runs `commit` on the candidate version and the
    /// history it would extend before publishing. An error from `commit`
    /// leaves the configuration unchanged.
    pub fn set_weights_with<E, F>(
        &self,
        weights: WeightTriple,
        commit: F,
    ) -> Result<Arc<WeightVersion>, E>
    where
        E: From<MatchError>,
        F: FnOnce(&WeightVersion, &[Arc<WeightVersion>]) -> Result<(), E>,
    {
        weights.validate()?;
        self.publish(weights, WeightSource::Manual, commit)
    }

    pub fn apply_preset_with<E, F>(&self, name: &str, commit: F) -> Result<Arc<WeightVersion>, E>
    where
        E: From<MatchError>,
        F: FnOnce(&WeightVersion, &[Arc<WeightVersion>]) -> Result<(), E>,
    {
        let preset: Preset = name.parse()?;
        self.publish(preset.weights(), WeightSource::Preset { preset }, commit)
    }

    /// Look up any published version, active or superseded.
    pub fn version(&self, version: u64) -> Result<Arc<WeightVersion>, MatchError> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        version
            .checked_sub(1)
            .and_then(|idx| history.get(idx as usize))
            .cloned()
            .ok_or(MatchError::UnknownVersion(version))
    }

    pub fn history(&self) -> Vec<WeightVersion> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().map(|v| v.as_ref().clone()).collect()
    }

    fn publish<E, F>(
        &self,
        weights: WeightTriple,
        source: WeightSource,
        commit: F,
    ) -> Result<Arc<WeightVersion>, E>
    where
        F: FnOnce(&WeightVersion, &[Arc<WeightVersion>]) -> Result<(), E>,
    {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let version = history.len() as u64 + 1;
        if let Some(last) = history.last() {
            assert_eq!(
                last.version + 1,
                version,
                "weight version chain corrupted: last={} len={}",
                last.version,
                history.len()
            );
        }
        let candidate = Arc::new(WeightVersion {
            version,
            weights,
            source,
            published_at: Utc::now(),
        });

        let mut pending = history.clone();
        pending.push(Arc::clone(&candidate));
        commit(&candidate, &pending)?;
        *history = pending;

        // Swap while still holding the history mutex so publications are
        // observed in version order.
        self.active.store(Arc::clone(&candidate));
        drop(history);

        info!(
            version,
            source = ?candidate.source,
            rus_weight = weights.rus_weight,
            drs_weight = weights.drs_weight,
            distance_weight = weights.distance_weight,
            "published weights"
        );
        Ok(candidate)
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self::new(Preset::Balanced)
    }
}
