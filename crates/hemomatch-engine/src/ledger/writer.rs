use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use hemomatch_core::config::EngineConfig;
use hemomatch_core::model::{Donor, MatchRecord, Request, WeightTriple};
use hemomatch_core::traits::ReadinessPort;
use hemomatch_core::types::Outcome;

use super::atomic::StateLock;
use super::chain::{append_event, read_entries};
use super::replay::rebuild_tracker;
use super::store::{load_weights, save_pending_weights, StateDir};
use super::LedgerEvent;
use crate::matching::engine::MatchEngine;
use crate::matching::ranking::RankedDonor;
use crate::scoring::distance::DistanceEngine;
use crate::tracker::performance::PerformanceTracker;
use crate::weights::config::{WeightConfig, WeightVersion};

/// Engine state loaded from a state directory.
///
/// Mutations follow one protocol: hold the directory lock, validate, append
/// the ledger event, atomically rewrite any snapshot file, and only then
/// apply the change in memory. A failed write leaves the session as it was.
/// Read-only sessions skip the lock and refuse to mutate.
pub struct EngineSession {
    state: StateDir,
    config: EngineConfig,
    weights: Arc<WeightConfig>,
    tracker: PerformanceTracker,
    lock: Option<StateLock>,
}

impl EngineSession {
    pub fn open(state_dir: &Path, config: EngineConfig) -> Result<Self> {
        Self::load(StateDir::new(state_dir), config, None)
    }

    pub fn open_for_write(state_dir: &Path, config: EngineConfig) -> Result<Self> {
        let state = StateDir::new(state_dir);
        state.ensure()?;
        let lock = StateLock::acquire(state.root())
            .with_context(|| format!("cannot lock state {}", state.root().display()))?;
        Self::load(state, config, Some(lock))
    }

    fn load(state: StateDir, config: EngineConfig, lock: Option<StateLock>) -> Result<Self> {
        config.validate()?;
        let weights = load_weights(&state.weights_path(), config.initial_preset)?;
        let entries = read_entries(&state.ledger_path())?;
        let tracker = rebuild_tracker(&entries, config.recent_matches)?;
        Ok(Self {
            state,
            config,
            weights: Arc::new(weights),
            tracker,
            lock,
        })
    }

    pub fn state(&self) -> &StateDir {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn weights(&self) -> &Arc<WeightConfig> {
        &self.weights
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn engine<R: ReadinessPort>(&self, readiness: R) -> Result<MatchEngine<R>> {
        let distance = DistanceEngine::new(self.config.max_relevant_km)?;
        Ok(MatchEngine::new(Arc::clone(&self.weights), distance, readiness))
    }

    pub fn set_weights(&self, triple: WeightTriple) -> Result<Arc<WeightVersion>> {
        self.ensure_writable()?;
        self.weights
            .set_weights_with(triple, |candidate, pending| self.persist_weights(candidate, pending))
    }

    pub fn apply_preset(&self, name: &str) -> Result<Arc<WeightVersion>> {
        self.ensure_writable()?;
        self.weights
            .apply_preset_with(name, |candidate, pending| self.persist_weights(candidate, pending))
    }

    /// Rank donors and return the candidates that clear the configured floor,
    /// up to `limit`. With `record`, each returned match is appended to the
    /// tracker and the ledger.
    pub fn rank<R: ReadinessPort>(
        &self,
        readiness: R,
        request: &Request,
        donors: &[Donor],
        limit: Option<usize>,
        record: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedDonor>> {
        if record {
            self.ensure_writable()?;
        }
        let engine = self.engine(readiness)?;
        let ranking = engine.rank_at(request, donors, now)?;
        let ranked: Vec<RankedDonor> = ranking
            .above_floor(self.config.min_match_score)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        if record {
            for r in &ranked {
                self.record_match(r.record.clone())?;
            }
            info!(request_id = %request.id, recorded = ranked.len(), "recorded ranked matches");
        }
        Ok(ranked)
    }

    pub fn record_match(&self, record: MatchRecord) -> Result<()> {
        self.ensure_writable()?;
        append_event(
            &self.state.ledger_path(),
            &LedgerEvent::MatchScored {
                record: record.clone(),
            },
        )?;
        self.tracker.record(record);
        Ok(())
    }

    pub fn record_outcome(
        &self,
        request_id: &str,
        donor_id: &str,
        outcome: Outcome,
        response_time_minutes: f64,
    ) -> Result<MatchRecord> {
        self.ensure_writable()?;
        self.tracker
            .check_outcome(request_id, donor_id, outcome, response_time_minutes)?;
        let entry = append_event(
            &self.state.ledger_path(),
            &LedgerEvent::OutcomeRecorded {
                request_id: request_id.to_string(),
                donor_id: donor_id.to_string(),
                outcome,
                response_time_minutes,
            },
        )?;
        // stamp with the ledger time so replay reproduces the same record
        let updated = self.tracker.record_outcome_at(
            request_id,
            donor_id,
            outcome,
            response_time_minutes,
            entry.ts,
        )?;
        Ok(updated)
    }

    /// Release the directory lock, reporting any failure to remove it.
    pub fn close(self) -> Result<()> {
        match self.lock {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.lock.is_none() {
            anyhow::bail!(
                "state {} opened read-only",
                self.state.root().display()
            );
        }
        Ok(())
    }

    fn persist_weights(
        &self,
        candidate: &WeightVersion,
        pending: &[Arc<WeightVersion>],
    ) -> Result<()> {
        append_event(
            &self.state.ledger_path(),
            &LedgerEvent::WeightsPublished {
                version: candidate.clone(),
            },
        )?;
        save_pending_weights(&self.state.weights_path(), candidate.version, pending)
    }
}
