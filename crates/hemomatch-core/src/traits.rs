use std::collections::HashMap;

use crate::errors::MatchError;
use crate::model::Donor;

/// Source of Donor Readiness Scores.
///
/// Implementations are owned by the donor-history subsystem. A call must be
/// pure for a given point in time and should return a value in [0, 100];
/// the engine rejects anything else with `InvalidReadinessScore`. Failures
/// or timeouts are reported as `ReadinessUnavailable` and never retried by
/// the engine.
pub trait ReadinessPort {
    fn readiness(&self, donor_id: &str) -> Result<f64, MatchError>;
}

impl<P: ReadinessPort + ?Sized> ReadinessPort for &P {
    fn readiness(&self, donor_id: &str) -> Result<f64, MatchError> {
        (**self).readiness(donor_id)
    }
}

impl<P: ReadinessPort + ?Sized> ReadinessPort for std::sync::Arc<P> {
    fn readiness(&self, donor_id: &str) -> Result<f64, MatchError> {
        (**self).readiness(donor_id)
    }
}

/// Serves the readiness score carried on donor snapshots.
///
/// Donors without a `readiness_score` are reported as unavailable rather
/// than defaulted.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReadiness {
    scores: HashMap<String, Option<f64>>,
}

impl SnapshotReadiness {
    pub fn from_donors(donors: &[Donor]) -> Self {
        let scores = donors
            .iter()
            .map(|d| (d.id.clone(), d.readiness_score))
            .collect();
        Self { scores }
    }
}

impl ReadinessPort for SnapshotReadiness {
    fn readiness(&self, donor_id: &str) -> Result<f64, MatchError> {
        match self.scores.get(donor_id) {
            Some(Some(score)) => Ok(*score),
            Some(None) => Err(MatchError::ReadinessUnavailable {
                donor_id: donor_id.to_string(),
                reason: "donor snapshot carries no readiness score".into(),
            }),
            None => Err(MatchError::ReadinessUnavailable {
                donor_id: donor_id.to_string(),
                reason: "donor not present in snapshot".into(),
            }),
        }
    }
}

/// Fixed lookup table. Useful for tests and replay.
#[derive(Debug, Clone, Default)]
pub struct TableReadiness(pub HashMap<String, f64>);

impl TableReadiness {
    pub fn with(mut self, donor_id: &str, score: f64) -> Self {
        self.0.insert(donor_id.to_string(), score);
        self
    }
}

impl ReadinessPort for TableReadiness {
    fn readiness(&self, donor_id: &str) -> Result<f64, MatchError> {
        self.0
            .get(donor_id)
            .copied()
            .ok_or_else(|| MatchError::ReadinessUnavailable {
                donor_id: donor_id.to_string(),
                reason: "no entry".into(),
            })
    }
}
