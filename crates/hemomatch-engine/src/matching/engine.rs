use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use hemomatch_core::errors::MatchError;
use hemomatch_core::model::{Donor, MatchRecord, Request};
use hemomatch_core::traits::ReadinessPort;
use hemomatch_core::types::Outcome;

use super::ranking::{RankedDonor, Ranking};
use crate::scoring::distance::DistanceEngine;
use crate::scoring::urgency::UrgencyScorer;
use crate::weights::config::{WeightConfig, WeightVersion};

/// Combines urgency, readiness and proximity into a match score.
///
/// Holds no mutable state of its own; the only shared state is the
/// `WeightConfig`, read once per `score` or `rank` call.
pub struct MatchEngine<R> {
    weights: Arc<WeightConfig>,
    distance: DistanceEngine,
    urgency: UrgencyScorer,
    readiness: R,
}

impl<R: ReadinessPort> MatchEngine<R> {
    pub fn new(weights: Arc<WeightConfig>, distance: DistanceEngine, readiness: R) -> Self {
        Self {
            weights,
            distance,
            urgency: UrgencyScorer,
            readiness,
        }
    }

    pub fn weights(&self) -> &Arc<WeightConfig> {
        &self.weights
    }

    pub fn score(&self, request: &Request, donor: &Donor) -> Result<MatchRecord, MatchError> {
        self.score_at(request, donor, Utc::now())
    }

    pub fn score_at(
        &self,
        request: &Request,
        donor: &Donor,
        now: DateTime<Utc>,
    ) -> Result<MatchRecord, MatchError> {
        let weights = self.weights.current();
        let rus = self.urgency.score_at(request, now);
        self.score_with(&weights, request, rus, donor, now)
    }

    pub fn rank(&self, request: &Request, donors: &[Donor]) -> Result<Ranking, MatchError> {
        self.rank_at(request, donors, Utc::now())
    }

    /// Score every donor under one weight snapshot and order best-first.
    ///
    /// Fails on the first donor whose readiness or location is invalid.
    pub fn rank_at(
        &self,
        request: &Request,
        donors: &[Donor],
        now: DateTime<Utc>,
    ) -> Result<Ranking, MatchError> {
        let weights = self.weights.current();
        let rus = self.urgency.score_at(request, now);

        let ranked = donors
            .iter()
            .map(|donor| {
                let record = self.score_with(&weights, request, rus, donor, now)?;
                Ok(RankedDonor {
                    donor: donor.clone(),
                    record,
                })
            })
            .collect::<Result<Vec<_>, MatchError>>()?;

        debug!(
            request_id = %request.id,
            candidates = ranked.len(),
            weights_version = weights.version,
            rus,
            "ranked donors"
        );
        Ok(Ranking::new(weights.version, ranked))
    }

    fn score_with(
        &self,
        weights: &WeightVersion,
        request: &Request,
        rus: u8,
        donor: &Donor,
        now: DateTime<Utc>,
    ) -> Result<MatchRecord, MatchError> {
        let drs = self.readiness.readiness(&donor.id)?;
        if !drs.is_finite() || !(0.0..=100.0).contains(&drs) {
            return Err(MatchError::InvalidReadinessScore {
                donor_id: donor.id.clone(),
                value: drs,
            });
        }
        let distance_factor = self.distance.factor(&request.location, &donor.location)?;

        let w = weights.weights;
        let match_score = w.rus_weight * f64::from(rus) + w.drs_weight * drs
            - w.distance_weight * distance_factor;

        Ok(MatchRecord {
            request_id: request.id.clone(),
            donor_id: donor.id.clone(),
            rus,
            drs,
            distance_factor,
            weights_version: weights.version,
            match_score,
            timestamp: now,
            outcome: Outcome::Pending,
            response_time_minutes: None,
            outcome_at: None,
            donation_count: donor.donation_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use hemomatch_core::model::{Preset, WeightTriple};
    use hemomatch_core::traits::TableReadiness;
    use hemomatch_core::types::{BloodType, GeoPoint, UrgencyLevel};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    fn request() -> Request {
        Request {
            id: "req-9".into(),
            blood_type: BloodType::ONeg,
            urgency_level: UrgencyLevel::Standard,
            created_at: now(),
            tags: Default::default(),
            location: GeoPoint::new(0.0, 0.0),
        }
    }

    fn donor(id: &str, lat: f64) -> Donor {
        Donor {
            id: id.into(),
            blood_type: BloodType::ONeg,
            location: GeoPoint::new(lat, 0.0),
            readiness_score: None,
            donation_count: None,
        }
    }

    fn engine(port: TableReadiness) -> MatchEngine<TableReadiness> {
        MatchEngine::new(
            Arc::new(WeightConfig::default()),
            DistanceEngine::default(),
            port,
        )
    }

    #[test]
    fn score_combines_weights() {
        let engine = engine(TableReadiness::default().with("d1", 80.0));
        let record = engine.score_at(&request(), &donor("d1", 0.0), now()).unwrap();
        assert_eq!(record.rus, 75);
        assert_eq!(record.drs, 80.0);
        assert_eq!(record.distance_factor, 0.0);
        assert_eq!(record.weights_version, 1);
        assert_eq!(record.outcome, Outcome::Pending);
        // 1.5 * 75 + 1.2 * 80 - 0.8 * 0
        assert!((record.match_score - 208.5).abs() < 1e-9);
    }

    #[test]
    fn distance_is_subtracted() {
        let engine = engine(TableReadiness::default().with("far", 50.0));
        let far = donor("far", 10.0);
        let record = engine.score_at(&request(), &far, now()).unwrap();
        assert_eq!(record.distance_factor, 1.0);
        assert!((record.match_score - (112.5 + 60.0 - 0.8)).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_readiness_is_fatal() {
        for bad in [-0.5, 100.5, f64::NAN] {
            let engine = engine(TableReadiness::default().with("d1", bad));
            let err = engine.score_at(&request(), &donor("d1", 0.0), now()).unwrap_err();
            assert!(matches!(err, MatchError::InvalidReadinessScore { .. }), "{bad}");
        }
    }

    #[test]
    fn readiness_failure_propagates() {
        let engine = engine(TableReadiness::default());
        let err = engine.score_at(&request(), &donor("d1", 0.0), now()).unwrap_err();
        assert!(matches!(err, MatchError::ReadinessUnavailable { .. }));
    }

    #[test]
    fn bad_donor_location_rejected() {
        let engine = engine(TableReadiness::default().with("d1", 10.0));
        let mut d = donor("d1", 0.0);
        d.location = GeoPoint::new(0.0, 200.0);
        assert!(matches!(
            engine.score_at(&request(), &d, now()),
            Err(MatchError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn rank_orders_best_first() {
        let port = TableReadiness::default()
            .with("low", 20.0)
            .with("high", 90.0)
            .with("mid", 55.0);
        let engine = engine(port);
        let donors = vec![donor("low", 0.0), donor("high", 0.1), donor("mid", 0.0)];
        let ids: Vec<String> = engine
            .rank_at(&request(), &donors, now())
            .unwrap()
            .map(|r| r.donor.id)
            .collect();
        assert_eq!(ids, ["high", "mid", "low"]);
    }

    #[test]
    fn ties_break_on_drs_then_distance_then_id() {
        // Equal match scores built by trading DRS against distance under
        // weights (1, 1, 1): 50 + 60 - 0 == 50 + 61 - 1
        let config = Arc::new(WeightConfig::default());
        config.set_weights(WeightTriple::new(1.0, 1.0, 1.0)).unwrap();
        let port = TableReadiness::default()
            .with("near", 60.0)
            .with("far", 61.0)
            .with("b-twin", 60.0)
            .with("a-twin", 60.0);
        let engine = MatchEngine::new(config, DistanceEngine::default(), port);

        let mut req = request();
        req.blood_type = BloodType::OPos; // rus 50
        // one degree north is past the 50 km radius, so the factor is exactly 1.0
        let donors = vec![
            donor("b-twin", 0.0),
            donor("near", 0.0),
            donor("far", 1.0),
            donor("a-twin", 0.0),
        ];
        let ranked: Vec<RankedDonor> = engine.rank_at(&req, &donors, now()).unwrap().collect();
        let scores: Vec<f64> = ranked.iter().map(|r| r.record.match_score).collect();
        assert!(scores.iter().all(|s| (*s - 110.0).abs() < 1e-9), "{scores:?}");

        let ids: Vec<&str> = ranked.iter().map(|r| r.donor.id.as_str()).collect();
        assert_eq!(ids, ["far", "a-twin", "b-twin", "near"]);
    }

    #[test]
    fn rank_is_deterministic_for_fixed_version() {
        let port = TableReadiness::default()
            .with("a", 40.0)
            .with("b", 40.0)
            .with("c", 70.0);
        let engine = engine(port);
        let donors = vec![donor("c", 0.2), donor("b", 0.1), donor("a", 0.1)];
        let first: Vec<_> = engine.rank_at(&request(), &donors, now()).unwrap().collect();
        let second: Vec<_> = engine.rank_at(&request(), &donors, now()).unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rank_rereads_weights_each_call() {
        let port = TableReadiness::default().with("ready", 100.0).with("near", 10.0);
        let engine = engine(port);
        let mut req = request();
        req.created_at = now() - Duration::hours(48);
        req.urgency_level = UrgencyLevel::Critical;
        let donors = vec![donor("ready", 0.3), donor("near", 0.0)];

        let before = engine.rank_at(&req, &donors, now()).unwrap();
        assert_eq!(before.weights_version(), 1);
        assert_eq!(before.map(|r| r.donor.id).next().unwrap(), "ready");

        engine.weights().apply_preset(Preset::ProximityFocused.name()).unwrap();
        let after = engine.rank_at(&req, &donors, now()).unwrap();
        assert_eq!(after.weights_version(), 2);
        assert!(after.map(|r| r.record.weights_version).all(|v| v == 2));
    }

    #[test]
    fn record_carries_reported_donation_count() {
        let engine = engine(TableReadiness::default().with("d", 50.0));
        let mut d = donor("d", 0.1);
        d.donation_count = Some(9);
        let record = engine.score_at(&request(), &d, now()).unwrap();
        assert_eq!(record.donation_count, Some(9));
    }

    #[test]
    fn floor_drops_low_scores() {
        let port = TableReadiness::default().with("a", 90.0).with("b", 10.0);
        let engine = engine(port);
        let donors = vec![donor("a", 0.0), donor("b", 0.0)];
        let kept: Vec<_> = engine
            .rank_at(&request(), &donors, now())
            .unwrap()
            .above_floor(Some(150.0))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].donor.id, "a");
    }
}
