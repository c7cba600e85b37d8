use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use hemomatch_core::model::Request;
use hemomatch_core::types::{BloodType, UrgencyLevel};

pub const RUS_MAX: u8 = 100;
const BASE_SCORE: f64 = 5.0;
const HOURS_PER_FACTOR: f64 = 24.0;
const TIME_FACTOR_CAP: f64 = 1.5;

/// Every intermediate value that went into a Request Urgency Score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UrgencyBreakdown {
    pub age_hours: f64,
    pub rarity_factor: f64,
    pub time_factor: f64,
    pub urgency_multiplier: f64,
    pub base_score: f64,
    pub raw_score: f64,
    pub rus: u8,
}

/// Computes the Request Urgency Score (0-100).
///
/// Tags on the request are accepted but not weighted.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrgencyScorer;

impl UrgencyScorer {
    pub fn score(&self, request: &Request) -> u8 {
        self.score_at(request, Utc::now())
    }

    pub fn score_at(&self, request: &Request, now: DateTime<Utc>) -> u8 {
        self.breakdown_at(request, now).rus
    }

    pub fn breakdown_at(&self, request: &Request, now: DateTime<Utc>) -> UrgencyBreakdown {
        // Future-dated requests score as age 0
        let age_hours = ((now - request.created_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
        let rarity_factor = rarity_factor(&request.blood_type);
        let time_factor = (age_hours / HOURS_PER_FACTOR).min(TIME_FACTOR_CAP);

        let urgency_multiplier = urgency_multiplier(&request.urgency_level);
        if let UrgencyLevel::Other(label) = &request.urgency_level {
            warn!(
                request_id = %request.id,
                label = %label,
                "urgency level has no tier; using default multiplier 1.0"
            );
        }

        let base_score = BASE_SCORE * urgency_multiplier;
        let raw_score = base_score * (1.0 + rarity_factor) * (1.0 + time_factor);
        let rus = (raw_score * 10.0).round().min(f64::from(RUS_MAX)) as u8;

        UrgencyBreakdown {
            age_hours,
            rarity_factor,
            time_factor,
            urgency_multiplier,
            base_score,
            raw_score,
            rus,
        }
    }
}

/// Rarity bonus by blood type. Unrecognized types earn no bonus.
pub fn rarity_factor(blood_type: &BloodType) -> f64 {
    match blood_type {
        BloodType::ONeg => 0.50,
        BloodType::AbPos => 0.40,
        BloodType::BNeg | BloodType::AbNeg => 0.30,
        BloodType::ANeg => 0.20,
        BloodType::BPos => 0.10,
        BloodType::APos => 0.05,
        BloodType::OPos | BloodType::Unrecognized(_) => 0.0,
    }
}

/// Multiplier by urgency tier; unknown labels fall through to 1.0.
pub fn urgency_multiplier(level: &UrgencyLevel) -> f64 {
    match level {
        UrgencyLevel::Critical => 2.0,
        UrgencyLevel::Urgent => 1.5,
        UrgencyLevel::Standard | UrgencyLevel::Other(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use hemomatch_core::types::GeoPoint;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn request(blood: BloodType, level: UrgencyLevel, age: Duration) -> Request {
        Request {
            id: "req-1".into(),
            blood_type: blood,
            urgency_level: level,
            created_at: now() - age,
            tags: Default::default(),
            location: GeoPoint::new(0.0, 0.0),
        }
    }

    #[test]
    fn critical_o_neg_after_48h_saturates() {
        let req = request(BloodType::ONeg, UrgencyLevel::Critical, Duration::hours(48));
        let b = UrgencyScorer.breakdown_at(&req, now());
        assert_eq!(b.time_factor, 1.5);
        assert_eq!(b.rarity_factor, 0.5);
        assert_eq!(b.urgency_multiplier, 2.0);
        assert_eq!(b.base_score, 10.0);
        assert_eq!(b.raw_score, 37.5);
        assert_eq!(b.rus, 100);
    }

    #[test]
    fn fresh_standard_o_neg_is_75() {
        let req = request(BloodType::ONeg, UrgencyLevel::Standard, Duration::zero());
        let b = UrgencyScorer.breakdown_at(&req, now());
        assert_eq!(b.time_factor, 0.0);
        assert_eq!(b.raw_score, 7.5);
        assert_eq!(b.rus, 75);
    }

    #[test]
    fn future_request_scores_as_fresh() {
        let future = request(BloodType::APos, UrgencyLevel::Urgent, Duration::hours(-5));
        let fresh = request(BloodType::APos, UrgencyLevel::Urgent, Duration::zero());
        assert_eq!(UrgencyScorer.breakdown_at(&future, now()).age_hours, 0.0);
        assert_eq!(
            UrgencyScorer.score_at(&future, now()),
            UrgencyScorer.score_at(&fresh, now())
        );
    }

    #[test]
    fn unknown_labels_use_defaults() {
        let high = request(
            BloodType::Unrecognized("??".into()),
            UrgencyLevel::Other("High".into()),
            Duration::zero(),
        );
        let plain = request(BloodType::OPos, UrgencyLevel::Standard, Duration::zero());
        assert_eq!(UrgencyScorer.score_at(&high, now()), 50);
        assert_eq!(UrgencyScorer.score_at(&plain, now()), 50);
    }

    #[test]
    fn tags_do_not_change_score() {
        let plain = request(BloodType::BNeg, UrgencyLevel::Urgent, Duration::hours(3));
        let mut tagged = plain.clone();
        tagged.tags.insert("emergency".into());
        tagged.tags.insert("critical".into());
        assert_eq!(
            UrgencyScorer.score_at(&plain, now()),
            UrgencyScorer.score_at(&tagged, now())
        );
    }

    #[test]
    fn rarity_ordering_holds() {
        let order = [
            BloodType::ONeg,
            BloodType::AbPos,
            BloodType::BNeg,
            BloodType::AbNeg,
            BloodType::ANeg,
            BloodType::BPos,
            BloodType::APos,
            BloodType::OPos,
        ];
        let scores: Vec<u8> = order
            .iter()
            .map(|bt| {
                let req = request(bt.clone(), UrgencyLevel::Standard, Duration::hours(2));
                UrgencyScorer.score_at(&req, now())
            })
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1], "{scores:?}");
        }
        assert_eq!(scores[2], scores[3], "B- and AB- share a rarity factor");
    }

    fn blood_type() -> impl Strategy<Value = BloodType> {
        prop::sample::select(BloodType::ALL.to_vec())
    }

    fn level() -> impl Strategy<Value = UrgencyLevel> {
        prop_oneof![
            Just(UrgencyLevel::Standard),
            Just(UrgencyLevel::Urgent),
            Just(UrgencyLevel::Critical),
            "[A-Za-z]{1,8}".prop_map(UrgencyLevel::from),
        ]
    }

    proptest! {
        #[test]
        fn rus_within_bounds(bt in blood_type(), lvl in level(), minutes in -10_000i64..100_000) {
            let req = request(bt, lvl, Duration::minutes(minutes));
            let rus = UrgencyScorer.score_at(&req, now());
            prop_assert!(rus <= RUS_MAX);
        }

        #[test]
        fn rus_monotone_in_age(bt in blood_type(), lvl in level(), a in 0i64..2_160, b in 0i64..2_160) {
            let (young, old) = if a <= b { (a, b) } else { (b, a) };
            let r_young = UrgencyScorer.score_at(&request(bt.clone(), lvl.clone(), Duration::minutes(young)), now());
            let r_old = UrgencyScorer.score_at(&request(bt, lvl, Duration::minutes(old)), now());
            prop_assert!(r_young <= r_old);
        }

        #[test]
        fn rus_constant_past_36h(bt in blood_type(), lvl in level(), extra in 0i64..10_000) {
            let at_36 = UrgencyScorer.score_at(&request(bt.clone(), lvl.clone(), Duration::hours(36)), now());
            let later = UrgencyScorer.score_at(&request(bt, lvl, Duration::hours(36 + extra)), now());
            prop_assert_eq!(at_36, later);
        }
    }
}
