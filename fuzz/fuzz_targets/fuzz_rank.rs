#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

use hemomatch_core::model::{Donor, Request};
use hemomatch_core::traits::SnapshotReadiness;
use hemomatch_engine::matching::engine::MatchEngine;
use hemomatch_engine::scoring::distance::DistanceEngine;
use hemomatch_engine::weights::config::WeightConfig;

fuzz_target!(|data: &[u8]| {
    let Ok((request, donors)) = serde_json::from_slice::<(Request, Vec<Donor>)>(data) else {
        return;
    };
    let engine = MatchEngine::new(
        Arc::new(WeightConfig::default()),
        DistanceEngine::default(),
        SnapshotReadiness::from_donors(&donors),
    );
    if let Ok(ranking) = engine.rank(&request, &donors) {
        let scores: Vec<f64> = ranking.map(|r| r.record.match_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        for r in &scores {
            assert!(r.is_finite());
        }
    }
});
