#![no_main]
use libfuzzer_sys::fuzz_target;

use hemomatch_core::model::Request;
use hemomatch_engine::scoring::urgency::{UrgencyScorer, RUS_MAX};

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = serde_json::from_slice::<Request>(data) {
        let rus = UrgencyScorer.score(&request);
        assert!(rus <= RUS_MAX);
    }
});
