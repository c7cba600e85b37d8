use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Outcome;

/// Result of scoring one donor against one request.
///
/// Created with `Outcome::Pending`; the outcome (and response time) is
/// filled in once the external collaborator knows whether the donor
/// fulfilled the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub request_id: String,
    pub donor_id: String,
    pub rus: u8,
    pub drs: f64,
    pub distance_factor: f64,
    pub weights_version: u64,
    pub match_score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_at: Option<DateTime<Utc>>,
    /// Lifetime donations the donor reported when this match was scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_count: Option<u32>,
}

impl MatchRecord {
    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }

    pub fn concerns(&self, request_id: &str, donor_id: &str) -> bool {
        self.request_id == request_id && self.donor_id == donor_id
    }
}
