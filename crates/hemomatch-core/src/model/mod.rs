pub mod record;
pub mod weights;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BloodType, GeoPoint, UrgencyLevel};

pub use self::record::MatchRecord;
pub use self::weights::{Preset, WeightTriple};

/// A blood request as supplied by the request store.
///
/// Age is never stored; it is derived from `created_at` at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub blood_type: BloodType,
    pub urgency_level: UrgencyLevel,
    pub created_at: DateTime<Utc>,

    /// Carried for forward compatibility; not weighted by the scorer.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    pub location: GeoPoint,
}

/// Read-only donor snapshot taken at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    pub id: String,
    pub blood_type: BloodType,
    pub location: GeoPoint,

    /// DRS as last published by the readiness subsystem, if embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_count: Option<u32>,
}
