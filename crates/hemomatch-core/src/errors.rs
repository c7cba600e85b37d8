use crate::types::Outcome;

/// Errors raised by scoring, configuration and outcome tracking.
///
/// Every variant rejects the single offending operation; none of them leave
/// engine state partially updated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("invalid coordinate ({lat}, {lon}): latitude must be in [-90, 90] and longitude in [-180, 180]")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("weight {name}={value} out of bounds [{min}, {max}]")]
    WeightOutOfBounds {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("readiness score {value} for donor {donor_id} outside [0, 100]")]
    InvalidReadinessScore { donor_id: String, value: f64 },

    #[error("readiness unavailable for donor {donor_id}: {reason}")]
    ReadinessUnavailable { donor_id: String, reason: String },

    #[error("no pending match for request {request_id} and donor {donor_id}")]
    RecordNotFound {
        request_id: String,
        donor_id: String,
    },

    #[error("outcome must be successful or unsuccessful, got {0}")]
    InvalidOutcome(Outcome),

    #[error("response time {0} minutes is not a finite non-negative number")]
    InvalidResponseTime(f64),

    #[error("unknown weights version {0}")]
    UnknownVersion(u64),
}

/// Problems with engine configuration or a persisted weight history.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max relevant radius must be finite and positive, got {0} km")]
    InvalidRadius(f64),

    #[error("weight history is empty")]
    EmptyHistory,

    #[error("weight history broken at position {position}: expected version {expected}, found {found}")]
    BrokenChain {
        position: usize,
        expected: u64,
        found: u64,
    },

    #[error("active version {0} not present in weight history")]
    MissingActive(u64),

    #[error(transparent)]
    Weights(#[from] MatchError),
}

/// Structured check result for `hmatch check --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    pub file: String,
    pub kind: String,
    pub pass: bool,
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckIssue {
    pub code: String,
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
