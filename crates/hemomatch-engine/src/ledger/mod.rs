//! Durable state for the engine: the hash-chained match ledger and the
//! weight version history, both kept under one state directory.

pub mod atomic;
pub mod chain;
pub mod replay;
pub mod store;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hemomatch_core::model::MatchRecord;
use hemomatch_core::types::Outcome;

use crate::weights::config::WeightVersion;

/// Something that happened to engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum LedgerEvent {
    MatchScored {
        record: MatchRecord,
    },
    OutcomeRecorded {
        request_id: String,
        donor_id: String,
        outcome: Outcome,
        response_time_minutes: f64,
    },
    WeightsPublished {
        version: WeightVersion,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::MatchScored { .. } => "MatchScored",
            LedgerEvent::OutcomeRecorded { .. } => "OutcomeRecorded",
            LedgerEvent::WeightsPublished { .. } => "WeightsPublished",
        }
    }
}

/// One line of the ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub prev_hash: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}
