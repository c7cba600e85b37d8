use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hemomatch_core::errors::MatchError;
use hemomatch_core::model::MatchRecord;
use hemomatch_core::types::Outcome;

use super::leaderboard::{self, DonorStanding};

/// Half-open time range `[from, to)` over match timestamps. Open ends are
/// unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    /// The trailing `span` ending at `now`, or `None` when the start would
    /// fall outside the representable range.
    pub fn trailing(span: Duration, now: DateTime<Utc>) -> Option<Self> {
        let from = now.checked_sub_signed(span)?;
        Some(Self {
            from: Some(from),
            to: None,
        })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

/// Aggregates over the matches in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub window: TimeWindow,
    pub match_count: usize,
    pub successful_count: usize,
    pub unsuccessful_count: usize,
    pub pending_count: usize,
    /// successful / (successful + unsuccessful); 0 with no completed outcomes.
    pub success_rate: f64,
    pub average_match_score: f64,
    pub rus_average: f64,
    pub drs_average: f64,
    /// Mean over completed matches that reported a response time.
    pub average_response_time: f64,
    /// Most recent first.
    pub recent_matches: Vec<MatchRecord>,
}

/// Append-only log of match attempts.
///
/// Appends and outcome transitions are serialized on one lock; snapshot
/// reads see the log as of the moment they take the read lock.
#[derive(Debug)]
pub struct PerformanceTracker {
    log: RwLock<Vec<MatchRecord>>,
    recent_limit: usize,
}

impl PerformanceTracker {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            recent_limit,
        }
    }

    pub fn record(&self, record: MatchRecord) {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        log.push(record);
    }

    /// Fail exactly when `record_outcome_at` would, without changing the log.
    pub fn check_outcome(
        &self,
        request_id: &str,
        donor_id: &str,
        outcome: Outcome,
        response_time_minutes: f64,
    ) -> Result<(), MatchError> {
        validate_outcome(outcome, response_time_minutes)?;
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        if log.iter().any(|r| r.is_pending() && r.concerns(request_id, donor_id)) {
            Ok(())
        } else {
            Err(not_found(request_id, donor_id))
        }
    }

    /// Resolve the most recent pending match for the pair.
    pub fn record_outcome_at(
        &self,
        request_id: &str,
        donor_id: &str,
        outcome: Outcome,
        response_time_minutes: f64,
        at: DateTime<Utc>,
    ) -> Result<MatchRecord, MatchError> {
        validate_outcome(outcome, response_time_minutes)?;

        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let record = log
            .iter_mut()
            .rev()
            .find(|r| r.is_pending() && r.concerns(request_id, donor_id))
            .ok_or_else(|| not_found(request_id, donor_id))?;
        record.outcome = outcome;
        record.response_time_minutes = Some(response_time_minutes);
        record.outcome_at = Some(at);

        debug!(request_id, donor_id, %outcome, response_time_minutes, "outcome recorded");
        Ok(record.clone())
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<MatchRecord> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn snapshot(&self, window: TimeWindow) -> PerformanceSnapshot {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        let in_window: Vec<&MatchRecord> =
            log.iter().filter(|r| window.contains(r.timestamp)).collect();
        let recent = recent_first(&in_window, self.recent_limit);

        let count = |o: Outcome| count_outcome(&in_window, o);
        let successful = count(Outcome::Successful);
        let unsuccessful = count(Outcome::Unsuccessful);
        let completed = successful + unsuccessful;

        let response_times: Vec<f64> = in_window
            .iter()
            .filter(|r| r.outcome.is_completed())
            .filter_map(|r| r.response_time_minutes)
            .collect();

        PerformanceSnapshot {
            window,
            match_count: in_window.len(),
            successful_count: successful,
            unsuccessful_count: unsuccessful,
            pending_count: count(Outcome::Pending),
            success_rate: if completed == 0 {
                0.0
            } else {
                successful as f64 / completed as f64
            },
            average_match_score: mean(in_window.iter().map(|r| r.match_score)),
            rus_average: mean(in_window.iter().map(|r| f64::from(r.rus))),
            drs_average: mean(in_window.iter().map(|r| r.drs)),
            average_response_time: mean(response_times.into_iter()),
            recent_matches: recent,
        }
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<DonorStanding> {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        leaderboard::build(&log, limit)
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(10)
    }
}

fn validate_outcome(outcome: Outcome, response_time_minutes: f64) -> Result<(), MatchError> {
    if !outcome.is_completed() {
        return Err(MatchError::InvalidOutcome(outcome));
    }
    if !response_time_minutes.is_finite() || response_time_minutes < 0.0 {
        return Err(MatchError::InvalidResponseTime(response_time_minutes));
    }
    Ok(())
}

fn not_found(request_id: &str, donor_id: &str) -> MatchError {
    MatchError::RecordNotFound {
        request_id: request_id.to_string(),
        donor_id: donor_id.to_string(),
    }
}

fn count_outcome(records: &[&MatchRecord], outcome: Outcome) -> usize {
    records.iter().filter(|r| r.outcome == outcome).count()
}

fn recent_first(records: &[&MatchRecord], limit: usize) -> Vec<MatchRecord> {
    // reversed log order first, so equal timestamps keep newest-appended first
    let mut recent: Vec<&MatchRecord> = records.iter().rev().copied().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.into_iter().take(limit).cloned().collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
