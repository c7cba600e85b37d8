use anyhow::{Context, Result};

use super::LedgerEntry;
use super::LedgerEvent;
use crate::tracker::performance::PerformanceTracker;

/// Rebuild a tracker from ledger entries in order.
///
/// Weight publications are skipped; the weight history file is the source
/// of truth for weights and the ledger only mirrors it for audit.
pub fn rebuild_tracker(entries: &[LedgerEntry], recent_limit: usize) -> Result<PerformanceTracker> {
    let tracker = PerformanceTracker::new(recent_limit);
    for entry in entries {
        match &entry.event {
            LedgerEvent::MatchScored { record } => tracker.record(record.clone()),
            LedgerEvent::OutcomeRecorded {
                request_id,
                donor_id,
                outcome,
                response_time_minutes,
            } => {
                tracker
                    .record_outcome_at(
                        request_id,
                        donor_id,
                        *outcome,
                        *response_time_minutes,
                        entry.ts,
                    )
                    .with_context(|| format!("ledger entry {} cannot be replayed", entry.seq))?;
            }
            LedgerEvent::WeightsPublished { .. } => {}
        }
    }
    Ok(tracker)
}
