use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use hemomatch_core::model::MatchRecord;
use hemomatch_core::types::Outcome;

/// A donor's position on the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorStanding {
    pub donor_id: String,
    /// DRS carried by the donor's most recent match.
    pub drs: f64,
    /// Donations the donor last reported, plus successful outcomes resolved
    /// since that report.
    pub donation_count: u32,
    pub match_count: u32,
    pub last_matched_at: DateTime<Utc>,
}

/// Order donors by current DRS desc, donation count desc, id asc.
pub fn build(records: &[MatchRecord], limit: usize) -> Vec<DonorStanding> {
    // latest self-reported count per donor, and when it was reported
    let mut reported: HashMap<&str, (u32, DateTime<Utc>)> = HashMap::new();
    for record in records {
        if let Some(count) = record.donation_count {
            let latest = reported
                .entry(record.donor_id.as_str())
                .or_insert((count, record.timestamp));
            if record.timestamp >= latest.1 {
                *latest = (count, record.timestamp);
            }
        }
    }

    let mut by_donor: HashMap<&str, DonorStanding> = HashMap::new();
    for record in records {
        let since = reported.get(record.donor_id.as_str());
        let standing = by_donor
            .entry(record.donor_id.as_str())
            .or_insert_with(|| DonorStanding {
                donor_id: record.donor_id.clone(),
                drs: record.drs,
                donation_count: since.map_or(0, |(count, _)| *count),
                match_count: 0,
                last_matched_at: record.timestamp,
            });
        standing.match_count += 1;
        if record.outcome == Outcome::Successful {
            let resolved_at = record.outcome_at.unwrap_or(record.timestamp);
            if since.map_or(true, |(_, at)| resolved_at >= *at) {
                standing.donation_count = standing.donation_count.saturating_add(1);
            }
        }
        // later log position wins when timestamps are equal
        if record.timestamp >= standing.last_matched_at {
            standing.last_matched_at = record.timestamp;
            standing.drs = record.drs;
        }
    }

    let mut standings: Vec<DonorStanding> = by_donor.into_values().collect();
    standings.sort_by(|a, b| {
        b.drs
            .total_cmp(&a.drs)
            .then_with(|| b.donation_count.cmp(&a.donation_count))
            .then_with(|| a.donor_id.cmp(&b.donor_id))
    });
    standings.truncate(limit);
    standings
}
