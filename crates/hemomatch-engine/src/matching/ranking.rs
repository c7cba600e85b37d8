use std::cmp::Ordering;

use serde::Serialize;

use hemomatch_core::model::{Donor, MatchRecord};

/// A donor paired with the record produced when it was scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDonor {
    pub donor: Donor,
    pub record: MatchRecord,
}

/// Best-first ordering: higher match score, then higher DRS, then lower
/// distance factor, then donor id ascending.
pub fn rank_order(a: &RankedDonor, b: &RankedDonor) -> Ordering {
    b.record
        .match_score
        .total_cmp(&a.record.match_score)
        .then_with(|| b.record.drs.total_cmp(&a.record.drs))
        .then_with(|| a.record.distance_factor.total_cmp(&b.record.distance_factor))
        .then_with(|| a.donor.id.cmp(&b.donor.id))
}

/// One pass over a scored, ordered candidate list.
///
/// Consumed by iteration; call `MatchEngine::rank` again for a fresh
/// ordering under the then-current weights.
#[derive(Debug)]
pub struct Ranking {
    weights_version: u64,
    inner: std::vec::IntoIter<RankedDonor>,
}

impl Ranking {
    pub(crate) fn new(weights_version: u64, mut ranked: Vec<RankedDonor>) -> Self {
        ranked.sort_by(rank_order);
        Self {
            weights_version,
            inner: ranked.into_iter(),
        }
    }

    /// Weight version every record in this ranking was scored under.
    pub fn weights_version(&self) -> u64 {
        self.weights_version
    }

    /// Stop at the first candidate below `floor`, if a floor is configured.
    pub fn above_floor(self, floor: Option<f64>) -> impl Iterator<Item = RankedDonor> {
        self.take_while(move |r| floor.map_or(true, |f| r.record.match_score >= f))
    }
}

impl Iterator for Ranking {
    type Item = RankedDonor;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Ranking {}
