//! Statistics staleness classification.
//!
//! A statistics object is stale when it was never updated or was last updated
//! at or before the cutoff, and it passes the size gate. Stale objects are
//! processed oldest first so the most neglected ones are refreshed even if a
//! run is cut short.

use crate::catalog::{SizeGate, StatisticsCandidate};
use chrono::{DateTime, Duration, Utc};

/// Staleness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Stale,
    NotStale,
}

/// `now - days`, clamped to the earliest representable instant. With a
/// clamped cutoff only never-updated statistics are outdated.
pub fn staleness_cutoff(now: DateTime<Utc>, days_since_update: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days_since_update))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whether the candidate passes the size gate.
///
/// Row-count gates use the current row count when known and fall back to the
/// count sampled at the last update. Page-count gates need a page count.
pub fn size_gate_satisfied(candidate: &StatisticsCandidate, gate: &SizeGate) -> bool {
    match gate {
        SizeGate::None => true,
        SizeGate::MinRowCount { minimum } => {
            candidate
                .current_row_count
                .unwrap_or(candidate.rows_at_last_update)
                >= *minimum
        }
        SizeGate::MinPageCount { minimum } => {
            candidate.page_count.map_or(false, |pages| pages >= *minimum)
        }
    }
}

/// Never updated, or last updated at or before the cutoff.
pub fn is_outdated(candidate: &StatisticsCandidate, cutoff: DateTime<Utc>) -> bool {
    candidate.last_updated.map_or(true, |ts| ts <= cutoff)
}

/// Classify one candidate against the cutoff and size gate.
pub fn classify_statistics(
    candidate: &StatisticsCandidate,
    cutoff: DateTime<Utc>,
    gate: &SizeGate,
) -> Staleness {
    if is_outdated(candidate, cutoff) && size_gate_satisfied(candidate, gate) {
        Staleness::Stale
    } else {
        Staleness::NotStale
    }
}

/// Sort oldest first, never-updated before everything else. Stable.
pub fn order_by_staleness(candidates: &mut [StatisticsCandidate]) {
    candidates.sort_by_key(|c| c.last_updated);
}
