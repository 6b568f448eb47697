//! Result filtering and sorting.
//!
//! Policy (thresholds, sort direction) is passed in as plain closures so the
//! result type carries no ordering of its own.

use std::cmp::Ordering;

use chrono::Duration;
use tracing::debug;

use crate::models::{AggregatedResult, ReportOptions, SortOrder};

/// Keeps results matching `predicate`, preserving input order.
pub fn filter<P>(results: Vec<AggregatedResult>, predicate: P) -> Vec<AggregatedResult>
where
    P: Fn(&AggregatedResult) -> bool,
{
    let before = results.len();
    let kept: Vec<_> = results.into_iter().filter(|r| predicate(r)).collect();
    debug!(before, after = kept.len(), "filtered aggregated results");
    kept
}

/// Stable sort by `comparator`; equal keys keep their input order.
pub fn sort<C>(mut results: Vec<AggregatedResult>, comparator: C) -> Vec<AggregatedResult>
where
    C: Fn(&AggregatedResult, &AggregatedResult) -> Ordering,
{
    results.sort_by(|a, b| comparator(a, b));
    results
}

/// Keep entities active for at least `threshold`.
pub fn min_active(threshold: Duration) -> impl Fn(&AggregatedResult) -> bool {
    move |r| r.total_active >= threshold
}

pub fn keep_all(_: &AggregatedResult) -> bool {
    true
}

/// Ascending by activity, ties by entity id.
pub fn by_activity_asc(a: &AggregatedResult, b: &AggregatedResult) -> Ordering {
    a.total_active
        .cmp(&b.total_active)
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

/// Most active first; ties still by ascending entity id.
pub fn by_activity_desc(a: &AggregatedResult, b: &AggregatedResult) -> Ordering {
    b.total_active
        .cmp(&a.total_active)
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

impl ReportOptions {
    /// `show_inactive` disables the threshold entirely.
    pub fn filter(&self) -> impl Fn(&AggregatedResult) -> bool {
        let threshold = self.min_active;
        let show_inactive = self.show_inactive;
        move |r| show_inactive || r.total_active >= threshold
    }

    pub fn comparator(&self) -> fn(&AggregatedResult, &AggregatedResult) -> Ordering {
        match self.order {
            SortOrder::Ascending => by_activity_asc,
            SortOrder::Descending => by_activity_desc,
        }
    }
}
