//! End-to-end report computation: aggregate, filter, sort, paginate.
//!
//! The stage order is fixed. Lower-layer errors propagate unchanged.

use std::cmp::Ordering;

use tracing::debug;
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};
use crate::models::{AggregatedResult, Page, ReportOptions, ReportWindow, Session};
use crate::ordering;
use crate::pagination;
use crate::projections::{ActivityAggregator, LabelLookup};

pub struct ReportPipeline;

impl ReportPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn run<L, P, C>(
        sessions: &[Session],
        window: &ReportWindow,
        labels: &L,
        predicate: P,
        comparator: C,
        page_size: usize,
        page_index: usize,
    ) -> ReportResult<Page<AggregatedResult>>
    where
        L: LabelLookup + ?Sized,
        P: Fn(&AggregatedResult) -> bool,
        C: Fn(&AggregatedResult, &AggregatedResult) -> Ordering,
    {
        Self::run_roster(
            &[],
            sessions,
            window,
            labels,
            predicate,
            comparator,
            page_size,
            page_index,
        )
    }

    /// Same as [`run`](Self::run), with `roster` entities reported even
    /// when they have no sessions.
    #[allow(clippy::too_many_arguments)]
    pub fn run_roster<L, P, C>(
        roster: &[Uuid],
        sessions: &[Session],
        window: &ReportWindow,
        labels: &L,
        predicate: P,
        comparator: C,
        page_size: usize,
        page_index: usize,
    ) -> ReportResult<Page<AggregatedResult>>
    where
        L: LabelLookup + ?Sized,
        P: Fn(&AggregatedResult) -> bool,
        C: Fn(&AggregatedResult, &AggregatedResult) -> Ordering,
    {
        window.validate()?;
        if page_size == 0 {
            return Err(ReportError::InvalidPageSize(page_size));
        }

        let aggregated = ActivityAggregator::new(*window).aggregate_roster(roster, sessions, labels)?;
        let filtered = ordering::filter(aggregated, predicate);
        let sorted = ordering::sort(filtered, comparator);
        let page = pagination::paginate(&sorted, page_size, page_index)?;

        debug!(
            page = page.index,
            total_pages = page.total_pages,
            total_items = page.total_items,
            "report page computed"
        );
        Ok(page)
    }

    /// Runs with the filter, comparator and page size from `options`.
    pub fn run_with_options<L>(
        roster: &[Uuid],
        sessions: &[Session],
        window: &ReportWindow,
        labels: &L,
        options: &ReportOptions,
        page_index: usize,
    ) -> ReportResult<Page<AggregatedResult>>
    where
        L: LabelLookup + ?Sized,
    {
        Self::run_roster(
            roster,
            sessions,
            window,
            labels,
            options.filter(),
            options.comparator(),
            options.page_size,
            page_index,
        )
    }
}
