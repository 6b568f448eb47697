use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};
use crate::models::{AggregatedResult, ReportWindow, Session};

/// Portion of `session` that falls inside `window`.
///
/// Sessions with `end < start` (or no intersection) yield zero, never a
/// negative duration.
pub fn clip(session: &Session, window: &ReportWindow) -> Duration {
    let on = session.start.max(window.begin);
    let off = session.end.min(window.end);
    if off <= on {
        return Duration::zero();
    }
    off - on
}

/// Resolves display labels for entity ids.
pub trait LabelLookup {
    fn label(&self, entity: &Uuid) -> Option<String>;
}

impl<S: BuildHasher> LabelLookup for HashMap<Uuid, String, S> {
    fn label(&self, entity: &Uuid) -> Option<String> {
        self.get(entity).cloned()
    }
}

impl LabelLookup for BTreeMap<Uuid, String> {
    fn label(&self, entity: &Uuid) -> Option<String> {
        self.get(entity).cloned()
    }
}

impl<L: LabelLookup + ?Sized> LabelLookup for &L {
    fn label(&self, entity: &Uuid) -> Option<String> {
        (**self).label(entity)
    }
}

/// Adapts a closure into a [`LabelLookup`].
pub struct FnLabels<F>(pub F);

impl<F> LabelLookup for FnLabels<F>
where
    F: Fn(&Uuid) -> Option<String>,
{
    fn label(&self, entity: &Uuid) -> Option<String> {
        (self.0)(entity)
    }
}

/// Sums clipped session time per entity within one window.
///
/// Overlapping sessions of the same entity are summed independently, not
/// merged. Totals saturate at `Duration::MAX`. Output keeps first-seen order;
/// callers sort afterwards.
pub struct ActivityAggregator {
    window: ReportWindow,
}

impl ActivityAggregator {
    pub fn new(window: ReportWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &ReportWindow {
        &self.window
    }

    /// One result per distinct entity seen in `sessions`.
    pub fn aggregate<L>(&self, sessions: &[Session], labels: &L) -> ReportResult<Vec<AggregatedResult>>
    where
        L: LabelLookup + ?Sized,
    {
        self.aggregate_roster(&[], sessions, labels)
    }

    /// Like [`aggregate`](Self::aggregate), but every `roster` entity appears
    /// even without sessions. Entities only present in `sessions` are kept too.
    pub fn aggregate_roster<L>(
        &self,
        roster: &[Uuid],
        sessions: &[Session],
        labels: &L,
    ) -> ReportResult<Vec<AggregatedResult>>
    where
        L: LabelLookup + ?Sized,
    {
        let mut totals: Vec<(Uuid, Duration)> = Vec::new();
        let mut slots: HashMap<Uuid, usize> = HashMap::new();

        for entity in roster {
            slots.entry(*entity).or_insert_with(|| {
                totals.push((*entity, Duration::zero()));
                totals.len() - 1
            });
        }

        for session in sessions {
            let slot = *slots.entry(session.entity_id).or_insert_with(|| {
                totals.push((session.entity_id, Duration::zero()));
                totals.len() - 1
            });
            let total = &mut totals[slot].1;
            *total = total
                .checked_add(&clip(session, &self.window))
                .unwrap_or(Duration::MAX);
        }

        debug!(
            sessions = sessions.len(),
            roster = roster.len(),
            entities = totals.len(),
            "aggregated session activity"
        );

        totals
            .into_iter()
            .map(|(entity_id, total_active)| {
                let label = labels
                    .label(&entity_id)
                    .ok_or(ReportError::MissingLabel(entity_id))?;
                Ok(AggregatedResult {
                    entity_id,
                    label,
                    total_active,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
    }

    fn window() -> ReportWindow {
        ReportWindow::new(at(2, 0, 0), at(2, 1, 0)).unwrap()
    }

    fn player(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn labels(ids: &[(u128, &str)]) -> HashMap<Uuid, String> {
        ids.iter()
            .map(|(id, name)| (player(*id), name.to_string()))
            .collect()
    }

    #[test]
    fn test_clip_inside_window_is_full_length() {
        let session = Session::new(player(1), at(2, 0, 10), at(2, 0, 40));
        assert_eq!(clip(&session, &window()), Duration::minutes(30));
    }

    #[test]
    fn test_clip_outside_window_is_zero() {
        let before = Session::new(player(1), at(1, 20, 0), at(1, 21, 0));
        let after = Session::new(player(1), at(2, 2, 0), at(2, 3, 0));
        assert_eq!(clip(&before, &window()), Duration::zero());
        assert_eq!(clip(&after, &window()), Duration::zero());
    }

    #[test]
    fn test_clip_across_midnight_counts_only_inside() {
        let session = Session::new(player(1), at(1, 23, 50), at(2, 0, 10));
        assert_eq!(clip(&session, &window()), Duration::minutes(10));
    }

    #[test]
    fn test_clip_covering_whole_window() {
        let session = Session::new(player(1), at(1, 12, 0), at(2, 12, 0));
        assert_eq!(clip(&session, &window()), Duration::hours(1));
    }

    #[test]
    fn test_clip_inverted_session_is_zero() {
        let session = Session::new(player(1), at(2, 0, 40), at(2, 0, 10));
        assert_eq!(clip(&session, &window()), Duration::zero());
    }

    #[test]
    fn test_clip_touching_boundary_is_zero() {
        let session = Session::new(player(1), at(2, 1, 0), at(2, 1, 30));
        assert_eq!(clip(&session, &window()), Duration::zero());
    }

    #[test]
    fn test_aggregate_sums_per_entity() {
        let sessions = vec![
            Session::new(player(1), at(2, 0, 0), at(2, 0, 10)),
            Session::new(player(2), at(2, 0, 0), at(2, 0, 5)),
            Session::new(player(1), at(2, 0, 30), at(2, 0, 45)),
        ];
        let results = ActivityAggregator::new(window())
            .aggregate(&sessions, &labels(&[(1, "Salted"), (2, "Helm")]))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "Salted");
        assert_eq!(results[0].total_active, Duration::minutes(25));
        assert_eq!(results[1].total_active, Duration::minutes(5));
    }

    #[test]
    fn test_aggregate_does_not_merge_overlapping_sessions() {
        let sessions = vec![
            Session::new(player(1), at(2, 0, 0), at(2, 0, 30)),
            Session::new(player(1), at(2, 0, 15), at(2, 0, 45)),
        ];
        let results = ActivityAggregator::new(window())
            .aggregate(&sessions, &labels(&[(1, "Salted")]))
            .unwrap();
        assert_eq!(results[0].total_active, Duration::minutes(60));
    }

    #[test]
    fn test_aggregate_keeps_zero_overlap_entities() {
        let sessions = vec![Session::new(player(3), at(1, 10, 0), at(1, 11, 0))];
        let results = ActivityAggregator::new(window())
            .aggregate(&sessions, &labels(&[(3, "Idle")]))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_active, Duration::zero());
    }

    #[test]
    fn test_aggregate_missing_label_fails() {
        let sessions = vec![Session::new(player(9), at(2, 0, 0), at(2, 0, 10))];
        let err = ActivityAggregator::new(window())
            .aggregate(&sessions, &labels(&[(1, "Salted")]))
            .unwrap_err();
        assert_eq!(err, ReportError::MissingLabel(player(9)));
    }

    #[test]
    fn test_aggregate_roster_includes_members_without_sessions() {
        let sessions = vec![Session::new(player(2), at(2, 0, 0), at(2, 0, 20))];
        let results = ActivityAggregator::new(window())
            .aggregate_roster(
                &[player(1), player(2)],
                &sessions,
                &labels(&[(1, "Salted"), (2, "Helm")]),
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entity_id, player(1));
        assert_eq!(results[0].total_active, Duration::zero());
        assert_eq!(results[1].total_active, Duration::minutes(20));
    }

    #[test]
    fn test_aggregate_saturates_instead_of_overflowing() {
        let window = ReportWindow::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).unwrap();
        let sessions: Vec<Session> = (0..2000)
            .map(|_| Session::new(player(1), DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC))
            .collect();
        let results = ActivityAggregator::new(window)
            .aggregate(&sessions, &labels(&[(1, "Salted")]))
            .unwrap();
        assert_eq!(results[0].total_active, Duration::MAX);
    }

    #[test]
    fn test_fn_labels_adapter() {
        let lookup = FnLabels(|id: &Uuid| Some(format!("player-{}", id.as_u128())));
        let sessions = vec![Session::new(player(7), at(2, 0, 0), at(2, 0, 1))];
        let results = ActivityAggregator::new(window())
            .aggregate(&sessions, &lookup)
            .unwrap();
        assert_eq!(results[0].label, "player-7");
    }
}
