//! Batch evaluation of many retention series.
//!
//! Rows are grouped into one [`Series`] per entity, each group is evaluated
//! independently on the rayon pool, and the per-entity outcomes are folded
//! into an immutable [`BatchSummary`].

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;

use crate::config::OrderingPolicy;
use crate::core::loaders::RetentionRecord;
use crate::core::series::{AcceptanceResult, DropReason, Series};
use crate::processors::acceptance::{AcceptanceError, SeriesAcceptanceFilter};

/// Outcome for a single entity.
#[derive(Debug, Clone)]
pub struct EntityReport<K> {
    pub entity_id: String,
    /// The series as evaluated (after sorting, under [`OrderingPolicy::Sort`]).
    pub series: Series<K>,
    pub result: Result<AcceptanceResult<K>, AcceptanceError>,
}

impl<K> EntityReport<K> {
    #[inline]
    pub fn is_errored(&self) -> bool {
        self.result.is_err()
    }
}

/// Counts of each outcome across a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub accepted: usize,
    pub dropped: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_reports<K>(reports: &[EntityReport<K>]) -> Self {
        reports.iter().fold(Self::default(), |acc, report| {
            let (accepted, dropped, errored) = match &report.result {
                Ok(AcceptanceResult::Accepted { .. }) => (1, 0, 0),
                Ok(AcceptanceResult::Dropped { .. }) => (0, 1, 0),
                Err(_) => (0, 0, 1),
            };
            Self {
                total: acc.total + 1,
                accepted: acc.accepted + accepted,
                dropped: acc.dropped + dropped,
                errored: acc.errored + errored,
            }
        })
    }

    /// `count` as a percentage of `total`, rounded to two decimals.
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (count as f64 / self.total as f64 * 10_000.0).round() / 100.0
    }
}

/// Per-entity reports in entity-id order, with their summary.
#[derive(Debug, Clone)]
pub struct BatchReport<K> {
    pub reports: Vec<EntityReport<K>>,
    pub summary: BatchSummary,
}

impl<K> BatchReport<K> {
    /// Reports for accepted entities.
    pub fn accepted(&self) -> impl Iterator<Item = &EntityReport<K>> {
        self.reports
            .iter()
            .filter(|r| matches!(r.result, Ok(AcceptanceResult::Accepted { .. })))
    }

    /// Reports for dropped entities.
    pub fn dropped(&self) -> impl Iterator<Item = &EntityReport<K>> {
        self.reports
            .iter()
            .filter(|r| matches!(r.result, Ok(AcceptanceResult::Dropped { .. })))
    }

    /// Reports for entities that could not be evaluated.
    pub fn errored(&self) -> impl Iterator<Item = &EntityReport<K>> {
        self.reports.iter().filter(|r| r.is_errored())
    }

    /// `(entity_id, kept prefix)` for every accepted entity.
    pub fn accepted_series(&self) -> impl Iterator<Item = (&str, &Series<K>)> {
        self.reports.iter().filter_map(|r| match &r.result {
            Ok(AcceptanceResult::Accepted { series, .. }) => Some((r.entity_id.as_str(), series)),
            _ => None,
        })
    }

    /// `(entity_id, full series, reason)` for every dropped entity.
    pub fn dropped_series(&self) -> impl Iterator<Item = (&str, &Series<K>, &DropReason)> {
        self.reports.iter().filter_map(|r| match &r.result {
            Ok(AcceptanceResult::Dropped { reason }) => Some((r.entity_id.as_str(), &r.series, reason)),
            _ => None,
        })
    }
}

/// Group flat rows into one series per entity.
///
/// Rows keep their input order within each group; sorting is left to
/// [`run_batch`] so that [`OrderingPolicy::Strict`] can see the original
/// order.
pub fn group_records<I>(records: I) -> BTreeMap<String, Series<i64>>
where
    I: IntoIterator<Item = RetentionRecord>,
{
    let mut groups: BTreeMap<String, Series<i64>> = BTreeMap::new();

    for record in records {
        groups
            .entry(record.entity_id)
            .or_default()
            .push(record.cycle, record.raw, record.smoothed);
    }

    groups
}

/// Evaluate every group in parallel.
///
/// Per-entity errors are logged with the entity id and recorded in the
/// report; they never abort the batch.
pub fn run_batch<K>(
    groups: BTreeMap<String, Series<K>>,
    filter: &SeriesAcceptanceFilter,
    ordering: OrderingPolicy,
) -> BatchReport<K>
where
    K: Ord + Clone + Send + Sync,
{
    let entries: Vec<(String, Series<K>)> = groups.into_iter().collect();

    let reports: Vec<EntityReport<K>> = entries
        .into_par_iter()
        .map(|(entity_id, mut series)| {
            if ordering == OrderingPolicy::Sort {
                series.sort_by_index();
            }

            let result = filter.evaluate(&series);
            match &result {
                Ok(AcceptanceResult::Accepted { cutoff, .. }) => {
                    debug!(
                        "entity {}: accepted, kept {} of {} points",
                        entity_id,
                        cutoff,
                        series.len()
                    );
                }
                Ok(AcceptanceResult::Dropped { reason }) => {
                    debug!("entity {}: dropped, {}", entity_id, reason);
                }
                Err(e) => {
                    warn!("entity {}: {}", entity_id, e);
                }
            }

            EntityReport {
                entity_id,
                series,
                result,
            }
        })
        .collect();

    let summary = BatchSummary::from_reports(&reports);

    BatchReport { reports, summary }
}

/// Convenience wrapper: group rows and evaluate them.
pub fn evaluate_records<I>(
    records: I,
    filter: &SeriesAcceptanceFilter,
    ordering: OrderingPolicy,
) -> BatchReport<i64>
where
    I: IntoIterator<Item = RetentionRecord>,
{
    run_batch(group_records(records), filter, ordering)
}
