//! Series data model for smoothed capacity-retention curves.
//!
//! A [`Series`] holds the points of one entity (one battery cell) ordered by
//! cycle index. Each point carries both the raw retention measurement and the
//! smoothed value produced upstream; classification only looks at the
//! smoothed value, but the raw value travels with it into the output tables.

use std::fmt;

/// One measurement of a retention curve.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint<K> {
    /// Ordering key, typically the cycle index.
    pub index: K,
    /// Raw retention fraction as measured.
    pub raw: f64,
    /// Retention fraction after smoothing.
    pub smoothed: f64,
}

impl<K> SeriesPoint<K> {
    #[inline]
    pub fn new(index: K, raw: f64, smoothed: f64) -> Self {
        Self { index, raw, smoothed }
    }
}

/// Ordered sequence of points for a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<K> {
    points: Vec<SeriesPoint<K>>,
}

impl<K> Series<K> {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates an empty series with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Wraps existing points without reordering them.
    pub fn from_points(points: Vec<SeriesPoint<K>>) -> Self {
        Self { points }
    }

    /// Appends a point at the end of the series.
    #[inline]
    pub fn push(&mut self, index: K, raw: f64, smoothed: f64) {
        self.points.push(SeriesPoint::new(index, raw, smoothed));
    }

    /// Returns the number of points in the series.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the series has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[SeriesPoint<K>] {
        &self.points
    }

    /// Iterates over the smoothed values in series order.
    pub fn smoothed(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.smoothed)
    }

    pub fn into_points(self) -> Vec<SeriesPoint<K>> {
        self.points
    }
}

impl<K: Clone> Series<K> {
    /// Returns a copy of the first `n` points (the whole series if `n >= len`).
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.points.len());
        Self {
            points: self.points[..n].to_vec(),
        }
    }
}

impl<K: Ord> Series<K> {
    /// Position of the first point whose index does not strictly exceed the
    /// index of its predecessor, or `None` if the series is strictly ascending.
    ///
    /// Duplicate indices are reported here as well.
    pub fn first_unordered(&self) -> Option<usize> {
        self.points
            .windows(2)
            .position(|pair| pair[1].index <= pair[0].index)
            .map(|i| i + 1)
    }

    /// Sorts points by index. The sort is stable, so duplicates keep their
    /// original relative order and are still caught by [`first_unordered`].
    ///
    /// [`first_unordered`]: Series::first_unordered
    pub fn sort_by_index(&mut self) {
        self.points.sort_by(|a, b| a.index.cmp(&b.index));
    }
}

impl<K> Default for Series<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> FromIterator<SeriesPoint<K>> for Series<K> {
    fn from_iter<I: IntoIterator<Item = SeriesPoint<K>>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Why a series was rejected as a whole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropReason {
    /// The first smoothed value is already below the floor threshold.
    StartsBelowFloor { first: f64, floor: f64 },
    /// Some smoothed value overshoots the ceiling threshold.
    ExceedsCeiling {
        position: usize,
        value: f64,
        ceiling: f64,
    },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::StartsBelowFloor { first, floor } => {
                write!(f, "starts below floor ({} < {})", first, floor)
            }
            DropReason::ExceedsCeiling {
                position,
                value,
                ceiling,
            } => write!(
                f,
                "exceeds ceiling at position {} ({} > {})",
                position, value, ceiling
            ),
        }
    }
}

/// Outcome of evaluating one series.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptanceResult<K> {
    Dropped {
        reason: DropReason,
    },
    /// `series` is the kept prefix; `cutoff` is its length, which is also the
    /// position of the first excluded point.
    Accepted {
        series: Series<K>,
        cutoff: usize,
    },
}

impl<K> AcceptanceResult<K> {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceResult::Accepted { .. })
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        matches!(self, AcceptanceResult::Dropped { .. })
    }

    /// The truncated series, if accepted.
    pub fn accepted_series(&self) -> Option<&Series<K>> {
        match self {
            AcceptanceResult::Accepted { series, .. } => Some(series),
            AcceptanceResult::Dropped { .. } => None,
        }
    }

    /// The drop reason, if dropped.
    pub fn drop_reason(&self) -> Option<&DropReason> {
        match self {
            AcceptanceResult::Dropped { reason } => Some(reason),
            AcceptanceResult::Accepted { .. } => None,
        }
    }
}
