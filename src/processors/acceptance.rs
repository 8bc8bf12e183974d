//! Acceptance filtering and end-of-life truncation of retention curves.
//!
//! A smoothed curve is dropped outright when it starts below the floor
//! threshold or overshoots the ceiling threshold anywhere. Otherwise it is
//! accepted and cut at the first point that falls below the floor.
//!
//! # Example
//!
//! ```
//! use retention_pipeline::core::series::{AcceptanceResult, Series, SeriesPoint};
//! use retention_pipeline::processors::acceptance::{SeriesAcceptanceFilter, Thresholds};
//!
//! let series: Series<i64> = [(1, 0.9), (2, 0.85), (3, 0.6), (4, 0.95)]
//!     .into_iter()
//!     .map(|(i, v)| SeriesPoint::new(i, v, v))
//!     .collect();
//!
//! let filter = SeriesAcceptanceFilter::new(Thresholds::default());
//! match filter.evaluate(&series).unwrap() {
//!     AcceptanceResult::Accepted { cutoff, .. } => assert_eq!(cutoff, 2),
//!     AcceptanceResult::Dropped { .. } => unreachable!(),
//! }
//! ```

use thiserror::Error;

use crate::core::series::{AcceptanceResult, DropReason, Series};

/// Default minimum acceptable retention fraction.
pub const DEFAULT_FLOOR_THRESHOLD: f64 = 0.7;

/// Default maximum physically plausible retention fraction.
pub const DEFAULT_CEILING_THRESHOLD: f64 = 1.05;

/// Errors that can occur while evaluating a series.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcceptanceError {
    #[error("series is empty")]
    EmptySeries,

    #[error("series is not strictly ascending by index at position {position}")]
    UnsortedSeries { position: usize },

    #[error("smoothed value is NaN at position {position}")]
    NotANumber { position: usize },

    #[error("invalid thresholds: floor {floor} and ceiling {ceiling} must satisfy 0 < floor < ceiling")]
    InvalidConfiguration { floor: f64, ceiling: f64 },
}

/// Result type for acceptance operations.
pub type Result<T> = std::result::Result<T, AcceptanceError>;

/// Validated floor/ceiling pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    floor: f64,
    ceiling: f64,
}

impl Thresholds {
    /// Validates `0 < floor < ceiling` (both finite).
    pub fn new(floor: f64, ceiling: f64) -> Result<Self> {
        let valid = floor.is_finite() && ceiling.is_finite() && floor > 0.0 && floor < ceiling;
        if !valid {
            return Err(AcceptanceError::InvalidConfiguration { floor, ceiling });
        }
        Ok(Self { floor, ceiling })
    }

    /// Minimum acceptable retention fraction.
    #[inline]
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Maximum physically plausible retention fraction; values above signal
    /// sensor or process error.
    #[inline]
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR_THRESHOLD,
            ceiling: DEFAULT_CEILING_THRESHOLD,
        }
    }
}

/// Classifies retention series as accepted or dropped.
///
/// The filter holds no mutable state; a single instance can be shared across
/// threads and applied to any number of series.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesAcceptanceFilter {
    thresholds: Thresholds,
}

impl SeriesAcceptanceFilter {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    #[inline]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Evaluates one series.
    ///
    /// The series must be strictly ascending by index.
    ///
    /// # Errors
    ///
    /// - [`AcceptanceError::EmptySeries`] if there are no points
    /// - [`AcceptanceError::UnsortedSeries`] if an index does not exceed its predecessor
    /// - [`AcceptanceError::NotANumber`] if a smoothed value is NaN and the
    ///   series was not already dropped
    ///
    /// Infinities compare normally against both thresholds.
    pub fn evaluate<K: Ord + Clone>(&self, series: &Series<K>) -> Result<AcceptanceResult<K>> {
        let first = series
            .points()
            .first()
            .ok_or(AcceptanceError::EmptySeries)?;

        if let Some(position) = series.first_unordered() {
            return Err(AcceptanceError::UnsortedSeries { position });
        }

        let Thresholds { floor, ceiling } = self.thresholds;

        if first.smoothed < floor {
            return Ok(AcceptanceResult::Dropped {
                reason: DropReason::StartsBelowFloor {
                    first: first.smoothed,
                    floor,
                },
            });
        }

        // Ceiling applies to the whole series, including the tail that
        // truncation below would discard.
        if let Some((position, value)) = series
            .smoothed()
            .enumerate()
            .find(|&(_, v)| v > ceiling)
        {
            return Ok(AcceptanceResult::Dropped {
                reason: DropReason::ExceedsCeiling {
                    position,
                    value,
                    ceiling,
                },
            });
        }

        // NaN compares false against both thresholds, so past the drop rules
        // it would silently shift the cutoff.
        if let Some(position) = series.smoothed().position(f64::is_nan) {
            return Err(AcceptanceError::NotANumber { position });
        }

        let cutoff = series
            .smoothed()
            .position(|v| v < floor)
            .unwrap_or(series.len());

        Ok(AcceptanceResult::Accepted {
            series: series.truncated(cutoff),
            cutoff,
        })
    }
}

/// Validates the thresholds and evaluates `series` in one call.
pub fn evaluate<K: Ord + Clone>(
    series: &Series<K>,
    floor: f64,
    ceiling: f64,
) -> Result<AcceptanceResult<K>> {
    let thresholds = Thresholds::new(floor, ceiling)?;
    SeriesAcceptanceFilter::new(thresholds).evaluate(series)
}
