//! Acceptance filtering of smoothed battery capacity-retention curves.
//!
//! This crate provides tools for:
//! - Loading per-cycle retention tables (raw and smoothed values per cell)
//! - Dropping curves that start below a floor or overshoot a ceiling
//! - Truncating accepted curves at end of life (first point below the floor)
//! - Evaluating many cells in parallel and writing accepted/dropped tables
//!
//! # Example
//!
//! ```no_run
//! use retention_pipeline::config::{ColumnConfig, OrderingPolicy};
//! use retention_pipeline::core::loaders::load_retention_csv;
//! use retention_pipeline::processors::{evaluate_records, SeriesAcceptanceFilter};
//!
//! let records = load_retention_csv("denoise_full_data.csv", &ColumnConfig::default()).unwrap();
//! let report = evaluate_records(records, &SeriesAcceptanceFilter::default(), OrderingPolicy::Sort);
//! println!("accepted {} of {}", report.summary.accepted, report.summary.total);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{AcceptanceConfig, ColumnConfig, OrderingPolicy, PipelineConfig, SmoothingConfig};
pub use core::series::{AcceptanceResult, Series, SeriesPoint};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
