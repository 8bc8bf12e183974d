//! Data processing modules.

pub mod acceptance;
pub mod batch;

// Re-export key types for convenience
pub use acceptance::{evaluate, AcceptanceError, SeriesAcceptanceFilter, Thresholds};
pub use batch::{
    evaluate_records, group_records, run_batch, BatchReport, BatchSummary, EntityReport,
};
