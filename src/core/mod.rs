//! Core data types and I/O operations.

pub mod loaders;
pub mod series;
pub mod writers;

pub use loaders::{load_retention_csv, LoaderError, RetentionRecord};
pub use series::{AcceptanceResult, DropReason, Series, SeriesPoint};
pub use writers::{write_accepted_csv, write_dropped_csv, write_tables, WriteError};
