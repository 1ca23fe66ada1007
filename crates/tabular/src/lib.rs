//! `tabops-tabular` — in-memory tabular datasets and the relational merge engine.
//!
//! A [`Dataset`] is an ordered set of named columns plus rows of text cells,
//! loaded fully into memory for the duration of one operation. The crate knows
//! how to read/write delimited text and spreadsheets, join two datasets with
//! provenance tracking, and produce the presentation artifacts the HTTP layer
//! serves (previews, inferred column types, unique-value counts).

pub mod dataset;
pub mod io;
pub mod merge;

pub use dataset::Dataset;
pub use io::{read_dataset_bytes, read_dataset_path, to_csv_bytes, to_xlsx_bytes};
pub use merge::{match_preview, merge, JoinType, MatchPreview, MergeOutput, MergeStats};

use thiserror::Error;

/// Errors from dataset IO and merge operations.
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("unsupported file type: {0}. Use CSV or Excel.")]
    UnsupportedFormat(String),

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("dataset is empty")]
    Empty,
}
