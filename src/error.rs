use std::path::PathBuf;

use thiserror::Error;

use crate::report::ReportKind;
use crate::schema::Column;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Ledger source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Failed to parse ledger source: {0}")]
    Csv(#[from] csv::Error),

    #[error("Report '{report}' requires columns missing from the ledger: {columns:?}")]
    MissingColumns {
        report: ReportKind,
        columns: Vec<Column>,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
