//! # Ledger Reports
//!
//! A library for deriving filtered financial reports (cashbook, bankbook,
//! liabilities, income, expense, payables/receivables aging, management
//! summary, balance sheet) from a single transaction ledger.
//!
//! ## Core Concepts
//!
//! - **Ledger**: the full loaded transaction table, read once and held as an
//!   immutable snapshot for the session
//! - **Bucket**: a named subset of the ledger selected by a declarative
//!   keyword rule (e.g. "liability", "cash"); one row can sit in several
//!   buckets
//! - **Report**: a named, parameterized pipeline of classify → aggregate →
//!   derive → assemble producing metrics and summary tables
//! - **Aging bucket**: a fixed-width time-since-due-date category used for
//!   receivables/payables
//! - **Net flow**: debit-type total minus credit-type total for a subset
//!
//! Every report shares the same pipeline shape; the report kinds differ only
//! in which classification rules, grouping keys and metrics they use.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_reports::*;
//! use chrono::NaiveDate;
//!
//! let mut store = LedgerStore::new();
//! let ledger = store.load(std::path::Path::new("data/accounts.csv"))?;
//!
//! let params = ReportParams::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
//!     .with_range(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
//!     );
//!
//! let cashbook = build_report(&ledger, ReportKind::Cashbook, &params)?;
//! println!("net cash flow: {}", cashbook.metrics["net_cash_flow"]);
//! ```

pub mod aggregate;
pub mod classify;
pub mod error;
pub mod export;
pub mod forecast;
pub mod ledger;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregate::{
    guarded_ratio, percent_change, previous_period, AgingBucket, Cell, GroupKey, Metric,
    Reduction, SummaryRow, SummaryTable,
};
pub use classify::{contains_any, Bucket, BucketRule, BucketTable, Rule, RuleSet};
pub use error::{ReportError, Result};
pub use export::{
    export_filename, report_to_json, rows_to_csv, table_to_csv, write_rows_csv,
};
pub use forecast::{
    net_cashflow_series, run_forecast, ForecastPoint, ForecastSummary, Forecaster,
    DEFAULT_HORIZON,
};
pub use ledger::{Ledger, LedgerRow, LedgerStore};
pub use report::{
    build_report, ReportBuilder, ReportKind, ReportParams, ReportResult, TableSort, TimeSeries,
};
pub use schema::{Column, DateField, NumericField, TextField};
