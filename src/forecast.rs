use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::ledger::Ledger;

/// Future periods predicted when the caller does not ask for a horizon.
pub const DEFAULT_HORIZON: u32 = 90;

/// One predicted value with its confidence bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

/// The external forecasting collaborator. Given an ordered (date, value)
/// series it returns predictions for `horizon` future periods; its internals
/// are not part of this crate.
pub trait Forecaster {
    fn forecast(
        &self,
        series: &[(NaiveDate, f64)],
        horizon: u32,
    ) -> std::result::Result<Vec<ForecastPoint>, Box<dyn std::error::Error + Send + Sync>>;
}

/// History plus predictions, ready for the presentation adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub history: Vec<(NaiveDate, f64)>,
    pub points: Vec<ForecastPoint>,
    pub horizon: u32,
}

/// Daily net cash flow (total credit − total debit per `date`), the input
/// series for forecasting. Rows without a date are skipped.
pub fn net_cashflow_series(ledger: &Ledger) -> Vec<(NaiveDate, f64)> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in ledger.rows() {
        if let Some(date) = row.date {
            *by_day.entry(date).or_insert(0.0) += row.credit - row.debit;
        }
    }
    by_day.into_iter().collect()
}

/// Runs the collaborator over the ledger's net cash flow. Any failure — an
/// empty series or an error from the collaborator — surfaces as the
/// non-fatal `ForecastUnavailable`; callers omit the forecast view and keep
/// the rest of the session alive.
pub fn run_forecast(
    ledger: &Ledger,
    forecaster: &dyn Forecaster,
    horizon: u32,
) -> Result<ForecastSummary> {
    let history = net_cashflow_series(ledger);
    if history.is_empty() {
        return Err(ReportError::ForecastUnavailable(
            "no dated rows to build a series from".to_string(),
        ));
    }

    info!(
        "Forecasting {} future periods from {} observed days",
        horizon,
        history.len()
    );

    match forecaster.forecast(&history, horizon) {
        Ok(points) => Ok(ForecastSummary {
            history,
            points,
            horizon,
        }),
        Err(e) => {
            warn!("Forecasting collaborator failed: {}", e);
            Err(ReportError::ForecastUnavailable(e.to_string()))
        }
    }
}
