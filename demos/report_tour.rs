//! Builds every report kind from a small generated ledger and prints the
//! headline metrics, then runs a stub forecaster over the net cash flow.
//!
//! Run with: cargo run --example report_tour

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use ledger_reports::*;

struct FlatForecaster;

impl Forecaster for FlatForecaster {
    fn forecast(
        &self,
        series: &[(NaiveDate, f64)],
        horizon: u32,
    ) -> std::result::Result<Vec<ForecastPoint>, Box<dyn std::error::Error + Send + Sync>> {
        let (last_date, last_value) = *series.last().ok_or("empty series")?;
        Ok((1..=horizon as i64)
            .map(|offset| ForecastPoint {
                date: last_date + Duration::days(offset),
                predicted: last_value,
                lower: last_value * 0.8,
                upper: last_value * 1.2,
            })
            .collect())
    }
}

const SAMPLE: &str = "\
voucher_no,date,payment_date,due_date,debit,credit,amount,bank_deposit,bank_withdrawal,category,sub_category,account_head,account_name,account_type,party_name,party_type,payment_method,status
V-1,2024-01-05,2024-01-05,,1500,0,1500,0,0,Income,Product Sales,Sales Revenue,Cash at Bank,Asset,Acme Ltd,Customer,Cash,Received
V-2,2024-01-18,2024-01-18,,0,400,400,0,0,Expense,Office Rent,Rent Expense,Office,,City Estates,Vendor,Cash,Paid
V-3,2024-02-02,2024-02-02,2024-03-15,0,0,2200,0,0,Income,Service Income,Sales Revenue,Receivables,Asset,Beta GmbH,Customer,Invoice,Pending
V-4,2024-02-12,2024-02-12,2024-04-01,0,0,800,0,0,Expense,Materials,Purchase,Payables,Liability,Steel Corp,Vendor,Invoice,Pending
V-5,2024-02-20,2024-02-20,,0,0,900,900,0,Income,Service Income,Sales Revenue,Cash at Bank,Asset,Acme Ltd,Customer,Bank Transfer,Received
V-6,2024-03-03,2024-03-03,2024-12-01,0,0,5000,0,0,Loan,Bank Loan,Long Term Liability,Loans,Liability,First Bank,Lender,Bank Transfer,Pending
V-7,2024-03-14,2024-03-14,,0,250,250,0,250,Expense,Utilities,Utility Expense,Office,,Power Co,Vendor,Bank Transfer,Paid
";

fn main() -> Result<()> {
    env_logger::init();

    let ledger = Ledger::from_reader(SAMPLE.as_bytes())?;
    let today = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let params = ReportParams::new(today);

    for kind in ReportKind::ALL {
        let result = build_report(&ledger, kind, &params)?;
        if result.is_empty() {
            println!("{:<14} (no matching rows)", kind.name());
            continue;
        }
        println!("{:<14} rows={}", kind.name(), result.row_count);
        for (name, value) in &result.metrics {
            println!("    {:<24} {:>12.2}", name, value);
        }
        if let Some(table) = result.tables.first() {
            println!("    primary table: {} ({} groups)", table.name, table.rows.len());
        }
    }

    match run_forecast(&ledger, &FlatForecaster, 14) {
        Ok(summary) => {
            println!("forecast: {} points from {} observed days", summary.points.len(), summary.history.len());
        }
        Err(e) => println!("forecast skipped: {}", e),
    }

    let window_start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let window_end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    println!(
        "export target: {}",
        export_filename(ReportKind::Cashbook, window_start, window_end, "csv")
    );

    Ok(())
}
