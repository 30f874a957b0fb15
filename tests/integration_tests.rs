use chrono::{Duration, NaiveDate};
use ledger_reports::*;
use std::path::PathBuf;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn fixture_csv() -> String {
    let d45 = (today() - Duration::days(45)).format("%Y-%m-%d").to_string();
    let d10 = (today() - Duration::days(10)).format("%Y-%m-%d").to_string();
    format!(
        "\
voucher_no,date,payment_date,due_date,debit,credit,amount,bank_deposit,bank_withdrawal,category,sub_category,account_head,account_name,account_type,party_name,party_type,payment_method,status,particulars
V-1,2024-01-05,2024-01-05,,100,0,100,0,0,Income,Product Sales,Sales Revenue,Cash at Bank,Asset,Acme Ltd,Customer,Cash,Received,January sale
V-2,2024-01-20,2024-01-20,,0,40,40,0,0,Expense,Office Rent,Rent Expense,Office,,City Estates,Vendor,Cash,Paid,January rent
V-3,2024-02-02,2024-02-02,{d45},0,0,1200,0,0,Income,Service Income,Sales Revenue,Receivables,Asset,Beta GmbH,Customer,Invoice,Pending,February invoice
V-4,2024-02-10,2024-02-10,{d10},0,0,300,0,0,Expense,Materials,Purchase,Payables,Liability,Steel Corp,Vendor,Invoice,Pending,Steel order
V-5,2024-02-15,2024-02-15,,0,0,500,500,0,Income,Service Income,Sales Revenue,Cash at Bank,Asset,Acme Ltd,Customer,Bank Transfer,Received,Deposit received
V-6,2024-03-01,2024-03-01,2024-09-01,0,0,2000,0,0,Loan,Bank Loan,Long Term Liability,Loans,Liability,First Bank,Lender,Bank Transfer,Pending,Facility drawdown
V-7,2024-03-05,2024-03-05,,80,0,80,0,0,Income,Product Sales,Sales Revenue,Cash at Bank,Asset,Gamma LLC,Customer,Cash,Received,March sale
V-8,2024-03-12,2024-03-12,,0,60,60,0,60,Expense,Utilities,Utility Expense,Office,,Power Co,Vendor,Bank Transfer,Paid,Electricity
V-9,bad-date,also-bad,,oops,12,not-a-number,0,0,Expense,Misc,Sundry Expense,Office,,Unknown,Vendor,Cash,Paid,Unparseable row
",
        d45 = d45,
        d10 = d10
    )
}

fn fixture_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("ledger_reports_tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn load_fixture(name: &str) -> Ledger {
    let path = fixture_path(name);
    std::fs::write(&path, fixture_csv()).unwrap();
    let mut store = LedgerStore::new();
    let ledger = store.load(&path).unwrap();
    Ledger::clone(&ledger)
}

#[test]
fn test_loader_coerces_bad_cells_without_failing() {
    let ledger = load_fixture("coercion.csv");
    assert_eq!(ledger.len(), 9);

    let bad = &ledger.rows()[8];
    assert_eq!(bad.date, None);
    assert_eq!(bad.payment_date, None);
    assert_eq!(bad.debit, 0.0);
    assert_eq!(bad.amount, 0.0);
    assert_eq!(bad.credit, 12.0);

    for row in ledger.rows() {
        for value in [row.debit, row.credit, row.amount] {
            assert!(value.is_finite());
        }
    }
}

#[test]
fn test_cashbook_over_fixture() {
    let ledger = load_fixture("cashbook.csv");
    let params = ReportParams::new(today()).with_range(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
    );
    let result = build_report(&ledger, ReportKind::Cashbook, &params).unwrap();

    // Cash rows inside the window: V-1 (100 in), V-2 (40 out), V-7 (80 in).
    assert_eq!(result.metrics["total_cash_in"], 180.0);
    assert_eq!(result.metrics["total_cash_out"], 40.0);
    assert_eq!(result.metrics["net_cash_flow"], 140.0);

    let monthly = &result.tables[0];
    assert_eq!(monthly.name, "monthly_cash_flow");
    assert_eq!(monthly.rows.len(), 2); // 2024-01 and 2024-03
    let series = result.series.as_ref().unwrap();
    assert_eq!(series.points.len(), 2);
}

#[test]
fn test_monthly_totals_scenario() {
    // {date: 2024-01-05, debit: 100} and {date: 2024-01-20, credit: 40}
    // aggregate to total_debit=100, total_credit=40, net=60 for "2024-01".
    let ledger = load_fixture("monthly.csv");
    let rows: Vec<&LedgerRow> = ledger
        .rows()
        .iter()
        .filter(|r| r.voucher_no == "V-1" || r.voucher_no == "V-2")
        .collect();

    let mut table = SummaryTable::aggregate(
        "monthly",
        &rows,
        &[GroupKey::Month(DateField::Date)],
        &[
            Metric::new("total_debit", Reduction::Sum(NumericField::Debit)),
            Metric::new("total_credit", Reduction::Sum(NumericField::Credit)),
        ],
        today(),
    );
    table.add_difference("total_debit", "total_credit", "net");

    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].keys[0], "2024-01");
    assert_eq!(table.rows[0].values[0], Cell::Number(100.0));
    assert_eq!(table.rows[0].values[1], Cell::Number(40.0));
    assert_eq!(table.rows[0].values[2], Cell::Number(60.0));
}

#[test]
fn test_receivables_aging_over_fixture() {
    let ledger = load_fixture("receivables.csv");
    let result =
        build_report(&ledger, ReportKind::Receivables, &ReportParams::new(today())).unwrap();

    // Only V-3 is an open customer invoice with a due date; 45 days overdue.
    assert_eq!(result.metrics["total_receivable"], 1200.0);
    assert_eq!(result.metrics["overdue_amount"], 1200.0);

    let aging = &result.tables[0];
    assert_eq!(aging.rows.len(), 1);
    assert_eq!(aging.rows[0].keys[0], "31-60 Days");
    // Share of total is 100% for the single bucket.
    assert_eq!(aging.rows[0].values[2], Cell::Number(100.0));

    let customers = &result.tables[1];
    assert_eq!(customers.rows[0].keys[0], "Beta GmbH");
    assert_eq!(customers.rows[0].values[3], Cell::Number(45.0));
}

#[test]
fn test_payables_over_fixture() {
    let ledger = load_fixture("payables.csv");
    let result =
        build_report(&ledger, ReportKind::Payables, &ReportParams::new(today())).unwrap();

    // V-4 is the only unpaid vendor row: 300, overdue by 10 days.
    assert_eq!(result.metrics["total_payable"], 300.0);
    assert_eq!(result.metrics["overdue_amount"], 300.0);
    assert_eq!(result.metrics["vendor_count"], 1.0);

    let aging = &result.tables[1];
    assert_eq!(aging.rows[0].keys[0], "0-30 Days");
}

#[test]
fn test_liability_report_over_fixture() {
    let ledger = load_fixture("liability.csv");
    let result =
        build_report(&ledger, ReportKind::Liability, &ReportParams::new(today())).unwrap();

    // V-6 matches via account_head/sub_category keywords.
    assert_eq!(result.metrics["total_liabilities"], 2000.0);
    assert_eq!(result.metrics["unsettled_amount"], 2000.0);
    assert_eq!(result.metrics["settled_amount"], 0.0);
}

#[test]
fn test_balance_sheet_over_fixture() {
    let ledger = load_fixture("balance_sheet.csv");
    let result =
        build_report(&ledger, ReportKind::BalanceSheet, &ReportParams::new(today())).unwrap();

    // Assets: V-1 100 + V-3 1200 + V-5 500 + V-7 80 = 1880.
    // Liabilities: V-4 300 + V-6 2000 = 2300. No equity rows: derived.
    assert_eq!(result.metrics["total_assets"], 1880.0);
    assert_eq!(result.metrics["total_liabilities"], 2300.0);
    assert_eq!(result.metrics["total_equity"], -420.0);
    assert_eq!(result.metrics["working_capital"], -420.0);

    let overview = &result.tables[0];
    assert_eq!(overview.rows.len(), 3);
}

#[test]
fn test_income_and_expense_share_one_pipeline() {
    let ledger = load_fixture("income_expense.csv");
    let params = ReportParams::new(today());

    let income = build_report(&ledger, ReportKind::Income, &params).unwrap();
    // Income rows: V-1 100, V-3 1200, V-5 500, V-7 80 (bucket keywords).
    assert_eq!(income.metrics["total_income"], 1880.0);
    assert_eq!(income.metrics["top_contribution"], 1200.0);

    let expense = build_report(&ledger, ReportKind::Expense, &params).unwrap();
    // Expense rows' credit totals: V-2 40 + V-8 60 + V-9 12 = 112.
    assert_eq!(expense.metrics["total_expense"], 112.0);

    let shares: f64 = expense.tables[0]
        .rows
        .iter()
        .map(|r| r.values.last().unwrap().as_number().unwrap())
        .sum();
    assert!((shares - 100.0).abs() < 1e-9);
}

#[test]
fn test_management_report_over_fixture() {
    let ledger = load_fixture("management.csv");
    let params = ReportParams::new(today()).with_range(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    );
    let result = build_report(&ledger, ReportKind::Management, &params).unwrap();

    assert_eq!(result.metrics["total_sales"], 180.0); // V-1 + V-7 debits
    assert_eq!(result.metrics["total_expenses"], 100.0); // V-2 + V-8 credits
    assert_eq!(result.metrics["total_payables"], 300.0); // V-4 pending vendor
    assert_eq!(result.metrics["total_receivables"], 1200.0); // V-3 pending customer

    let categories = &result.tables[0];
    assert_eq!(categories.name, "category_summary");
    assert!(!categories.is_empty());
}

#[test]
fn test_export_round_trip_from_report_subset() {
    let ledger = load_fixture("round_trip.csv");
    let table = BucketTable::standard();
    let subset = table.select(&ledger, Bucket::Expense);
    let debit_sum: f64 = subset.iter().map(|r| r.debit).sum();
    let credit_sum: f64 = subset.iter().map(|r| r.credit).sum();

    let csv = rows_to_csv(&subset).unwrap();
    let reloaded = Ledger::from_reader(csv.as_bytes()).unwrap();

    assert_eq!(reloaded.len(), subset.len());
    let reloaded_debit: f64 = reloaded.rows().iter().map(|r| r.debit).sum();
    let reloaded_credit: f64 = reloaded.rows().iter().map(|r| r.credit).sum();
    assert!((reloaded_debit - debit_sum).abs() < 1e-9);
    assert!((reloaded_credit - credit_sum).abs() < 1e-9);
}

#[test]
fn test_export_filename_for_report_window() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    assert_eq!(
        export_filename(ReportKind::Management, start, end, "csv"),
        "management_2024-01-01_to_2024-03-31.csv"
    );
}

#[test]
fn test_forecast_with_stub_collaborator() {
    struct TrendForecaster;

    impl Forecaster for TrendForecaster {
        fn forecast(
            &self,
            series: &[(NaiveDate, f64)],
            horizon: u32,
        ) -> std::result::Result<Vec<ForecastPoint>, Box<dyn std::error::Error + Send + Sync>>
        {
            let (last_date, last_value) = *series.last().ok_or("empty series")?;
            Ok((1..=horizon as i64)
                .map(|offset| ForecastPoint {
                    date: last_date + Duration::days(offset),
                    predicted: last_value,
                    lower: last_value * 0.9,
                    upper: last_value * 1.1,
                })
                .collect())
        }
    }

    let ledger = load_fixture("forecast.csv");
    let summary = run_forecast(&ledger, &TrendForecaster, DEFAULT_HORIZON).unwrap();
    assert_eq!(summary.points.len(), DEFAULT_HORIZON as usize);
    assert_eq!(summary.horizon, DEFAULT_HORIZON);
    for point in &summary.points {
        assert!(point.lower <= point.predicted && point.predicted <= point.upper);
    }
}

#[test]
fn test_report_result_serializes_for_adapters() {
    let ledger = load_fixture("serialize.csv");
    let result =
        build_report(&ledger, ReportKind::Bankbook, &ReportParams::new(today())).unwrap();
    let json = report_to_json(&result).unwrap();
    assert!(json.contains("\"kind\": \"bankbook\""));
    assert!(json.contains("total_deposit"));
}
