use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::aggregate::{
    guarded_ratio, percent_change, previous_period, Cell, GroupKey, Metric, Reduction, SummaryRow,
    SummaryTable,
};
use crate::classify::{contains_any, Bucket, BucketTable, Rule, RuleSet};
use crate::error::{ReportError, Result};
use crate::ledger::{Ledger, LedgerRow};
use crate::schema::{Column, DateField, NumericField, TextField};
use crate::utils::{last_day_of_month, within};

/// The named report pipelines. All of them share one classify → aggregate →
/// derive → assemble shape; they differ only in rules, group keys and
/// metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Cashbook,
    Bankbook,
    Liability,
    Income,
    Expense,
    Payables,
    Receivables,
    BalanceSheet,
    Management,
}

impl ReportKind {
    pub const ALL: [ReportKind; 9] = [
        ReportKind::Cashbook,
        ReportKind::Bankbook,
        ReportKind::Liability,
        ReportKind::Income,
        ReportKind::Expense,
        ReportKind::Payables,
        ReportKind::Receivables,
        ReportKind::BalanceSheet,
        ReportKind::Management,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportKind::Cashbook => "cashbook",
            ReportKind::Bankbook => "bankbook",
            ReportKind::Liability => "liability",
            ReportKind::Income => "income",
            ReportKind::Expense => "expense",
            ReportKind::Payables => "payables",
            ReportKind::Receivables => "receivables",
            ReportKind::BalanceSheet => "balance_sheet",
            ReportKind::Management => "management",
        }
    }

    /// Columns the pipeline reads; their absence fails the report (and only
    /// this report) with `MissingColumns`.
    pub fn required_columns(self) -> &'static [Column] {
        match self {
            ReportKind::Cashbook => &[
                Column::PaymentDate,
                Column::PaymentMethod,
                Column::Debit,
                Column::Credit,
                Column::VoucherNo,
                Column::AccountHead,
            ],
            ReportKind::Bankbook => &[
                Column::BankDeposit,
                Column::BankWithdrawal,
                Column::AccountHead,
                Column::PaymentDate,
                Column::PaymentMethod,
            ],
            ReportKind::Liability => &[
                Column::Amount,
                Column::DueDate,
                Column::Status,
                Column::PartyName,
                Column::AccountHead,
                Column::SubCategory,
                Column::PartyType,
            ],
            ReportKind::Income => &[
                Column::Amount,
                Column::PaymentDate,
                Column::AccountHead,
                Column::Category,
                Column::SubCategory,
                Column::PartyName,
                Column::PaymentMethod,
                Column::AccountName,
            ],
            ReportKind::Expense => &[
                Column::Credit,
                Column::PaymentDate,
                Column::AccountHead,
                Column::Category,
                Column::SubCategory,
                Column::PartyName,
            ],
            ReportKind::Payables | ReportKind::Receivables => &[
                Column::PartyType,
                Column::Status,
                Column::Amount,
                Column::PartyName,
                Column::DueDate,
            ],
            ReportKind::BalanceSheet => {
                &[Column::AccountName, Column::AccountType, Column::Amount]
            }
            ReportKind::Management => &[
                Column::Date,
                Column::Debit,
                Column::Credit,
                Column::Amount,
                Column::Category,
                Column::PartyType,
            ],
        }
    }

    /// The date column the report's range filter applies to.
    pub fn date_field(self) -> DateField {
        match self {
            ReportKind::Cashbook
            | ReportKind::Bankbook
            | ReportKind::Income
            | ReportKind::Expense => DateField::PaymentDate,
            ReportKind::Liability | ReportKind::Payables | ReportKind::Receivables => {
                DateField::DueDate
            }
            ReportKind::BalanceSheet | ReportKind::Management => DateField::Date,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort directive for a report's primary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSort {
    pub column: String,
    pub descending: bool,
}

/// Per-request parameters: an optional inclusive date range, the explicit
/// reference date for overdue math, extra multi-select filters, and an
/// optional sort for the primary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub today: NaiveDate,
    pub filters: Vec<Rule>,
    pub sort: Option<TableSort>,
}

impl ReportParams {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            start: None,
            end: None,
            today,
            filters: Vec::new(),
            sort: None,
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_filter(mut self, rule: Rule) -> Self {
        self.filters.push(rule);
        self
    }

    pub fn sorted_by(mut self, column: &str, descending: bool) -> Self {
        self.sort = Some(TableSort {
            column: column.to_string(),
            descending,
        });
        self
    }

    fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ReportError::InvalidDateRange { start, end });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    pub points: Vec<(NaiveDate, f64)>,
}

/// Structured report output for a presentation adapter: scalar metrics,
/// summary tables in display order, and an optional time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub kind: ReportKind,
    pub metrics: BTreeMap<String, f64>,
    pub tables: Vec<SummaryTable>,
    pub series: Option<TimeSeries>,
    pub row_count: usize,
}

impl ReportResult {
    fn empty(kind: ReportKind) -> Self {
        Self {
            kind,
            metrics: BTreeMap::new(),
            tables: Vec::new(),
            series: None,
            row_count: 0,
        }
    }

    /// True when the classification matched no rows; callers render an
    /// informational "no data" state instead of an error.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Builds reports against immutable ledger snapshots using a bucket table.
pub struct ReportBuilder {
    buckets: BucketTable,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            buckets: BucketTable::standard(),
        }
    }

    pub fn with_buckets(buckets: BucketTable) -> Self {
        Self { buckets }
    }

    pub fn build(
        &self,
        ledger: &Ledger,
        kind: ReportKind,
        params: &ReportParams,
    ) -> Result<ReportResult> {
        let missing = ledger.missing_columns(kind.required_columns());
        if !missing.is_empty() {
            return Err(ReportError::MissingColumns {
                report: kind,
                columns: missing,
            });
        }
        params.validate()?;

        info!("Building {} report over {} ledger rows", kind, ledger.len());

        let rows = self.select(ledger, kind, params.start, params.end, params)?;
        if rows.is_empty() {
            debug!("{} report matched no rows", kind);
            return Ok(ReportResult::empty(kind));
        }

        let mut result = match kind {
            ReportKind::Cashbook => self.assemble_cashbook(ledger, &rows, params),
            ReportKind::Bankbook => assemble_bankbook(&rows, params),
            ReportKind::Liability => assemble_liability(&rows, params),
            ReportKind::Income => assemble_income(&rows, params),
            ReportKind::Expense => assemble_expense(&rows, params),
            ReportKind::Payables => assemble_payables(&rows, params),
            ReportKind::Receivables => assemble_receivables(&rows, params),
            ReportKind::BalanceSheet => assemble_balance_sheet(&rows, params),
            ReportKind::Management => assemble_management(&rows, params),
        }?;

        if let Some(sort) = &params.sort {
            if let Some(table) = result.tables.first_mut() {
                table.sort_by(&sort.column, sort.descending);
            }
        }

        Ok(result)
    }

    /// The shared classification step: bucket membership (where the kind has
    /// one), the kind's fixed rules, the requested date window, and the
    /// caller's extra filters, all ANDed together.
    fn select<'a>(
        &self,
        ledger: &'a Ledger,
        kind: ReportKind,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        params: &ReportParams,
    ) -> Result<Vec<&'a LedgerRow>> {
        let bucket = report_bucket(kind);
        let fixed = fixed_rules(kind);
        let date_field = kind.date_field();
        // Balance sheet is a snapshot: everything dated up to `end`.
        let start = if kind == ReportKind::BalanceSheet {
            None
        } else {
            start
        };
        let bounded = start.is_some() || end.is_some();

        let mut rule_set = RuleSet::new(fixed);
        for rule in &params.filters {
            rule_set.push(rule.clone());
        }
        rule_set.validate()?;

        Ok(ledger
            .rows()
            .iter()
            .filter(|row| {
                if let Some(b) = bucket {
                    if !self.buckets.matches_bucket(row, b) {
                        return false;
                    }
                }
                if bounded {
                    match date_field.value(row) {
                        Some(date) => {
                            if !within(date, start, end) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                rule_set.matches(row, params.today)
            })
            .collect())
    }

    fn assemble_cashbook(
        &self,
        ledger: &Ledger,
        rows: &[&LedgerRow],
        params: &ReportParams,
    ) -> Result<ReportResult> {
        let total_in: f64 = rows.iter().map(|r| r.debit).sum();
        let total_out: f64 = rows.iter().map(|r| r.credit).sum();

        let mut metrics = BTreeMap::new();
        metrics.insert("total_cash_in".to_string(), total_in);
        metrics.insert("total_cash_out".to_string(), total_out);
        metrics.insert("net_cash_flow".to_string(), total_in - total_out);
        metrics.insert(
            "transaction_count".to_string(),
            distinct(rows, TextField::VoucherNo) as f64,
        );
        metrics.insert(
            "account_head_count".to_string(),
            distinct(rows, TextField::AccountHead) as f64,
        );

        // Period-over-period deltas compare the same classification applied
        // to the immediately preceding window of equal length.
        if let (Some(start), Some(end)) = (params.start, params.end) {
            let (prev_start, prev_end) = previous_period(start, end);
            let prev_rows = self.select(
                ledger,
                ReportKind::Cashbook,
                Some(prev_start),
                Some(prev_end),
                params,
            )?;
            let prev_in: f64 = prev_rows.iter().map(|r| r.debit).sum();
            let prev_out: f64 = prev_rows.iter().map(|r| r.credit).sum();
            metrics.insert(
                "cash_in_change_pct".to_string(),
                percent_change(total_in, prev_in),
            );
            metrics.insert(
                "cash_out_change_pct".to_string(),
                percent_change(total_out, prev_out),
            );
        }

        let mut monthly = SummaryTable::aggregate(
            "monthly_cash_flow",
            rows,
            &[GroupKey::Month(DateField::PaymentDate)],
            &[
                Metric::new("total_debit", Reduction::Sum(NumericField::Debit)),
                Metric::new("total_credit", Reduction::Sum(NumericField::Credit)),
                Metric::new(
                    "transactions",
                    Reduction::DistinctCount(TextField::VoucherNo),
                ),
            ],
            params.today,
        );
        monthly.add_difference("total_debit", "total_credit", "net_flow");
        monthly.sort_by("month", false);

        let mut by_account = SummaryTable::aggregate(
            "account_head_summary",
            rows,
            &[GroupKey::Text(TextField::AccountHead)],
            &[
                Metric::new("total_debit", Reduction::Sum(NumericField::Debit)),
                Metric::new("total_credit", Reduction::Sum(NumericField::Credit)),
                Metric::new(
                    "transactions",
                    Reduction::DistinctCount(TextField::VoucherNo),
                ),
            ],
            params.today,
        );
        by_account.add_difference("total_debit", "total_credit", "net_flow");
        by_account.sort_by("net_flow", true);

        let mut by_party = SummaryTable::aggregate(
            "party_summary",
            rows,
            &[GroupKey::Text(TextField::PartyName)],
            &[
                Metric::new("total_debit", Reduction::Sum(NumericField::Debit)),
                Metric::new("total_credit", Reduction::Sum(NumericField::Credit)),
                Metric::new(
                    "transactions",
                    Reduction::DistinctCount(TextField::VoucherNo),
                ),
            ],
            params.today,
        );
        by_party.sort_by("total_debit", true);

        let series = monthly_series(rows, DateField::PaymentDate, "net_cash_flow", |r| {
            r.debit - r.credit
        });

        Ok(ReportResult {
            kind: ReportKind::Cashbook,
            metrics,
            tables: vec![monthly, by_account, by_party],
            series: Some(series),
            row_count: rows.len(),
        })
    }
}

/// Convenience wrapper using the standard bucket table.
pub fn build_report(
    ledger: &Ledger,
    kind: ReportKind,
    params: &ReportParams,
) -> Result<ReportResult> {
    ReportBuilder::new().build(ledger, kind, params)
}

fn report_bucket(kind: ReportKind) -> Option<Bucket> {
    match kind {
        ReportKind::Cashbook => Some(Bucket::Cash),
        ReportKind::Bankbook => Some(Bucket::Bank),
        ReportKind::Liability => Some(Bucket::Liability),
        ReportKind::Income => Some(Bucket::Income),
        ReportKind::Expense => Some(Bucket::Expense),
        _ => None,
    }
}

fn fixed_rules(kind: ReportKind) -> Vec<Rule> {
    match kind {
        ReportKind::Payables => vec![
            Rule::MemberOf {
                field: TextField::PartyType,
                allowed: vec!["vendor".to_string()],
            },
            Rule::NoKeyword {
                fields: vec![TextField::Status],
                keywords: vec!["paid".to_string()],
            },
        ],
        ReportKind::Receivables => vec![
            Rule::AnyKeyword {
                fields: vec![TextField::PartyType],
                keywords: vec!["customer".to_string()],
            },
            Rule::NoKeyword {
                fields: vec![TextField::Status],
                keywords: vec!["received".to_string(), "paid".to_string()],
            },
        ],
        _ => Vec::new(),
    }
}

fn distinct(rows: &[&LedgerRow], field: TextField) -> usize {
    let mut seen: Vec<&str> = rows.iter().map(|r| field.value(r)).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn settled(row: &LedgerRow, keywords: &[String]) -> bool {
    contains_any(&row.status, keywords)
}

fn monthly_series(
    rows: &[&LedgerRow],
    field: DateField,
    name: &str,
    value: impl Fn(&LedgerRow) -> f64,
) -> TimeSeries {
    let mut by_month: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in rows {
        if let Some(date) = field.value(row) {
            let month_end = last_day_of_month(date.year(), date.month());
            *by_month.entry(month_end).or_insert(0.0) += value(row);
        }
    }
    TimeSeries {
        name: name.to_string(),
        points: by_month.into_iter().collect(),
    }
}

fn assemble_bankbook(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let total_deposit: f64 = rows.iter().map(|r| r.bank_deposit).sum();
    let total_withdrawal: f64 = rows.iter().map(|r| r.bank_withdrawal).sum();

    let mut metrics = BTreeMap::new();
    metrics.insert("total_deposit".to_string(), total_deposit);
    metrics.insert("total_withdrawal".to_string(), total_withdrawal);
    metrics.insert("net_flow".to_string(), total_deposit - total_withdrawal);
    metrics.insert(
        "total_amount".to_string(),
        rows.iter().map(|r| r.amount).sum(),
    );

    let mut by_account = SummaryTable::aggregate(
        "account_head_summary",
        rows,
        &[GroupKey::Text(TextField::AccountHead)],
        &[
            Metric::new("total_deposit", Reduction::Sum(NumericField::BankDeposit)),
            Metric::new(
                "total_withdrawal",
                Reduction::Sum(NumericField::BankWithdrawal),
            ),
            Metric::new(
                "transactions",
                Reduction::DistinctCount(TextField::VoucherNo),
            ),
            Metric::new("last_date", Reduction::Latest(DateField::PaymentDate)),
        ],
        params.today,
    );
    by_account.add_difference("total_deposit", "total_withdrawal", "balance");
    by_account.sort_by("balance", true);

    let by_sub_category = SummaryTable::aggregate(
        "sub_category_summary",
        rows,
        &[
            GroupKey::Text(TextField::Category),
            GroupKey::Text(TextField::SubCategory),
        ],
        &[
            Metric::new("total_deposit", Reduction::Sum(NumericField::BankDeposit)),
            Metric::new(
                "total_withdrawal",
                Reduction::Sum(NumericField::BankWithdrawal),
            ),
            Metric::new(
                "transactions",
                Reduction::DistinctCount(TextField::VoucherNo),
            ),
        ],
        params.today,
    );

    let by_party = SummaryTable::aggregate(
        "party_summary",
        rows,
        &[
            GroupKey::Text(TextField::PartyType),
            GroupKey::Text(TextField::PartyName),
        ],
        &[
            Metric::new("total_amount", Reduction::Sum(NumericField::Amount)),
            Metric::new(
                "transactions",
                Reduction::DistinctCount(TextField::VoucherNo),
            ),
            Metric::new(
                "last_transaction",
                Reduction::Latest(DateField::PaymentDate),
            ),
        ],
        params.today,
    );

    let series = monthly_series(rows, DateField::PaymentDate, "net_bank_flow", |r| {
        r.bank_deposit - r.bank_withdrawal
    });

    Ok(ReportResult {
        kind: ReportKind::Bankbook,
        metrics,
        tables: vec![by_account, by_sub_category, by_party],
        series: Some(series),
        row_count: rows.len(),
    })
}

fn assemble_liability(rows: &[&LedgerRow], _params: &ReportParams) -> Result<ReportResult> {
    let paid = vec!["paid".to_string()];
    let total: f64 = rows.iter().map(|r| r.amount).sum();
    let unsettled: f64 = rows
        .iter()
        .filter(|r| !settled(r, &paid))
        .map(|r| r.amount)
        .sum();

    let mut metrics = BTreeMap::new();
    metrics.insert("total_liabilities".to_string(), total);
    metrics.insert("unsettled_amount".to_string(), unsettled);
    metrics.insert("settled_amount".to_string(), total - unsettled);

    // Party breakdown with a conditional unsettled column; built directly
    // because the condition spans two source columns.
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, (f64, f64, usize)> = BTreeMap::new();
    for row in rows {
        let key = row.party_name.clone();
        if !totals.contains_key(&key) {
            order.push(key.clone());
        }
        let entry = totals.entry(key).or_insert((0.0, 0.0, 0));
        entry.0 += row.amount;
        if !settled(row, &paid) {
            entry.1 += row.amount;
        }
        entry.2 += 1;
    }
    let mut by_party = SummaryTable {
        name: "party_summary".to_string(),
        key_columns: vec!["party_name".to_string()],
        value_columns: vec![
            "total_amount".to_string(),
            "unsettled_amount".to_string(),
            "transactions".to_string(),
        ],
        rows: order
            .into_iter()
            .map(|party| {
                let (amount, open, count) = totals[&party];
                SummaryRow {
                    keys: vec![party],
                    values: vec![
                        Cell::Number(amount),
                        Cell::Number(open),
                        Cell::Number(count as f64),
                    ],
                }
            })
            .collect(),
    };
    by_party.sort_by("total_amount", true);

    Ok(ReportResult {
        kind: ReportKind::Liability,
        metrics,
        tables: vec![by_party],
        series: None,
        row_count: rows.len(),
    })
}

fn assemble_income(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let total: f64 = rows.iter().map(|r| r.amount).sum();

    let mut by_party = SummaryTable::aggregate(
        "party_summary",
        rows,
        &[GroupKey::Text(TextField::PartyName)],
        &[
            Metric::new("total_amount", Reduction::Sum(NumericField::Amount)),
            Metric::new("transactions", Reduction::Count),
        ],
        params.today,
    );
    by_party.sort_by("total_amount", true);

    let mut metrics = BTreeMap::new();
    metrics.insert("total_income".to_string(), total);
    if let Some(top) = by_party.first_value("total_amount").and_then(|c| c.as_number()) {
        metrics.insert("top_contribution".to_string(), top);
    }

    let mut by_sub_category = SummaryTable::aggregate(
        "sub_category_summary",
        rows,
        &[GroupKey::Text(TextField::SubCategory)],
        &[
            Metric::new("total_amount", Reduction::Sum(NumericField::Amount)),
            Metric::new("transaction_count", Reduction::Count),
        ],
        params.today,
    );
    by_sub_category.sort_by("total_amount", true);
    by_sub_category.add_percent_of_total("total_amount", "share_pct");

    let series = monthly_series(rows, DateField::PaymentDate, "monthly_income", |r| r.amount);

    Ok(ReportResult {
        kind: ReportKind::Income,
        metrics,
        tables: vec![by_party, by_sub_category],
        series: Some(series),
        row_count: rows.len(),
    })
}

fn assemble_expense(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let total: f64 = rows.iter().map(|r| r.credit).sum();

    let mut metrics = BTreeMap::new();
    metrics.insert("total_expense".to_string(), total);

    let mut by_sub_category = SummaryTable::aggregate(
        "sub_category_summary",
        rows,
        &[GroupKey::Text(TextField::SubCategory)],
        &[
            Metric::new("total_amount", Reduction::Sum(NumericField::Credit)),
            Metric::new("transaction_count", Reduction::Count),
        ],
        params.today,
    );
    by_sub_category.sort_by("total_amount", true);
    by_sub_category.add_percent_of_total("total_amount", "share_pct");

    let series = monthly_series(rows, DateField::PaymentDate, "monthly_expense", |r| r.credit);

    Ok(ReportResult {
        kind: ReportKind::Expense,
        metrics,
        tables: vec![by_sub_category],
        series: Some(series),
        row_count: rows.len(),
    })
}

fn aging_table(rows: &[&LedgerRow], params: &ReportParams) -> SummaryTable {
    let mut table = SummaryTable::aggregate(
        "aging_summary",
        rows,
        &[GroupKey::Aging],
        &[
            Metric::new("amount", Reduction::Sum(NumericField::Amount)),
            Metric::new("invoices", Reduction::Count),
        ],
        params.today,
    );
    table.add_percent_of_total("amount", "share_pct");
    table
}

fn overdue_amount(rows: &[&LedgerRow], today: NaiveDate) -> f64 {
    rows.iter()
        .filter(|r| r.due_date.map_or(false, |due| (today - due).num_days() > 0))
        .map(|r| r.amount)
        .sum()
}

fn assemble_payables(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let mut metrics = BTreeMap::new();
    metrics.insert(
        "total_payable".to_string(),
        rows.iter().map(|r| r.amount).sum(),
    );
    metrics.insert(
        "overdue_amount".to_string(),
        overdue_amount(rows, params.today),
    );
    metrics.insert(
        "vendor_count".to_string(),
        distinct(rows, TextField::PartyName) as f64,
    );

    let mut by_vendor = SummaryTable::aggregate(
        "vendor_summary",
        rows,
        &[GroupKey::Text(TextField::PartyName)],
        &[
            Metric::new("total_due", Reduction::Sum(NumericField::Amount)),
            Metric::new("invoice_count", Reduction::Count),
        ],
        params.today,
    );
    by_vendor.sort_by("total_due", true);

    Ok(ReportResult {
        kind: ReportKind::Payables,
        metrics,
        tables: vec![by_vendor, aging_table(rows, params)],
        series: None,
        row_count: rows.len(),
    })
}

fn assemble_receivables(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let mut metrics = BTreeMap::new();
    metrics.insert(
        "total_receivable".to_string(),
        rows.iter().map(|r| r.amount).sum(),
    );
    metrics.insert(
        "overdue_amount".to_string(),
        overdue_amount(rows, params.today),
    );
    metrics.insert("open_invoices".to_string(), rows.len() as f64);

    let mut by_customer = SummaryTable::aggregate(
        "customer_summary",
        rows,
        &[GroupKey::Text(TextField::PartyName)],
        &[
            Metric::new("total_due", Reduction::Sum(NumericField::Amount)),
            Metric::new("oldest_invoice", Reduction::Earliest(DateField::DueDate)),
            Metric::new("invoice_count", Reduction::Count),
            Metric::new(
                "avg_days_overdue",
                Reduction::Mean(NumericField::DaysOverdue),
            ),
        ],
        params.today,
    );
    by_customer.sort_by("total_due", true);

    Ok(ReportResult {
        kind: ReportKind::Receivables,
        metrics,
        tables: vec![aging_table(rows, params), by_customer],
        series: None,
        row_count: rows.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Asset,
    Liability,
    Equity,
}

/// Normalizes free-text account types; "capital" and "retained earnings"
/// count as equity.
fn balance_sheet_section(account_type: &str) -> Option<Section> {
    match account_type.trim().to_ascii_lowercase().as_str() {
        "asset" => Some(Section::Asset),
        "liability" => Some(Section::Liability),
        "equity" | "capital" | "retained earnings" => Some(Section::Equity),
        _ => None,
    }
}

fn section_table(
    name: &str,
    rows: &[&LedgerRow],
    section: Section,
    sections: &[Section],
    params: &ReportParams,
) -> SummaryTable {
    let members: Vec<&LedgerRow> = rows
        .iter()
        .zip(sections)
        .filter(|(_, s)| **s == section)
        .map(|(r, _)| *r)
        .collect();
    let mut table = SummaryTable::aggregate(
        name,
        &members,
        &[GroupKey::Text(TextField::AccountName)],
        &[Metric::new("total_amount", Reduction::Sum(NumericField::Amount))],
        params.today,
    );
    table.sort_by("total_amount", true);
    table.add_percent_of_total("total_amount", "share_pct");
    table
}

fn classification_table(
    name: &str,
    rows: &[&LedgerRow],
    current_label: &str,
    other_label: &str,
    current_keywords: &[&str],
) -> SummaryTable {
    let keywords: Vec<String> = current_keywords.iter().map(|k| k.to_string()).collect();
    let mut current = 0.0;
    let mut other = 0.0;
    for row in rows {
        if contains_any(&row.account_name, &keywords) {
            current += row.amount;
        } else {
            other += row.amount;
        }
    }
    SummaryTable {
        name: name.to_string(),
        key_columns: vec!["class".to_string()],
        value_columns: vec!["total_amount".to_string()],
        rows: vec![
            SummaryRow {
                keys: vec![current_label.to_string()],
                values: vec![Cell::Number(current)],
            },
            SummaryRow {
                keys: vec![other_label.to_string()],
                values: vec![Cell::Number(other)],
            },
        ],
    }
}

fn assemble_balance_sheet(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let classified: Vec<(&LedgerRow, Section)> = rows
        .iter()
        .filter_map(|r| balance_sheet_section(&r.account_type).map(|s| (*r, s)))
        .collect();
    if classified.is_empty() {
        debug!("balance sheet found no rows with a recognized account_type");
        return Ok(ReportResult::empty(ReportKind::BalanceSheet));
    }
    let typed_rows: Vec<&LedgerRow> = classified.iter().map(|(r, _)| *r).collect();
    let sections: Vec<Section> = classified.iter().map(|(_, s)| *s).collect();

    let sum_for = |section: Section| -> f64 {
        classified
            .iter()
            .filter(|(_, s)| *s == section)
            .map(|(r, _)| r.amount)
            .sum()
    };

    let total_assets = sum_for(Section::Asset);
    let total_liabilities = sum_for(Section::Liability);
    let has_equity_rows = sections.contains(&Section::Equity);
    // With no equity accounts, equity is derived from the accounting
    // equation rather than summed.
    let total_equity = if has_equity_rows {
        sum_for(Section::Equity)
    } else {
        total_assets - total_liabilities
    };

    let mut metrics = BTreeMap::new();
    metrics.insert("total_assets".to_string(), total_assets);
    metrics.insert("total_liabilities".to_string(), total_liabilities);
    metrics.insert("total_equity".to_string(), total_equity);
    metrics.insert(
        "current_ratio".to_string(),
        guarded_ratio(total_assets, total_liabilities),
    );
    metrics.insert(
        "debt_to_equity".to_string(),
        guarded_ratio(total_liabilities, total_equity),
    );
    metrics.insert(
        "working_capital".to_string(),
        total_assets - total_liabilities,
    );

    let overview = SummaryTable {
        name: "balance_sheet".to_string(),
        key_columns: vec!["section".to_string()],
        value_columns: vec!["amount".to_string()],
        rows: vec![
            SummaryRow {
                keys: vec!["Assets".to_string()],
                values: vec![Cell::Number(total_assets)],
            },
            SummaryRow {
                keys: vec!["Liabilities".to_string()],
                values: vec![Cell::Number(total_liabilities)],
            },
            SummaryRow {
                keys: vec!["Equity".to_string()],
                values: vec![Cell::Number(total_equity)],
            },
        ],
    };

    let assets_rows: Vec<&LedgerRow> = classified
        .iter()
        .filter(|(_, s)| *s == Section::Asset)
        .map(|(r, _)| *r)
        .collect();
    let liability_rows: Vec<&LedgerRow> = classified
        .iter()
        .filter(|(_, s)| *s == Section::Liability)
        .map(|(r, _)| *r)
        .collect();

    let mut tables = vec![
        overview,
        section_table("assets", &typed_rows, Section::Asset, &sections, params),
        section_table(
            "liabilities",
            &typed_rows,
            Section::Liability,
            &sections,
            params,
        ),
    ];
    if has_equity_rows {
        tables.push(section_table(
            "equity",
            &typed_rows,
            Section::Equity,
            &sections,
            params,
        ));
    }
    tables.push(classification_table(
        "asset_classification",
        &assets_rows,
        "Current Assets",
        "Fixed Assets",
        &["cash", "receivable", "inventory"],
    ));
    tables.push(classification_table(
        "liability_classification",
        &liability_rows,
        "Current Liabilities",
        "Long-Term Liabilities",
        &["payable", "short", "due"],
    ));

    Ok(ReportResult {
        kind: ReportKind::BalanceSheet,
        metrics,
        tables,
        series: None,
        row_count: typed_rows.len(),
    })
}

fn assemble_management(rows: &[&LedgerRow], params: &ReportParams) -> Result<ReportResult> {
    let category_is = |row: &LedgerRow, name: &str| row.category.trim().eq_ignore_ascii_case(name);
    let party_is = |row: &LedgerRow, name: &str| row.party_type.trim().eq_ignore_ascii_case(name);
    let paid = vec!["paid".to_string()];
    let received = vec!["received".to_string()];

    let total_sales: f64 = rows
        .iter()
        .filter(|r| category_is(r, "Income"))
        .map(|r| r.debit)
        .sum();
    let total_expenses: f64 = rows
        .iter()
        .filter(|r| category_is(r, "Expense"))
        .map(|r| r.credit)
        .sum();
    let total_loans: f64 = rows
        .iter()
        .filter(|r| category_is(r, "Loan"))
        .map(|r| r.debit)
        .sum();
    let total_payables: f64 = rows
        .iter()
        .filter(|r| party_is(r, "Vendor") && !settled(r, &paid))
        .map(|r| r.amount)
        .sum();
    let total_receivables: f64 = rows
        .iter()
        .filter(|r| party_is(r, "Customer") && !settled(r, &received))
        .map(|r| r.amount)
        .sum();
    let current_balance: f64 = rows
        .iter()
        .map(|r| (r.debit - r.credit) + (r.bank_deposit - r.bank_withdrawal))
        .sum();

    let assets = current_balance + total_receivables;
    let liabilities = total_payables + total_loans;
    let equity = assets - liabilities;

    let mut metrics = BTreeMap::new();
    metrics.insert("total_sales".to_string(), total_sales);
    metrics.insert("total_expenses".to_string(), total_expenses);
    metrics.insert("total_loans".to_string(), total_loans);
    metrics.insert("total_payables".to_string(), total_payables);
    metrics.insert("total_receivables".to_string(), total_receivables);
    metrics.insert("current_balance".to_string(), current_balance);
    metrics.insert(
        "current_ratio".to_string(),
        guarded_ratio(assets, liabilities),
    );
    metrics.insert("debt_to_equity".to_string(), guarded_ratio(liabilities, equity));

    let mut by_category = SummaryTable::aggregate(
        "category_summary",
        rows,
        &[GroupKey::Text(TextField::Category)],
        &[
            Metric::new("total_debit", Reduction::Sum(NumericField::Debit)),
            Metric::new("total_credit", Reduction::Sum(NumericField::Credit)),
            Metric::new("transaction_count", Reduction::Count),
        ],
        params.today,
    );
    by_category.add_difference("total_debit", "total_credit", "net_amount");
    by_category.sort_by("net_amount", true);

    let position = SummaryTable {
        name: "financial_position".to_string(),
        key_columns: vec!["item".to_string()],
        value_columns: vec!["amount".to_string()],
        rows: vec![
            SummaryRow {
                keys: vec!["Assets".to_string()],
                values: vec![Cell::Number(assets)],
            },
            SummaryRow {
                keys: vec!["Liabilities".to_string()],
                values: vec![Cell::Number(liabilities)],
            },
            SummaryRow {
                keys: vec!["Equity".to_string()],
                values: vec![Cell::Number(equity)],
            },
        ],
    };

    let series = monthly_series(rows, DateField::Date, "monthly_net", |r| {
        r.debit - r.credit
    });

    Ok(ReportResult {
        kind: ReportKind::Management,
        metrics,
        tables: vec![by_category, position],
        series: Some(series),
        row_count: rows.len(),
    })
}
