use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::schema::{Column, DateField};

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One transaction record. Dates that failed to parse are `None`; numeric
/// cells that were missing or unparseable are `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub voucher_no: String,
    pub date: Option<NaiveDate>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub debit: f64,
    pub credit: f64,
    pub amount: f64,
    pub bank_deposit: f64,
    pub bank_withdrawal: f64,
    pub category: String,
    pub sub_category: String,
    pub account_head: String,
    pub account_name: String,
    pub account_type: String,
    pub party_name: String,
    pub party_type: String,
    pub payment_method: String,
    pub status: String,
    pub particulars: String,
    pub reference: String,
}

/// An immutable ledger snapshot: the rows in source order plus the set of
/// columns that were actually present in the source header. Reports never
/// mutate a snapshot; they derive filtered views from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
    columns: BTreeSet<Column>,
}

impl Ledger {
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportError::SourceNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let ledger = Self::from_reader(file)?;
        info!(
            "Loaded ledger from {}: {} rows, {} columns",
            path.display(),
            ledger.len(),
            ledger.columns.len()
        );
        Ok(ledger)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut columns = BTreeSet::new();
        let mut indices: Vec<Option<Column>> = Vec::with_capacity(headers.len());
        for header in headers.iter() {
            let column = Column::from_header(header);
            if let Some(c) = column {
                columns.insert(c);
            } else {
                debug!("Ignoring unknown ledger column '{}'", header);
            }
            indices.push(column);
        }

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut row = LedgerRow::default();
            for (idx, cell) in record.iter().enumerate() {
                let Some(Some(column)) = indices.get(idx) else {
                    continue;
                };
                assign_cell(&mut row, *column, cell);
            }
            rows.push(row);
        }

        Ok(Self { rows, columns })
    }

    /// Builds a snapshot directly from rows, treating every known column as
    /// present. Used by adapters that already hold typed records.
    pub fn from_rows(rows: Vec<LedgerRow>) -> Self {
        Self {
            rows,
            columns: Column::ALL.into_iter().collect(),
        }
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The subset of `required` columns absent from the source header.
    pub fn missing_columns(&self, required: &[Column]) -> Vec<Column> {
        required
            .iter()
            .copied()
            .filter(|c| !self.columns.contains(c))
            .collect()
    }

    /// Earliest and latest non-null value of a date column.
    pub fn date_span(&self, field: DateField) -> Option<(NaiveDate, NaiveDate)> {
        let mut span: Option<(NaiveDate, NaiveDate)> = None;
        for row in &self.rows {
            if let Some(date) = field.value(row) {
                span = Some(match span {
                    Some((min, max)) => (min.min(date), max.max(date)),
                    None => (date, date),
                });
            }
        }
        span
    }
}

fn assign_cell(row: &mut LedgerRow, column: Column, cell: &str) {
    match column {
        Column::VoucherNo => row.voucher_no = cell.trim().to_string(),
        Column::Date => row.date = parse_date_lenient(cell),
        Column::InvoiceDate => row.invoice_date = parse_date_lenient(cell),
        Column::DueDate => row.due_date = parse_date_lenient(cell),
        Column::PaymentDate => row.payment_date = parse_date_lenient(cell),
        Column::Debit => row.debit = parse_number_lenient(cell),
        Column::Credit => row.credit = parse_number_lenient(cell),
        Column::Amount => row.amount = parse_number_lenient(cell),
        Column::BankDeposit => row.bank_deposit = parse_number_lenient(cell),
        Column::BankWithdrawal => row.bank_withdrawal = parse_number_lenient(cell),
        Column::Category => row.category = cell.trim().to_string(),
        Column::SubCategory => row.sub_category = cell.trim().to_string(),
        Column::AccountHead => row.account_head = cell.trim().to_string(),
        Column::AccountName => row.account_name = cell.trim().to_string(),
        Column::AccountType => row.account_type = cell.trim().to_string(),
        Column::PartyName => row.party_name = cell.trim().to_string(),
        Column::PartyType => row.party_type = cell.trim().to_string(),
        Column::PaymentMethod => row.payment_method = cell.trim().to_string(),
        Column::Status => row.status = cell.trim().to_string(),
        Column::Particulars => row.particulars = cell.trim().to_string(),
        Column::Reference => row.reference = cell.trim().to_string(),
    }
}

/// Lenient date coercion: tries the known formats, returns `None` on failure.
/// Never errors; rows with unparseable dates stay in the ledger with a null
/// date and are excluded from date-keyed operations.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Lenient numeric coercion: missing, unparseable and non-finite values all
/// become 0.0 so no null/NaN/Inf ever reaches an aggregate.
pub fn parse_number_lenient(raw: &str) -> f64 {
    let trimmed = raw.trim().trim_start_matches('$').replace(',', "");
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Explicit cache handle for loaded ledgers. A snapshot is read once per
/// source path and shared as `Arc<Ledger>` until `refresh` or `invalidate`
/// drops it; there is no hidden process-wide state.
#[derive(Debug, Default)]
pub struct LedgerStore {
    cache: HashMap<PathBuf, Arc<Ledger>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path) -> Result<Arc<Ledger>> {
        if let Some(ledger) = self.cache.get(path) {
            debug!("Ledger cache hit for {}", path.display());
            return Ok(Arc::clone(ledger));
        }
        let ledger = Arc::new(Ledger::from_path(path)?);
        self.cache.insert(path.to_path_buf(), Arc::clone(&ledger));
        Ok(ledger)
    }

    pub fn refresh(&mut self, path: &Path) -> Result<Arc<Ledger>> {
        self.cache.remove(path);
        self.load(path)
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.cache.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
voucher_no,date,payment_date,due_date,debit,credit,amount,category,party_name,status,unknown_col
V-1,2024-01-05,2024-01-05,2024-02-01,100,0,100,Income,Acme,Received,x
V-2,2024-01-20,not-a-date,,0,40,abc,Expense,Beta,Pending,y
";

    #[test]
    fn test_lenient_coercion() {
        let ledger = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ledger.len(), 2);

        let second = &ledger.rows()[1];
        assert_eq!(second.payment_date, None);
        assert_eq!(second.due_date, None);
        assert_eq!(second.amount, 0.0);
        assert_eq!(second.credit, 40.0);
    }

    #[test]
    fn test_no_nan_in_numeric_columns() {
        let ledger = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        for row in ledger.rows() {
            for value in [
                row.debit,
                row.credit,
                row.amount,
                row.bank_deposit,
                row.bank_withdrawal,
            ] {
                assert!(value.is_finite());
            }
        }
    }

    #[test]
    fn test_present_columns_tracked() {
        let ledger = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(ledger.columns().contains(&Column::VoucherNo));
        assert!(!ledger.columns().contains(&Column::BankDeposit));

        let missing = ledger.missing_columns(&[Column::Debit, Column::BankDeposit]);
        assert_eq!(missing, vec![Column::BankDeposit]);
    }

    #[test]
    fn test_date_span() {
        let ledger = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        let (min, max) = ledger.date_span(DateField::Date).unwrap();
        assert_eq!(min, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(max, NaiveDate::from_ymd_opt(2024, 1, 20).unwrap());
    }

    #[test]
    fn test_parse_number_lenient() {
        assert_eq!(parse_number_lenient("1,234.50"), 1234.5);
        assert_eq!(parse_number_lenient("$99"), 99.0);
        assert_eq!(parse_number_lenient(""), 0.0);
        assert_eq!(parse_number_lenient("garbage"), 0.0);
        assert_eq!(parse_number_lenient("NaN"), 0.0);
        assert_eq!(parse_number_lenient("inf"), 0.0);
    }

    #[test]
    fn test_parse_date_lenient_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(parse_date_lenient("2024-03-07"), Some(expected));
        assert_eq!(parse_date_lenient("2024/03/07"), Some(expected));
        assert_eq!(parse_date_lenient("07/03/2024"), Some(expected));
        assert_eq!(parse_date_lenient("2024-03-07 10:30:00"), Some(expected));
        assert_eq!(parse_date_lenient("yesterday"), None);
    }

    #[test]
    fn test_missing_source_errors() {
        let result = Ledger::from_path(Path::new("/nonexistent/accounts.csv"));
        assert!(matches!(result, Err(ReportError::SourceNotFound(_))));
    }

    #[test]
    fn test_store_returns_same_snapshot() {
        let dir = std::env::temp_dir().join("ledger_reports_store_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("accounts.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut store = LedgerStore::new();
        let first = store.load(&path).unwrap();
        let second = store.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let refreshed = store.refresh(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));

        std::fs::remove_file(&path).ok();
    }
}
