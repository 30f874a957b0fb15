use std::io::Write;

use chrono::NaiveDate;

use crate::aggregate::SummaryTable;
use crate::error::Result;
use crate::ledger::LedgerRow;
use crate::report::{ReportKind, ReportResult};
use crate::schema::Column;

/// Download filename for an exported report view:
/// `<report>_<start>_to_<end>.<ext>`.
pub fn export_filename(kind: ReportKind, start: NaiveDate, end: NaiveDate, ext: &str) -> String {
    format!(
        "{}_{}_to_{}.{}",
        kind.name(),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        ext
    )
}

/// Serializes a summary table as CSV: key columns first, then value columns.
pub fn table_to_csv(table: &SummaryTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = table
        .key_columns
        .iter()
        .chain(table.value_columns.iter())
        .map(String::as_str)
        .collect();
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record: Vec<String> = row.keys.clone();
        record.extend(row.values.iter().map(|c| c.to_string()));
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render_cell(row: &LedgerRow, column: Column) -> String {
    fn date(value: Option<NaiveDate>) -> String {
        value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
    }
    fn number(value: f64) -> String {
        format!("{}", value)
    }

    match column {
        Column::VoucherNo => row.voucher_no.clone(),
        Column::Date => date(row.date),
        Column::InvoiceDate => date(row.invoice_date),
        Column::DueDate => date(row.due_date),
        Column::PaymentDate => date(row.payment_date),
        Column::Debit => number(row.debit),
        Column::Credit => number(row.credit),
        Column::Amount => number(row.amount),
        Column::BankDeposit => number(row.bank_deposit),
        Column::BankWithdrawal => number(row.bank_withdrawal),
        Column::Category => row.category.clone(),
        Column::SubCategory => row.sub_category.clone(),
        Column::AccountHead => row.account_head.clone(),
        Column::AccountName => row.account_name.clone(),
        Column::AccountType => row.account_type.clone(),
        Column::PartyName => row.party_name.clone(),
        Column::PartyType => row.party_type.clone(),
        Column::PaymentMethod => row.payment_method.clone(),
        Column::Status => row.status.clone(),
        Column::Particulars => row.particulars.clone(),
        Column::Reference => row.reference.clone(),
    }
}

/// Writes a filtered subset as CSV with the given columns. The output is
/// readable by `Ledger::from_reader`, so an exported subset reloads with the
/// same row count and per-column sums.
pub fn write_rows_csv<W: Write>(rows: &[&LedgerRow], columns: &[Column], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let header: Vec<&str> = columns.iter().map(|c| c.header()).collect();
    csv_writer.write_record(&header)?;

    for row in rows {
        let record: Vec<String> = columns.iter().map(|c| render_cell(row, *c)).collect();
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// The subset as an in-memory CSV string with every known column.
pub fn rows_to_csv(rows: &[&LedgerRow]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows_csv(rows, &Column::ALL, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// JSON rendering of a full report result for a UI adapter.
pub fn report_to_json(result: &ReportResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;

    #[test]
    fn test_export_filename_pattern() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            export_filename(ReportKind::Receivables, start, end, "csv"),
            "receivables_2024-01-01_to_2024-03-31.csv"
        );
    }

    #[test]
    fn test_round_trip_preserves_rows_and_sums() {
        let rows = vec![
            LedgerRow {
                voucher_no: "V-1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 5),
                debit: 100.25,
                category: "Sales, net".to_string(),
                ..Default::default()
            },
            LedgerRow {
                voucher_no: "V-2".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 20),
                credit: 40.75,
                category: "Rent".to_string(),
                ..Default::default()
            },
        ];
        let refs: Vec<&LedgerRow> = rows.iter().collect();

        let csv = rows_to_csv(&refs).unwrap();
        let reloaded = Ledger::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(reloaded.len(), rows.len());
        let debit_sum: f64 = reloaded.rows().iter().map(|r| r.debit).sum();
        let credit_sum: f64 = reloaded.rows().iter().map(|r| r.credit).sum();
        assert!((debit_sum - 100.25).abs() < 1e-9);
        assert!((credit_sum - 40.75).abs() < 1e-9);
        assert_eq!(reloaded.rows()[0].category, "Sales, net");
        assert_eq!(reloaded.rows()[0].date, rows[0].date);
    }

    #[test]
    fn test_table_to_csv_layout() {
        use crate::aggregate::{Cell, SummaryRow};

        let table = SummaryTable {
            name: "by_category".to_string(),
            key_columns: vec!["category".to_string()],
            value_columns: vec!["total".to_string(), "last_date".to_string()],
            rows: vec![SummaryRow {
                keys: vec!["Sales".to_string()],
                values: vec![
                    Cell::Number(140.5),
                    Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()),
                ],
            }],
        };

        let csv = table_to_csv(&table).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("category,total,last_date"));
        assert_eq!(lines.next(), Some("Sales,140.5,2024-01-20"));
    }
}
