use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerRow;

/// Every column the loader recognizes in a ledger source. Unknown headers are
/// ignored at load time; reports declare which of these they require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    VoucherNo,
    Date,
    InvoiceDate,
    DueDate,
    PaymentDate,
    Debit,
    Credit,
    Amount,
    BankDeposit,
    BankWithdrawal,
    Category,
    SubCategory,
    AccountHead,
    AccountName,
    AccountType,
    PartyName,
    PartyType,
    PaymentMethod,
    Status,
    Particulars,
    Reference,
}

impl Column {
    pub const ALL: [Column; 21] = [
        Column::VoucherNo,
        Column::Date,
        Column::InvoiceDate,
        Column::DueDate,
        Column::PaymentDate,
        Column::Debit,
        Column::Credit,
        Column::Amount,
        Column::BankDeposit,
        Column::BankWithdrawal,
        Column::Category,
        Column::SubCategory,
        Column::AccountHead,
        Column::AccountName,
        Column::AccountType,
        Column::PartyName,
        Column::PartyType,
        Column::PaymentMethod,
        Column::Status,
        Column::Particulars,
        Column::Reference,
    ];

    /// The header name as it appears in the source file.
    pub fn header(self) -> &'static str {
        match self {
            Column::VoucherNo => "voucher_no",
            Column::Date => "date",
            Column::InvoiceDate => "invoice_date",
            Column::DueDate => "due_date",
            Column::PaymentDate => "payment_date",
            Column::Debit => "debit",
            Column::Credit => "credit",
            Column::Amount => "amount",
            Column::BankDeposit => "bank_deposit",
            Column::BankWithdrawal => "bank_withdrawal",
            Column::Category => "category",
            Column::SubCategory => "sub_category",
            Column::AccountHead => "account_head",
            Column::AccountName => "account_name",
            Column::AccountType => "account_type",
            Column::PartyName => "party_name",
            Column::PartyType => "party_type",
            Column::PaymentMethod => "payment_method",
            Column::Status => "status",
            Column::Particulars => "particulars",
            Column::Reference => "reference",
        }
    }

    /// Case-insensitive header lookup.
    pub fn from_header(name: &str) -> Option<Self> {
        let trimmed = name.trim().to_ascii_lowercase();
        Column::ALL.iter().copied().find(|c| c.header() == trimmed)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// The four date columns a rule or grouping can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    Date,
    InvoiceDate,
    DueDate,
    PaymentDate,
}

impl DateField {
    pub fn column(self) -> Column {
        match self {
            DateField::Date => Column::Date,
            DateField::InvoiceDate => Column::InvoiceDate,
            DateField::DueDate => Column::DueDate,
            DateField::PaymentDate => Column::PaymentDate,
        }
    }

    pub fn value(self, row: &LedgerRow) -> Option<NaiveDate> {
        match self {
            DateField::Date => row.date,
            DateField::InvoiceDate => row.invoice_date,
            DateField::DueDate => row.due_date,
            DateField::PaymentDate => row.payment_date,
        }
    }
}

/// Numeric row values. `DaysOverdue` is derived per-row from `due_date` and
/// an explicit "today"; it is `None` when the row has no due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    Debit,
    Credit,
    Amount,
    BankDeposit,
    BankWithdrawal,
    DaysOverdue,
}

impl NumericField {
    pub fn column(self) -> Option<Column> {
        match self {
            NumericField::Debit => Some(Column::Debit),
            NumericField::Credit => Some(Column::Credit),
            NumericField::Amount => Some(Column::Amount),
            NumericField::BankDeposit => Some(Column::BankDeposit),
            NumericField::BankWithdrawal => Some(Column::BankWithdrawal),
            NumericField::DaysOverdue => None,
        }
    }

    pub fn value(self, row: &LedgerRow, today: NaiveDate) -> Option<f64> {
        match self {
            NumericField::Debit => Some(row.debit),
            NumericField::Credit => Some(row.credit),
            NumericField::Amount => Some(row.amount),
            NumericField::BankDeposit => Some(row.bank_deposit),
            NumericField::BankWithdrawal => Some(row.bank_withdrawal),
            NumericField::DaysOverdue => {
                row.due_date.map(|due| (today - due).num_days() as f64)
            }
        }
    }
}

/// Free-text row values used for keyword matching, membership filters and
/// grouping labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    VoucherNo,
    Category,
    SubCategory,
    AccountHead,
    AccountName,
    AccountType,
    PartyName,
    PartyType,
    PaymentMethod,
    Status,
    Particulars,
    Reference,
}

impl TextField {
    pub fn column(self) -> Column {
        match self {
            TextField::VoucherNo => Column::VoucherNo,
            TextField::Category => Column::Category,
            TextField::SubCategory => Column::SubCategory,
            TextField::AccountHead => Column::AccountHead,
            TextField::AccountName => Column::AccountName,
            TextField::AccountType => Column::AccountType,
            TextField::PartyName => Column::PartyName,
            TextField::PartyType => Column::PartyType,
            TextField::PaymentMethod => Column::PaymentMethod,
            TextField::Status => Column::Status,
            TextField::Particulars => Column::Particulars,
            TextField::Reference => Column::Reference,
        }
    }

    pub fn value(self, row: &LedgerRow) -> &str {
        match self {
            TextField::VoucherNo => &row.voucher_no,
            TextField::Category => &row.category,
            TextField::SubCategory => &row.sub_category,
            TextField::AccountHead => &row.account_head,
            TextField::AccountName => &row.account_name,
            TextField::AccountType => &row.account_type,
            TextField::PartyName => &row.party_name,
            TextField::PartyType => &row.party_type,
            TextField::PaymentMethod => &row.payment_method,
            TextField::Status => &row.status,
            TextField::Particulars => &row.particulars,
            TextField::Reference => &row.reference,
        }
    }
}
