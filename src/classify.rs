use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::ledger::{Ledger, LedgerRow};
use crate::schema::{DateField, NumericField, TextField};

/// Case-insensitive "any keyword is a substring" test. This is the single
/// matching primitive behind every text bucket and settled-status check.
pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    let haystack = text.to_ascii_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && haystack.contains(&k.to_ascii_lowercase()))
}

/// A single pure predicate over a ledger row. Rules compose by conjunction
/// in a [`RuleSet`]; each is stateless, so application order never changes
/// the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Keep rows whose date column falls within [start, end] inclusive.
    /// Rows with a null date are excluded.
    DateRange {
        field: DateField,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Keep rows where any listed column contains any keyword.
    AnyKeyword {
        fields: Vec<TextField>,
        keywords: Vec<String>,
    },
    /// Keep rows where none of the listed columns contains any keyword.
    NoKeyword {
        fields: Vec<TextField>,
        keywords: Vec<String>,
    },
    /// Keep rows whose column value is a member of the allowed set
    /// (trimmed, case-insensitive comparison).
    MemberOf {
        field: TextField,
        allowed: Vec<String>,
    },
    /// Keep rows whose numeric value falls within [lo, hi] inclusive; an
    /// absent bound is unbounded. Rows where the value is undefined (e.g.
    /// days overdue without a due date) are excluded.
    NumericRange {
        field: NumericField,
        lo: Option<f64>,
        hi: Option<f64>,
    },
}

impl Rule {
    pub fn validate(&self) -> Result<()> {
        if let Rule::DateRange { start, end, .. } = self {
            if start > end {
                return Err(ReportError::InvalidDateRange {
                    start: *start,
                    end: *end,
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, row: &LedgerRow, today: NaiveDate) -> bool {
        match self {
            Rule::DateRange { field, start, end } => match field.value(row) {
                Some(date) => date >= *start && date <= *end,
                None => false,
            },
            Rule::AnyKeyword { fields, keywords } => fields
                .iter()
                .any(|f| contains_any(f.value(row), keywords)),
            Rule::NoKeyword { fields, keywords } => !fields
                .iter()
                .any(|f| contains_any(f.value(row), keywords)),
            Rule::MemberOf { field, allowed } => {
                let value = field.value(row).trim();
                allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(value))
            }
            Rule::NumericRange { field, lo, hi } => match field.value(row, today) {
                Some(value) => {
                    lo.map_or(true, |l| value >= l) && hi.map_or(true, |h| value <= h)
                }
                None => false,
            },
        }
    }
}

/// A conjunction of rules. An empty set matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    pub fn matches(&self, row: &LedgerRow, today: NaiveDate) -> bool {
        self.rules.iter().all(|r| r.matches(row, today))
    }

    /// Returns the matching subset. An empty result is the explicit
    /// "no data" marker, not an error; only an invalid rule errors.
    pub fn apply<'a>(&self, ledger: &'a Ledger, today: NaiveDate) -> Result<Vec<&'a LedgerRow>> {
        self.validate()?;
        Ok(ledger
            .rows()
            .iter()
            .filter(|row| self.matches(row, today))
            .collect())
    }
}

/// Semantic buckets a row can belong to. Membership is keyword-driven and
/// deliberately non-exclusive: one row can sit in several buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Cash,
    Bank,
    Income,
    Expense,
    Liability,
}

impl Bucket {
    pub fn label(self) -> &'static str {
        match self {
            Bucket::Cash => "cash",
            Bucket::Bank => "bank",
            Bucket::Income => "income",
            Bucket::Expense => "expense",
            Bucket::Liability => "liability",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the bucket table: the bucket matches when any listed column
/// contains any keyword. A bucket may own several table rows; they OR
/// together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRule {
    pub bucket: Bucket,
    pub fields: Vec<TextField>,
    pub keywords: Vec<String>,
}

impl BucketRule {
    fn matches(&self, row: &LedgerRow) -> bool {
        self.fields
            .iter()
            .any(|f| contains_any(f.value(row), &self.keywords))
    }
}

/// The declarative, versioned classification table. Rule order is part of
/// the version: [`BucketTable::assign`] resolves multi-bucket rows by
/// first-matching-rule-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTable {
    pub version: u32,
    pub rules: Vec<BucketRule>,
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl BucketTable {
    /// The standard table. Cash precedes bank so ambiguous payment-method
    /// text resolves to cash under `assign`.
    pub fn standard() -> Self {
        Self {
            version: 1,
            rules: vec![
                BucketRule {
                    bucket: Bucket::Cash,
                    fields: vec![TextField::PaymentMethod],
                    keywords: keywords(&["cash"]),
                },
                BucketRule {
                    bucket: Bucket::Bank,
                    fields: vec![TextField::PaymentMethod],
                    keywords: keywords(&["bank"]),
                },
                BucketRule {
                    bucket: Bucket::Income,
                    fields: vec![TextField::AccountHead],
                    keywords: keywords(&["income", "revenue", "sales"]),
                },
                BucketRule {
                    bucket: Bucket::Income,
                    fields: vec![TextField::Category],
                    keywords: keywords(&["income", "revenue"]),
                },
                BucketRule {
                    bucket: Bucket::Income,
                    fields: vec![TextField::SubCategory],
                    keywords: keywords(&["income", "sales"]),
                },
                BucketRule {
                    bucket: Bucket::Expense,
                    fields: vec![TextField::AccountHead],
                    keywords: keywords(&["expense", "purchase", "cost"]),
                },
                BucketRule {
                    bucket: Bucket::Expense,
                    fields: vec![TextField::Category],
                    keywords: keywords(&["expense", "purchase"]),
                },
                BucketRule {
                    bucket: Bucket::Expense,
                    fields: vec![TextField::SubCategory],
                    keywords: keywords(&["expense", "purchase"]),
                },
                BucketRule {
                    bucket: Bucket::Liability,
                    fields: vec![TextField::AccountHead],
                    keywords: keywords(&["liability", "loan"]),
                },
                BucketRule {
                    bucket: Bucket::Liability,
                    fields: vec![TextField::SubCategory],
                    keywords: keywords(&["loan", "liability"]),
                },
                BucketRule {
                    bucket: Bucket::Liability,
                    fields: vec![TextField::PartyType],
                    keywords: keywords(&["managing director"]),
                },
            ],
        }
    }

    pub fn matches_bucket(&self, row: &LedgerRow, bucket: Bucket) -> bool {
        self.rules
            .iter()
            .filter(|r| r.bucket == bucket)
            .any(|r| r.matches(row))
    }

    /// Every bucket the row belongs to, in table order, deduplicated.
    pub fn buckets_for(&self, row: &LedgerRow) -> Vec<Bucket> {
        let mut buckets = Vec::new();
        for rule in &self.rules {
            if !buckets.contains(&rule.bucket) && rule.matches(row) {
                buckets.push(rule.bucket);
            }
        }
        buckets
    }

    /// Deterministic single-bucket assignment: first matching rule wins.
    pub fn assign(&self, row: &LedgerRow) -> Option<Bucket> {
        self.rules.iter().find(|r| r.matches(row)).map(|r| r.bucket)
    }

    /// The subset of the ledger belonging to one bucket.
    pub fn select<'a>(&self, ledger: &'a Ledger, bucket: Bucket) -> Vec<&'a LedgerRow> {
        ledger
            .rows()
            .iter()
            .filter(|row| self.matches_bucket(row, bucket))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
