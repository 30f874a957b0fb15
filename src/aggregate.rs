use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerRow;
use crate::schema::{DateField, NumericField, TextField};
use crate::utils::{inclusive_days, month_key};

/// Fixed-width time-since-due-date category for payables/receivables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    NotDue,
    Days0To30,
    Days31To60,
    Days61To90,
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::NotDue,
        AgingBucket::Days0To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Over90,
    ];

    /// Pure function of days overdue. Boundaries: `<= 0` not due, then
    /// (0,30], (30,60], (60,90], and everything above 90.
    pub fn classify(days_overdue: i64) -> Self {
        if days_overdue <= 0 {
            AgingBucket::NotDue
        } else if days_overdue <= 30 {
            AgingBucket::Days0To30
        } else if days_overdue <= 60 {
            AgingBucket::Days31To60
        } else if days_overdue <= 90 {
            AgingBucket::Days61To90
        } else {
            AgingBucket::Over90
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgingBucket::NotDue => "Not Due",
            AgingBucket::Days0To30 => "0-30 Days",
            AgingBucket::Days31To60 => "31-60 Days",
            AgingBucket::Days61To90 => "61-90 Days",
            AgingBucket::Over90 => "90+ Days",
        }
    }
}

impl fmt::Display for AgingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Percent change from `previous` to `current`, defined as 0.0 when the
/// previous value is 0 so no NaN/Inf ever reaches a displayed delta.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    let pct = (current - previous) / previous * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

/// Division with the zero-denominator sentinel of 0.0.
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// The window immediately preceding [start, end], of equal length:
/// [start - (end - start + 1) days, start - 1 day].
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let length = inclusive_days(start, end);
    (
        start - Duration::days(length),
        start - Duration::days(1),
    )
}

/// Grouping key for one aggregation pass. Rows whose key is undefined
/// (null date, null due date) are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Text(TextField),
    Month(DateField),
    Aging,
}

impl GroupKey {
    pub fn name(self) -> String {
        match self {
            GroupKey::Text(field) => field.column().header().to_string(),
            GroupKey::Month(_) => "month".to_string(),
            GroupKey::Aging => "aging_bucket".to_string(),
        }
    }

    fn label(self, row: &LedgerRow, today: NaiveDate) -> Option<String> {
        match self {
            GroupKey::Text(field) => Some(field.value(row).to_string()),
            GroupKey::Month(field) => field.value(row).map(month_key),
            GroupKey::Aging => row
                .due_date
                .map(|due| AgingBucket::classify((today - due).num_days()).label().to_string()),
        }
    }
}

/// One output column of an aggregation: a named reduction over a row field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum(NumericField),
    Mean(NumericField),
    Min(NumericField),
    Max(NumericField),
    Count,
    DistinctCount(TextField),
    Earliest(DateField),
    Latest(DateField),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub reduction: Reduction,
}

impl Metric {
    pub fn new(name: &str, reduction: Reduction) -> Self {
        Self {
            name: name.to_string(),
            reduction,
        }
    }
}

/// A single aggregated value. Date reductions produce `Date` cells so they
/// can sit next to numeric columns in one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Empty, Cell::Empty) => Ordering::Equal,
            (Cell::Empty, _) => Ordering::Less,
            (_, Cell::Empty) => Ordering::Greater,
            (Cell::Number(_), Cell::Date(_)) => Ordering::Less,
            (Cell::Date(_), Cell::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub keys: Vec<String>,
    pub values: Vec<Cell>,
}

/// The result of one group-by pass: named key columns, named value columns,
/// and one row per group in first-appearance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub name: String,
    pub key_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

enum Acc {
    Numbers { sum: f64, count: usize, min: f64, max: f64 },
    Count(usize),
    Distinct(BTreeSet<String>),
    Dates { earliest: Option<NaiveDate>, latest: Option<NaiveDate> },
}

impl Acc {
    fn for_reduction(reduction: &Reduction) -> Self {
        match reduction {
            Reduction::Sum(_) | Reduction::Mean(_) | Reduction::Min(_) | Reduction::Max(_) => {
                Acc::Numbers {
                    sum: 0.0,
                    count: 0,
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                }
            }
            Reduction::Count => Acc::Count(0),
            Reduction::DistinctCount(_) => Acc::Distinct(BTreeSet::new()),
            Reduction::Earliest(_) | Reduction::Latest(_) => Acc::Dates {
                earliest: None,
                latest: None,
            },
        }
    }

    fn update(&mut self, reduction: &Reduction, row: &LedgerRow, today: NaiveDate) {
        match (self, reduction) {
            (
                Acc::Numbers { sum, count, min, max },
                Reduction::Sum(field)
                | Reduction::Mean(field)
                | Reduction::Min(field)
                | Reduction::Max(field),
            ) => {
                if let Some(value) = field.value(row, today) {
                    *sum += value;
                    *count += 1;
                    *min = min.min(value);
                    *max = max.max(value);
                }
            }
            (Acc::Count(n), Reduction::Count) => *n += 1,
            (Acc::Distinct(seen), Reduction::DistinctCount(field)) => {
                seen.insert(field.value(row).to_string());
            }
            (Acc::Dates { earliest, latest }, Reduction::Earliest(field) | Reduction::Latest(field)) => {
                if let Some(date) = field.value(row) {
                    *earliest = Some(earliest.map_or(date, |e| e.min(date)));
                    *latest = Some(latest.map_or(date, |l| l.max(date)));
                }
            }
            _ => unreachable!("accumulator built from its own reduction"),
        }
    }

    fn finalize(&self, reduction: &Reduction) -> Cell {
        match (self, reduction) {
            (Acc::Numbers { sum, .. }, Reduction::Sum(_)) => Cell::Number(*sum),
            (Acc::Numbers { sum, count, .. }, Reduction::Mean(_)) => {
                Cell::Number(guarded_ratio(*sum, *count as f64))
            }
            (Acc::Numbers { count, min, .. }, Reduction::Min(_)) => {
                if *count == 0 {
                    Cell::Empty
                } else {
                    Cell::Number(*min)
                }
            }
            (Acc::Numbers { count, max, .. }, Reduction::Max(_)) => {
                if *count == 0 {
                    Cell::Empty
                } else {
                    Cell::Number(*max)
                }
            }
            (Acc::Count(n), Reduction::Count) => Cell::Number(*n as f64),
            (Acc::Distinct(seen), Reduction::DistinctCount(_)) => Cell::Number(seen.len() as f64),
            (Acc::Dates { earliest, .. }, Reduction::Earliest(_)) => {
                earliest.map_or(Cell::Empty, Cell::Date)
            }
            (Acc::Dates { latest, .. }, Reduction::Latest(_)) => {
                latest.map_or(Cell::Empty, Cell::Date)
            }
            _ => Cell::Empty,
        }
    }
}

impl SummaryTable {
    /// Groups `rows` by `keys` and reduces each `metric` per group. Group
    /// order is the insertion order of first appearance; rows with an
    /// undefined key label are skipped.
    pub fn aggregate(
        name: &str,
        rows: &[&LedgerRow],
        keys: &[GroupKey],
        metrics: &[Metric],
        today: NaiveDate,
    ) -> Self {
        let mut order: Vec<Vec<String>> = Vec::new();
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut accs: Vec<Vec<Acc>> = Vec::new();

        for row in rows {
            let labels: Option<Vec<String>> =
                keys.iter().map(|k| k.label(row, today)).collect();
            let Some(labels) = labels else {
                continue;
            };

            let slot = match index.get(&labels) {
                Some(&i) => i,
                None => {
                    let i = order.len();
                    order.push(labels.clone());
                    index.insert(labels, i);
                    accs.push(
                        metrics
                            .iter()
                            .map(|m| Acc::for_reduction(&m.reduction))
                            .collect(),
                    );
                    i
                }
            };

            for (acc, metric) in accs[slot].iter_mut().zip(metrics) {
                acc.update(&metric.reduction, row, today);
            }
        }

        let summary_rows = order
            .into_iter()
            .zip(accs)
            .map(|(labels, group_accs)| SummaryRow {
                keys: labels,
                values: group_accs
                    .iter()
                    .zip(metrics)
                    .map(|(acc, metric)| acc.finalize(&metric.reduction))
                    .collect(),
            })
            .collect();

        Self {
            name: name.to_string(),
            key_columns: keys.iter().map(|k| k.name()).collect(),
            value_columns: metrics.iter().map(|m| m.name.clone()).collect(),
            rows: summary_rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn value_index(&self, column: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == column)
    }

    fn key_index(&self, column: &str) -> Option<usize> {
        self.key_columns.iter().position(|c| c == column)
    }

    /// Stable sort by a key or value column; ties keep first-appearance
    /// order. Unknown columns leave the table untouched.
    pub fn sort_by(&mut self, column: &str, descending: bool) -> &mut Self {
        if let Some(idx) = self.value_index(column) {
            self.rows.sort_by(|a, b| {
                let ord = a.values[idx].compare(&b.values[idx]);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        } else if let Some(idx) = self.key_index(column) {
            self.rows.sort_by(|a, b| {
                let ord = a.keys[idx].cmp(&b.keys[idx]);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        self
    }

    /// Sum of a numeric value column across all groups.
    pub fn column_total(&self, column: &str) -> f64 {
        match self.value_index(column) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.values[idx].as_number())
                .sum(),
            None => 0.0,
        }
    }

    /// Appends `name` = group value / total × 100. When the total is zero,
    /// every group's share is 0, never NaN.
    pub fn add_percent_of_total(&mut self, source: &str, name: &str) -> &mut Self {
        let Some(idx) = self.value_index(source) else {
            return self;
        };
        let total = self.column_total(source);
        for row in &mut self.rows {
            let value = row.values[idx].as_number().unwrap_or(0.0);
            row.values
                .push(Cell::Number(guarded_ratio(value, total) * 100.0));
        }
        self.value_columns.push(name.to_string());
        self
    }

    /// Appends `name` = `minuend` − `subtrahend` per group (net-flow style
    /// derived column).
    pub fn add_difference(&mut self, minuend: &str, subtrahend: &str, name: &str) -> &mut Self {
        let (Some(a), Some(b)) = (self.value_index(minuend), self.value_index(subtrahend)) else {
            return self;
        };
        for row in &mut self.rows {
            let left = row.values[a].as_number().unwrap_or(0.0);
            let right = row.values[b].as_number().unwrap_or(0.0);
            row.values.push(Cell::Number(left - right));
        }
        self.value_columns.push(name.to_string());
        self
    }

    /// First group's value in a column, if any.
    pub fn first_value(&self, column: &str) -> Option<&Cell> {
        let idx = self.value_index(column)?;
        self.rows.first().map(|r| &r.values[idx])
    }
}
