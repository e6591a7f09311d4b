use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::MergeError;

// ---------------------------------------------------------------------------
// Scalar values
// ---------------------------------------------------------------------------

/// A single cell value. Column sets are only known at runtime, so records
/// are maps of column name to `Value` rather than fixed structs.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used for matching, concatenation and CSV export.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Numeric reading for arithmetic operators. Text is trimmed and parsed;
    /// anything that is not a finite number yields `None`.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            Value::Null | Value::Bool(_) | Value::Date(_) => return None,
        };
        n.is_finite().then_some(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

// ---------------------------------------------------------------------------
// Records + datasets
// ---------------------------------------------------------------------------

/// One row: insertion-ordered column name → value.
pub type Record = IndexMap<String, Value>;

/// Read a column from a record. Absent keys read as `Null`.
pub fn field<'a>(record: &'a Record, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&NULL)
}

/// Union of the records' keys in first-seen order.
pub fn columns_of<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<String> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    for record in records {
        for key in record.keys() {
            seen.insert(key.as_str());
        }
    }
    seen.into_iter().map(str::to_string).collect()
}

/// Which uploaded dataset a value or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed tabular input: ordered records plus their column names.
///
/// Every record's key set is a subset of `columns`, and column names are
/// unique. Row order is kept exactly as supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Result<Self, MergeError> {
        let mut seen = IndexSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(MergeError::DuplicateColumn { side: None, column: column.clone() });
            }
        }
        for (row, record) in records.iter().enumerate() {
            if let Some(extra) = record.keys().find(|k| !seen.contains(k.as_str())) {
                return Err(MergeError::UnknownRecordColumn { row, column: extra.clone() });
            }
        }
        Ok(Self { columns, records })
    }

    /// Build from positional rows. Each row is zipped against `columns`;
    /// short rows leave the trailing columns absent.
    pub fn from_rows<S: AsRef<str>>(
        columns: &[S],
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, MergeError> {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let records = rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect::<Record>())
            .collect();
        Self::new(columns, records)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// The single key column taken from each dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column_a: String,
    pub column_b: String,
}

impl ColumnMapping {
    pub fn new(column_a: impl Into<String>, column_b: impl Into<String>) -> Self {
        Self { column_a: column_a.into(), column_b: column_b.into() }
    }
}

/// Per-column combination rule for a duplicate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    TakeNew,
    TakeOld,
    Sum,
    Subtract,
    Multiply,
    Divide,
    Avg,
    Min,
    Max,
    Concatenate,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::TakeNew,
        Operator::TakeOld,
        Operator::Sum,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::Avg,
        Operator::Min,
        Operator::Max,
        Operator::Concatenate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::TakeNew => "TAKE_NEW",
            Operator::TakeOld => "TAKE_OLD",
            Operator::Sum => "SUM",
            Operator::Subtract => "SUBTRACT",
            Operator::Multiply => "MULTIPLY",
            Operator::Divide => "DIVIDE",
            Operator::Avg => "AVG",
            Operator::Min => "MIN",
            Operator::Max => "MAX",
            Operator::Concatenate => "CONCATENATE",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Operator::TakeNew | Operator::TakeOld | Operator::Concatenate)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MergeError::UnknownOperator(s.to_string()))
    }
}

/// Wire name of the whole-record merge rule.
pub const MERGE_ALL: &str = "MERGE_ALL";

/// A configured merge rule: either one column's operator, or the
/// whole-record `MERGE_ALL` rule (whose column is ignored).
///
/// On the wire both shapes are `{ column, operation }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMergeOperation", into = "RawMergeOperation")]
pub enum MergeOperation {
    Column { column: String, operator: Operator },
    MergeAll,
}

impl MergeOperation {
    pub fn column(column: impl Into<String>, operator: Operator) -> Self {
        MergeOperation::Column { column: column.into(), operator }
    }

    /// Parse the wire pair `(column, operation)`.
    pub fn parse(column: &str, operation: &str) -> Result<Self, MergeError> {
        if operation.trim().eq_ignore_ascii_case(MERGE_ALL) {
            return Ok(MergeOperation::MergeAll);
        }
        Ok(MergeOperation::Column { column: column.to_string(), operator: operation.parse()? })
    }
}

#[derive(Serialize, Deserialize)]
struct RawMergeOperation {
    #[serde(default)]
    column: String,
    operation: String,
}

impl TryFrom<RawMergeOperation> for MergeOperation {
    type Error = MergeError;

    fn try_from(raw: RawMergeOperation) -> Result<Self, Self::Error> {
        MergeOperation::parse(&raw.column, &raw.operation)
    }
}

impl From<MergeOperation> for RawMergeOperation {
    fn from(op: MergeOperation) -> Self {
        match op {
            MergeOperation::Column { column, operator } => {
                RawMergeOperation { column, operation: operator.as_str().to_string() }
            }
            MergeOperation::MergeAll => {
                RawMergeOperation { column: "all".into(), operation: MERGE_ALL.into() }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Match output
// ---------------------------------------------------------------------------

/// One record from each dataset whose key values match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicatePair<'a> {
    pub record_a: &'a Record,
    pub record_b: &'a Record,
}

#[derive(Debug, Default)]
pub struct MatchOutput<'a> {
    pub pairs: Vec<DuplicatePair<'a>>,
    pub unique_a: Vec<&'a Record>,
    pub unique_b: Vec<&'a Record>,
}

// ---------------------------------------------------------------------------
// Processed result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultStats {
    pub total_a: usize,
    pub total_b: usize,
    pub duplicate_count: usize,
    pub unique_a_count: usize,
    pub unique_b_count: usize,
    pub merged_count: usize,
}

/// The four derived datasets plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedResult {
    /// Dataset A's side of each duplicate pair, one row per pair.
    pub duplicates: Vec<Record>,
    pub unique_a: Vec<Record>,
    pub unique_b: Vec<Record>,
    pub merged: Vec<Record>,
    pub stats: ResultStats,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedResult {
    pub fn rows(&self, set: ResultSet) -> &[Record] {
        match set {
            ResultSet::Duplicates => &self.duplicates,
            ResultSet::UniqueA => &self.unique_a,
            ResultSet::UniqueB => &self.unique_b,
            ResultSet::Merged => &self.merged,
        }
    }

    /// One result set with its column list, ready for export.
    pub fn table(&self, set: ResultSet) -> ResultTable {
        let rows = self.rows(set).to_vec();
        ResultTable { set, columns: columns_of(&rows), rows }
    }
}

/// Names one of the four output datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSet {
    Duplicates,
    UniqueA,
    UniqueB,
    Merged,
}

impl ResultSet {
    pub const ALL: [ResultSet; 4] =
        [ResultSet::Duplicates, ResultSet::UniqueA, ResultSet::UniqueB, ResultSet::Merged];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSet::Duplicates => "duplicates",
            ResultSet::UniqueA => "unique_a",
            ResultSet::UniqueB => "unique_b",
            ResultSet::Merged => "merged",
        }
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultSet::ALL
            .into_iter()
            .find(|set| set.as_str() == s)
            .ok_or_else(|| format!("unknown result set '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub set: ResultSet,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}
