use serde::Deserialize;

use crate::model::{field, DuplicatePair, MergeOperation, Operator, Record, Value};

pub const DEFAULT_SECONDARY_PREFIX: &str = "file2_";
pub const DEFAULT_CONCAT_SEPARATOR: &str = " | ";

/// Knobs for building merged records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeOptions {
    /// Prefix for B columns whose value conflicts with A's in merge-all mode.
    pub secondary_prefix: String,
    /// Joiner for `CONCATENATE`.
    pub concat_separator: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            secondary_prefix: DEFAULT_SECONDARY_PREFIX.to_string(),
            concat_separator: DEFAULT_CONCAT_SEPARATOR.to_string(),
        }
    }
}

/// Round to two decimal places.
fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Combine one column's two values.
///
/// Nulls are resolved first, for every operator: a null side yields the
/// other side. Numeric operators fall back to `a` when either side does not
/// parse as a number.
pub fn apply_operator(a: &Value, b: &Value, op: Operator, options: &MergeOptions) -> Value {
    if a.is_null() {
        return b.clone();
    }
    if b.is_null() {
        return a.clone();
    }

    match op {
        Operator::TakeNew => b.clone(),
        Operator::TakeOld => a.clone(),
        Operator::Concatenate => {
            Value::Text(format!("{}{}{}", a.to_text(), options.concat_separator, b.to_text()))
        }
        Operator::Sum => arithmetic(a, b, op, |x, y| x + y),
        Operator::Subtract => arithmetic(a, b, op, |x, y| x - y),
        Operator::Multiply => arithmetic(a, b, op, |x, y| x * y),
        Operator::Divide => arithmetic(a, b, op, |x, y| if y == 0.0 { x } else { x / y }),
        Operator::Avg => arithmetic(a, b, op, |x, y| (x + y) / 2.0),
        Operator::Min => arithmetic(a, b, op, f64::min),
        Operator::Max => arithmetic(a, b, op, f64::max),
    }
}

fn arithmetic(a: &Value, b: &Value, op: Operator, f: impl FnOnce(f64, f64) -> f64) -> Value {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Value::Number(round2(f(x, y))),
        _ => {
            log::warn!("{op}: non-numeric operand ('{a}', '{b}'), keeping first value");
            a.clone()
        }
    }
}

/// How a duplicate pair becomes one merged record. Chosen once per run from
/// the configured operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStrategy<'o> {
    /// Start from A, overwrite each named column with the operator result.
    /// A's column set is preserved.
    Columns(Vec<(&'o str, Operator)>),
    /// Start from A, then fold in every B column without overwriting: equal
    /// values are kept, conflicting values land under a prefixed column,
    /// B-only columns are added.
    MergeAll,
}

impl<'o> MergeStrategy<'o> {
    /// Any `MERGE_ALL` entry switches the whole run to merge-all.
    pub fn from_operations(operations: &'o [MergeOperation]) -> Self {
        let mut columns = Vec::with_capacity(operations.len());
        for op in operations {
            match op {
                MergeOperation::MergeAll => return MergeStrategy::MergeAll,
                MergeOperation::Column { column, operator } => {
                    columns.push((column.as_str(), *operator));
                }
            }
        }
        MergeStrategy::Columns(columns)
    }

    pub fn merge_pair(&self, pair: &DuplicatePair<'_>, options: &MergeOptions) -> Record {
        let mut merged = pair.record_a.clone();
        match self {
            MergeStrategy::Columns(columns) => {
                for (column, operator) in columns {
                    let value = apply_operator(
                        field(pair.record_a, column),
                        field(pair.record_b, column),
                        *operator,
                        options,
                    );
                    merged.insert((*column).to_string(), value);
                }
            }
            MergeStrategy::MergeAll => {
                for (column, value_b) in pair.record_b {
                    match pair.record_a.get(column) {
                        Some(value_a) if value_a == value_b => {}
                        Some(_) => {
                            let base = format!("{}{}", options.secondary_prefix, column);
                            let key = secondary_key(base, &merged, pair.record_b);
                            merged.insert(key, value_b.clone());
                        }
                        None => {
                            merged.insert(column.clone(), value_b.clone());
                        }
                    }
                }
            }
        }
        merged
    }
}

/// `base`, or `base_2`, `base_3`, ... if the name is already used by the
/// merged record or by B itself. B-only columns are added under their own
/// name later, so B's names are reserved too.
fn secondary_key(base: String, merged: &Record, record_b: &Record) -> String {
    let taken = |key: &str| merged.contains_key(key) || record_b.contains_key(key);
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let key = format!("{base}_{n}");
        if !taken(&key) {
            return key;
        }
        n += 1;
    }
}

/// One merged record per pair, in pair order.
pub fn merge_pairs(
    pairs: &[DuplicatePair<'_>],
    operations: &[MergeOperation],
    options: &MergeOptions,
) -> Vec<Record> {
    let strategy = MergeStrategy::from_operations(operations);
    log::debug!(
        "merging {} pair(s) with {}",
        pairs.len(),
        match strategy {
            MergeStrategy::Columns(ref c) => format!("{} column operation(s)", c.len()),
            MergeStrategy::MergeAll => "merge-all".to_string(),
        }
    );
    pairs.iter().map(|pair| strategy.merge_pair(pair, options)).collect()
}
