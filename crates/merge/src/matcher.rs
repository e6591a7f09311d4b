use std::collections::{HashMap, VecDeque};

use crate::error::MergeError;
use crate::model::{field, ColumnMapping, Dataset, DuplicatePair, MatchOutput, Side, Value};

/// Matching form of a key value: `None` for null, otherwise the trimmed,
/// case-folded string form.
pub fn normalize_key(value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(value.to_text().trim().to_lowercase())
}

/// Null matches only null; everything else compares trimmed and case-folded.
pub fn is_value_match(a: &Value, b: &Value) -> bool {
    normalize_key(a) == normalize_key(b)
}

/// Partition both datasets into duplicate pairs, unique-to-A and unique-to-B.
///
/// Greedy, first-match, one-to-one: each A record (in order) consumes the
/// earliest remaining B record with an equal key. B is indexed by key into
/// per-key queues, which gives the same pairing as scanning the remaining B
/// records front to back.
pub fn match_records<'a>(
    dataset_a: &'a Dataset,
    dataset_b: &'a Dataset,
    mapping: &ColumnMapping,
) -> Result<MatchOutput<'a>, MergeError> {
    if !dataset_a.has_column(&mapping.column_a) {
        return Err(MergeError::UnknownColumn { side: Side::A, column: mapping.column_a.clone() });
    }
    if !dataset_b.has_column(&mapping.column_b) {
        return Err(MergeError::UnknownColumn { side: Side::B, column: mapping.column_b.clone() });
    }

    let records_b = dataset_b.records();
    let mut index: HashMap<Option<String>, VecDeque<usize>> = HashMap::new();
    for (i, record) in records_b.iter().enumerate() {
        index
            .entry(normalize_key(field(record, &mapping.column_b)))
            .or_default()
            .push_back(i);
    }

    let mut consumed = vec![false; records_b.len()];
    let mut output = MatchOutput::default();

    for record_a in dataset_a.records() {
        let key = normalize_key(field(record_a, &mapping.column_a));
        match index.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(bi) => {
                consumed[bi] = true;
                output.pairs.push(DuplicatePair { record_a, record_b: &records_b[bi] });
            }
            None => output.unique_a.push(record_a),
        }
    }

    output.unique_b = records_b
        .iter()
        .zip(&consumed)
        .filter(|(_, used)| !**used)
        .map(|(record, _)| record)
        .collect();

    log::debug!(
        "matched {} pair(s): {} unique to A, {} unique to B",
        output.pairs.len(),
        output.unique_a.len(),
        output.unique_b.len()
    );

    Ok(output)
}
