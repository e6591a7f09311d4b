use chrono::{DateTime, Utc};

use crate::error::MergeError;
use crate::matcher::match_records;
use crate::merge::{merge_pairs, MergeOptions};
use crate::model::{ColumnMapping, Dataset, MergeOperation, ProcessedResult, ResultStats, Side};
use crate::validate::validate_result;

pub const DEFAULT_MAX_ROWS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub merge: MergeOptions,
    /// Row cap per dataset. Guards the pairwise matching cost.
    pub max_rows: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self { merge: MergeOptions::default(), max_rows: DEFAULT_MAX_ROWS }
    }
}

/// A dataset is usable when it has rows and stays under the cap.
pub fn check_dataset(side: Side, dataset: &Dataset, max_rows: usize) -> Result<(), MergeError> {
    if dataset.is_empty() {
        return Err(MergeError::EmptyDataset(side));
    }
    if dataset.len() > max_rows {
        return Err(MergeError::TooManyRows { side, rows: dataset.len(), limit: max_rows });
    }
    Ok(())
}

/// Mapping columns must exist on their side, operations must be non-empty,
/// and every column operation must name one of A's columns.
pub fn check_configuration(
    columns_a: &[String],
    columns_b: &[String],
    mapping: &ColumnMapping,
    operations: &[MergeOperation],
) -> Result<(), MergeError> {
    let has = |columns: &[String], name: &str| columns.iter().any(|c| c == name);

    if !has(columns_a, &mapping.column_a) {
        return Err(MergeError::UnknownColumn { side: Side::A, column: mapping.column_a.clone() });
    }
    if !has(columns_b, &mapping.column_b) {
        return Err(MergeError::UnknownColumn { side: Side::B, column: mapping.column_b.clone() });
    }
    if operations.is_empty() {
        return Err(MergeError::NoOperations);
    }
    for op in operations {
        if let MergeOperation::Column { column, .. } = op {
            if !has(columns_a, column) {
                return Err(MergeError::UnknownColumn { side: Side::A, column: column.clone() });
            }
        }
    }
    Ok(())
}

/// Match, merge and validate. The returned result has passed validation.
pub fn process(
    dataset_a: &Dataset,
    dataset_b: &Dataset,
    mapping: &ColumnMapping,
    operations: &[MergeOperation],
    options: &ProcessOptions,
    processed_at: DateTime<Utc>,
) -> Result<ProcessedResult, MergeError> {
    check_dataset(Side::A, dataset_a, options.max_rows)?;
    check_dataset(Side::B, dataset_b, options.max_rows)?;
    check_configuration(dataset_a.columns(), dataset_b.columns(), mapping, operations)?;

    let matched = match_records(dataset_a, dataset_b, mapping)?;
    let merged = merge_pairs(&matched.pairs, operations, &options.merge);

    let duplicates: Vec<_> = matched.pairs.iter().map(|p| p.record_a.clone()).collect();
    let unique_a: Vec<_> = matched.unique_a.into_iter().cloned().collect();
    let unique_b: Vec<_> = matched.unique_b.into_iter().cloned().collect();

    let result = ProcessedResult {
        stats: ResultStats {
            total_a: dataset_a.len(),
            total_b: dataset_b.len(),
            duplicate_count: duplicates.len(),
            unique_a_count: unique_a.len(),
            unique_b_count: unique_b.len(),
            merged_count: merged.len(),
        },
        duplicates,
        unique_a,
        unique_b,
        merged,
        processed_at,
    };

    let report = validate_result(&result);
    if !report.valid {
        log::error!("result validation failed: {:?}", report.errors);
        return Err(MergeError::Processing(report.errors));
    }

    log::info!(
        "processed {} x {} rows: {} duplicate(s), {} unique to A, {} unique to B",
        result.stats.total_a,
        result.stats.total_b,
        result.stats.duplicate_count,
        result.stats.unique_a_count,
        result.stats.unique_b_count
    );
    Ok(result)
}
