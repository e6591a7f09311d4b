use serde::Serialize;

use crate::model::ProcessedResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Cross-check a result's recorded stats against its row sets.
///
/// Every check runs; failures accumulate. Nothing is corrected here. The four
/// row sets are `Vec`s, so the shape check is carried by the type.
pub fn validate_result(result: &ProcessedResult) -> ValidationReport {
    let stats = &result.stats;
    let mut errors = Vec::new();

    let mut check_len = |name: &str, recorded: usize, actual: usize| {
        if recorded != actual {
            errors.push(format!("{name} count {recorded} != {actual} rows"));
        }
    };
    check_len("duplicate", stats.duplicate_count, result.duplicates.len());
    check_len("unique A", stats.unique_a_count, result.unique_a.len());
    check_len("unique B", stats.unique_b_count, result.unique_b.len());
    check_len("merged", stats.merged_count, result.merged.len());

    if stats.duplicate_count + stats.unique_a_count != stats.total_a {
        errors.push(format!(
            "duplicates ({}) + unique A ({}) != total A ({})",
            stats.duplicate_count, stats.unique_a_count, stats.total_a
        ));
    }
    if stats.duplicate_count + stats.unique_b_count != stats.total_b {
        errors.push(format!(
            "duplicates ({}) + unique B ({}) != total B ({})",
            stats.duplicate_count, stats.unique_b_count, stats.total_b
        ));
    }
    if stats.merged_count != stats.duplicate_count {
        errors.push(format!(
            "merged count {} != duplicate count {}",
            stats.merged_count, stats.duplicate_count
        ));
    }

    ValidationReport { valid: errors.is_empty(), errors }
}
