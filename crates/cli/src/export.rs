//! Result files: one CSV per result set plus `summary.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use dupmerge_merge::model::{field, ResultStats};
use dupmerge_merge::{ResultSet, ResultTable};

use crate::CliError;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Serialize)]
pub struct OutputFile {
    pub set: ResultSet,
    pub path: PathBuf,
    pub rows: usize,
}

/// Written to `summary.json` and printed by `run --json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub processed_at: DateTime<Utc>,
    pub stats: ResultStats,
    pub outputs: Vec<OutputFile>,
}

pub fn csv_file_name(set: ResultSet) -> String {
    format!("{}.csv", set.as_str())
}

/// Write `table` as CSV. Cells print as their text form; nulls are empty.
/// An empty table still gets a header row from `fallback_columns`.
pub fn write_table(
    path: &Path,
    table: &ResultTable,
    fallback_columns: &[String],
) -> Result<(), CliError> {
    let io_err = |e: csv::Error| CliError::io(format!("cannot write {}: {e}", path.display()));
    let columns = if table.columns.is_empty() { fallback_columns } else { table.columns.as_slice() };

    let mut writer = csv::Writer::from_path(path).map_err(io_err)?;
    writer.write_record(columns).map_err(io_err)?;
    for row in &table.rows {
        writer
            .write_record(columns.iter().map(|column| field(row, column).to_text()))
            .map_err(io_err)?;
    }
    writer
        .flush()
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

pub fn summary_json(summary: &RunSummary) -> Result<String, CliError> {
    serde_json::to_string_pretty(summary)
        .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dupmerge_merge::Value;

    #[test]
    fn table_written_with_nulls_as_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        let mut row = dupmerge_merge::Record::new();
        row.insert("id".into(), Value::from("7"));
        row.insert("total".into(), Value::Number(12.5));
        row.insert("note".into(), Value::Null);
        let table = ResultTable {
            set: ResultSet::Merged,
            columns: vec!["id".into(), "total".into(), "note".into()],
            rows: vec![row],
        };
        write_table(&path, &table, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,total,note\n7,12.5,\n");
    }

    #[test]
    fn empty_table_uses_fallback_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unique_b.csv");
        let table = ResultTable { set: ResultSet::UniqueB, columns: vec![], rows: vec![] };
        write_table(&path, &table, &["Email".to_string(), "tier".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Email,tier\n");
    }
}
