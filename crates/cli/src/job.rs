//! `dupmerge run | validate | columns`: job-file driven matching and merging.

use std::path::{Path, PathBuf};

use dupmerge_merge::csv::{decode_csv_bytes, load_csv_dataset, read_csv_columns, sniff_delimiter};
use dupmerge_merge::pipeline::check_configuration;
use dupmerge_merge::{Dataset, JobConfig, ResultSet, Side};
use dupmerge_session::{MergeWorkflow, SessionId, SessionStore};

use crate::export::{
    csv_file_name, summary_json, write_table, OutputFile, RunSummary, SUMMARY_FILE,
};
use crate::settings::load_settings;
use crate::CliError;

// ============================================================================
// Loading
// ============================================================================

fn read_text(path: &Path, what: &str) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {what} {}: {e}", path.display())))
}

/// CSV input. Non-UTF-8 files are read as Windows-1252.
fn read_csv_file(path: &Path, what: &str) -> Result<String, CliError> {
    std::fs::read(path)
        .map(decode_csv_bytes)
        .map_err(|e| CliError::io(format!("cannot read {what} {}: {e}", path.display())))
}

fn in_file(mut err: CliError, path: &Path) -> CliError {
    err.message = format!("{}: {}", path.display(), err.message);
    err
}

pub fn read_job(path: &Path) -> Result<JobConfig, CliError> {
    let text = read_text(path, "job")?;
    JobConfig::from_toml(&text).map_err(|e| in_file(CliError::merge(e), path))
}

/// Input paths in a job are relative to the job file's directory.
fn base_dir(job_path: &Path) -> &Path {
    job_path.parent().unwrap_or_else(|| Path::new("."))
}

fn side_path(job: &JobConfig, job_path: &Path, side: Side) -> PathBuf {
    let file = match side {
        Side::A => &job.file_a,
        Side::B => &job.file_b,
    };
    base_dir(job_path).join(file)
}

fn delimiter_for(job: &JobConfig, data: &str) -> u8 {
    match job.delimiter {
        Some(d) => d as u8,
        None => sniff_delimiter(data),
    }
}

fn load_side(job: &JobConfig, job_path: &Path, side: Side) -> Result<Dataset, CliError> {
    let path = side_path(job, job_path, side);
    let data = read_csv_file(&path, "dataset")?;
    let dataset = load_csv_dataset(&data, delimiter_for(job, &data))
        .map_err(|e| in_file(CliError::merge(e), &path))?;
    tracing::debug!(
        side = side.as_str(),
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn side_columns(job: &JobConfig, job_path: &Path, side: Side) -> Result<Vec<String>, CliError> {
    let path = side_path(job, job_path, side);
    let data = read_csv_file(&path, "dataset")?;
    read_csv_columns(&data, delimiter_for(job, &data)).map_err(|e| in_file(CliError::merge(e), &path))
}

/// Lowercase ASCII words joined by `-`, for the default output directory.
fn slug(name: &str) -> String {
    let lowered: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let words: Vec<&str> = lowered.split('-').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        "job".to_string()
    } else {
        words.join("-")
    }
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    job_path: PathBuf,
    out_dir: Option<PathBuf>,
    json_output: bool,
    settings_path: Option<&Path>,
) -> Result<(), CliError> {
    let settings = load_settings(settings_path)?;
    let job = read_job(&job_path)?;

    let dataset_a = load_side(&job, &job_path, Side::A)?;
    let dataset_b = load_side(&job, &job_path, Side::B)?;

    let out_dir = out_dir
        .unwrap_or_else(|| base_dir(&job_path).join(format!("{}-results", slug(&job.name))));
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(CliError::usage(format!("{} is not a directory", out_dir.display()))
            .with_hint("pass a directory to --out-dir"));
    }
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| CliError::io(format!("cannot create {}: {e}", out_dir.display())))?;

    let store = SessionStore::system(settings.session.ttl())
        .map_err(|e| CliError::general(format!("cannot start session timer: {e}")))?;
    store.start_sweeper(settings.session.sweep_interval());
    let workflow = MergeWorkflow::new(store.clone(), settings.process_options());

    let id = workflow.start();
    let outcome = run_session(&workflow, &id, &job, dataset_a, dataset_b, &out_dir);
    workflow.finish(&id);
    store.stop_sweeper();
    let summary = outcome?;

    let json = summary_json(&summary)?;
    let summary_path = out_dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, &json)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", summary_path.display())))?;

    if json_output {
        println!("{json}");
    }

    // Human summary to stderr
    let s = &summary.stats;
    eprintln!(
        "{}: {} duplicates merged, {} only in A, {} only in B ({} + {} rows)",
        job.name, s.duplicate_count, s.unique_a_count, s.unique_b_count, s.total_a, s.total_b,
    );
    eprintln!("wrote {}", out_dir.display());
    Ok(())
}

/// Drive one session through upload → configure → process → export.
fn run_session(
    workflow: &MergeWorkflow,
    id: &SessionId,
    job: &JobConfig,
    dataset_a: Dataset,
    dataset_b: Dataset,
    out_dir: &Path,
) -> Result<RunSummary, CliError> {
    let columns_a = dataset_a.columns().to_vec();
    let columns_b = dataset_b.columns().to_vec();

    workflow.upload(id, Side::A, dataset_a)?;
    workflow.upload(id, Side::B, dataset_b)?;
    workflow.configure(id, job.mapping.clone(), job.operations.clone())?;
    let result = workflow.process(id)?;

    let mut outputs = Vec::with_capacity(ResultSet::ALL.len());
    for set in ResultSet::ALL {
        let table = workflow.export(id, set)?;
        let fallback = match set {
            ResultSet::UniqueB => &columns_b,
            ResultSet::Duplicates | ResultSet::UniqueA | ResultSet::Merged => &columns_a,
        };
        let path = out_dir.join(csv_file_name(set));
        write_table(&path, &table, fallback)?;
        outputs.push(OutputFile { set, path, rows: table.rows.len() });
    }

    Ok(RunSummary {
        job: job.name.clone(),
        processed_at: result.processed_at,
        stats: result.stats.clone(),
        outputs,
    })
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(job_path: PathBuf) -> Result<(), CliError> {
    let job = read_job(&job_path)?;
    let columns_a = side_columns(&job, &job_path, Side::A)?;
    let columns_b = side_columns(&job, &job_path, Side::B)?;
    check_configuration(&columns_a, &columns_b, &job.mapping, &job.operations)?;

    println!(
        "ok: {} (key {} = {}, {} operation(s))",
        job.name,
        job.mapping.column_a,
        job.mapping.column_b,
        job.operations.len()
    );
    Ok(())
}

// ============================================================================
// columns
// ============================================================================

fn describe_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        other => format!("'{}'", other as char),
    }
}

pub fn cmd_columns(file: PathBuf, json_output: bool) -> Result<(), CliError> {
    let data = read_csv_file(&file, "file")?;
    let delimiter = sniff_delimiter(&data);
    let columns =
        read_csv_columns(&data, delimiter).map_err(|e| in_file(CliError::merge(e), &file))?;

    if json_output {
        let value = serde_json::json!({
            "file": file.display().to_string(),
            "delimiter": (delimiter as char).to_string(),
            "columns": columns,
        });
        println!("{value}");
        return Ok(());
    }

    println!("delimiter: {}", describe_delimiter(delimiter));
    for (i, column) in columns.iter().enumerate() {
        println!("{:>3}  {}", i + 1, column);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_names() {
        assert_eq!(slug("Customers Q3"), "customers-q3");
        assert_eq!(slug("  CRM / Billing  "), "crm-billing");
        assert_eq!(slug("***"), "job");
    }

    #[test]
    fn paths_resolve_against_job_dir() {
        let job = JobConfig::from_toml(
            r#"
name = "t"
file_a = "a.csv"
file_b = "/abs/b.csv"
operations = [{ operation = "MERGE_ALL" }]

[mapping]
column_a = "id"
column_b = "id"
"#,
        )
        .unwrap();
        let job_path = Path::new("/jobs/t.toml");
        assert_eq!(side_path(&job, job_path, Side::A), PathBuf::from("/jobs/a.csv"));
        assert_eq!(side_path(&job, job_path, Side::B), PathBuf::from("/abs/b.csv"));
        assert_eq!(side_path(&job, Path::new("t.toml"), Side::A), PathBuf::from("a.csv"));
    }

    #[test]
    fn delimiter_override() {
        let mut job = JobConfig::from_toml(
            "name = \"t\"\nfile_a = \"a\"\nfile_b = \"b\"\noperations = [{ operation = \"MERGE_ALL\" }]\n[mapping]\ncolumn_a = \"id\"\ncolumn_b = \"id\"\n",
        )
        .unwrap();
        assert_eq!(delimiter_for(&job, "a;b\n1;2\n"), b';');
        job.delimiter = Some('|');
        assert_eq!(delimiter_for(&job, "a;b\n1;2\n"), b'|');
    }
}
