// dupmerge CLI - find records present in both of two CSV files and merge them

mod exit_codes;
mod export;
mod job;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dupmerge_merge::model::MERGE_ALL;
use dupmerge_merge::{MergeError, Operator};
use dupmerge_session::SessionError;
use exit_codes::{category_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "dupmerge")]
#[command(about = "Match duplicate records across two CSV files and merge them")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log matching and session progress to stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Settings file [default: <config dir>/dupmerge/settings.toml if present]
    #[arg(long, global = true, env = "DUPMERGE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job: match, merge, and write the four result sets plus a summary
    #[command(after_help = "\
Examples:
  dupmerge run customers.toml
  dupmerge run customers.toml --out-dir results/
  dupmerge run customers.toml --json | jq .stats

Writes duplicates.csv, unique_a.csv, unique_b.csv, merged.csv and
summary.json into the output directory.")]
    Run {
        /// Job file (TOML)
        job: PathBuf,

        /// Output directory [default: <job dir>/<job name>-results]
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Check a job file and the columns it names, without processing
    #[command(after_help = "\
Examples:
  dupmerge validate customers.toml")]
    Validate {
        /// Job file (TOML)
        job: PathBuf,
    },

    /// Print the detected delimiter and the column names of a CSV file
    #[command(after_help = "\
Examples:
  dupmerge columns crm.csv
  dupmerge columns billing.csv --json")]
    Columns {
        /// CSV file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  dupmerge-merge ", env!("CARGO_PKG_VERSION"),
    )
}

/// Human-readable logs on stderr so `--json` stdout stays clean.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { job, out_dir, json } => {
            job::cmd_run(job, out_dir, json, cli.settings.as_deref())
        }
        Commands::Validate { job } => job::cmd_validate(job),
        Commands::Columns { file, json } => job::cmd_columns(file, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Engine error with its category's exit code and a hint where one helps.
    pub fn merge(err: MergeError) -> Self {
        let hint = match &err {
            MergeError::UnknownColumn { .. } => {
                Some("run `dupmerge columns <file>` to list the available columns".to_string())
            }
            MergeError::TooManyRows { .. } => {
                Some("raise [limits] max_rows in the settings file".to_string())
            }
            MergeError::UnknownOperator(_) => Some(format!(
                "valid operations: {}, {}",
                Operator::ALL.map(|op| op.as_str()).join(", "),
                MERGE_ALL
            )),
            MergeError::Processing(_) => {
                Some("this is a bug; please report it with both input files".to_string())
            }
            _ => None,
        };
        Self { code: category_exit_code(err.category()), message: err.to_string(), hint }
    }

    pub fn session(err: SessionError) -> Self {
        match err {
            SessionError::Merge(e) => Self::merge(e),
            other => Self {
                code: category_exit_code(other.category()),
                message: other.to_string(),
                hint: None,
            },
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<MergeError> for CliError {
    fn from(err: MergeError) -> Self {
        Self::merge(err)
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        Self::session(err)
    }
}
