use std::fmt;

use crate::model::Side;

/// Broad error class, so callers can tell bad input apart from engine bugs
/// and from expired sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing user input. Never retried.
    Input,
    /// Internal bookkeeping failure (result validation). Indicates a bug.
    Processing,
    /// Session not found or expired.
    Session,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Processing => "processing",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeError {
    /// Dataset has no records.
    EmptyDataset(Side),
    /// Dataset exceeds the configured row cap.
    TooManyRows { side: Side, rows: usize, limit: usize },
    /// A column name appears twice in a dataset header.
    DuplicateColumn { side: Option<Side>, column: String },
    /// A record carries a key that is not one of the dataset's columns.
    UnknownRecordColumn { row: usize, column: String },
    /// Mapping or operation names a column the dataset does not have.
    UnknownColumn { side: Side, column: String },
    /// Operation list is empty.
    NoOperations,
    /// Operation name is not one of the known operators.
    UnknownOperator(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Settings or job validation error.
    ConfigValidation(String),
    /// CSV read error.
    Csv(String),
    /// Result validation failed; every failed check is listed.
    Processing(Vec<String>),
}

impl MergeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Processing(_) => ErrorCategory::Processing,
            _ => ErrorCategory::Input,
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDataset(side) => write!(f, "dataset {side} has no records"),
            Self::TooManyRows { side, rows, limit } => {
                write!(f, "dataset {side} has {rows} rows, limit is {limit}")
            }
            Self::DuplicateColumn { side: Some(side), column } => {
                write!(f, "dataset {side}: duplicate column '{column}'")
            }
            Self::DuplicateColumn { side: None, column } => {
                write!(f, "duplicate column '{column}'")
            }
            Self::UnknownRecordColumn { row, column } => {
                write!(f, "row {row}: column '{column}' is not in the header")
            }
            Self::UnknownColumn { side, column } => {
                write!(f, "dataset {side}: no column named '{column}'")
            }
            Self::NoOperations => write!(f, "at least one merge operation is required"),
            Self::UnknownOperator(name) => write!(f, "unknown merge operation '{name}'"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Processing(errors) => {
                write!(f, "result validation failed: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for MergeError {}
