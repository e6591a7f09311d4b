use std::fmt;

use dupmerge_merge::{ErrorCategory, MergeError, Side};

/// Errors from the session store and the merge workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Unknown id, already deleted, or idle past the TTL.
    NotFound,
    /// The session's inputs changed while a request was working from an
    /// older copy of them.
    Conflict,
    MissingDataset(Side),
    MissingMapping,
    MissingOperations,
    MissingResult,
    Merge(MergeError),
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotFound | SessionError::Conflict => ErrorCategory::Session,
            SessionError::MissingDataset(_)
            | SessionError::MissingMapping
            | SessionError::MissingOperations
            | SessionError::MissingResult => ErrorCategory::Input,
            SessionError::Merge(e) => e.category(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound => write!(f, "session not found or expired"),
            SessionError::Conflict => {
                write!(f, "session inputs changed while the request was running")
            }
            SessionError::MissingDataset(side) => {
                write!(f, "dataset {} has not been uploaded", side.as_str())
            }
            SessionError::MissingMapping => write!(f, "no column mapping configured"),
            SessionError::MissingOperations => write!(f, "no merge operations configured"),
            SessionError::MissingResult => write!(f, "session has not been processed"),
            SessionError::Merge(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<MergeError> for SessionError {
    fn from(e: MergeError) -> Self {
        SessionError::Merge(e)
    }
}
