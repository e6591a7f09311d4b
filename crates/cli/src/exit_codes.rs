//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | Success                                                    |
//! | 1    | General error (unspecified)                                |
//! | 2    | Usage error (bad args)                                     |
//! | 3    | Input error (bad job/settings, empty data, unknown column) |
//! | 4    | Processing error (result failed validation)                |
//! | 5    | Session error (session expired or missing)                 |
//! | 6    | IO error (cannot read input or write output)               |

use dupmerge_merge::ErrorCategory;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// The job, settings or data were rejected. Fix the input and rerun.
pub const EXIT_INPUT: u8 = 3;

/// Matching and merging produced inconsistent counts. Indicates a bug,
/// not bad input.
pub const EXIT_PROCESSING: u8 = 4;

/// The session expired or vanished mid-run.
pub const EXIT_SESSION: u8 = 5;

/// Reading an input file or writing an output file failed.
pub const EXIT_IO: u8 = 6;

/// Map an engine/session error category to its exit code.
pub fn category_exit_code(category: ErrorCategory) -> u8 {
    match category {
        ErrorCategory::Input => EXIT_INPUT,
        ErrorCategory::Processing => EXIT_PROCESSING,
        ErrorCategory::Session => EXIT_SESSION,
    }
}
