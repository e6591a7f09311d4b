//! `dupmerge-merge`: duplicate matching and merging across two datasets.
//!
//! Pure engine crate: receives parsed datasets, returns the four derived
//! result sets. No session state, no file IO.

pub mod config;
pub mod csv;
pub mod error;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod validate;

pub use config::{JobConfig, Settings};
pub use error::{ErrorCategory, MergeError};
pub use merge::MergeOptions;
pub use model::{
    ColumnMapping, Dataset, MergeOperation, Operator, ProcessedResult, Record, ResultSet,
    ResultTable, Side, Value,
};
pub use pipeline::{process, ProcessOptions};
