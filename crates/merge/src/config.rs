use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::MergeError;
use crate::merge::MergeOptions;
use crate::model::{ColumnMapping, MergeOperation};
use crate::pipeline::{ProcessOptions, DEFAULT_MAX_ROWS};

pub const DEFAULT_TTL_SECS: u64 = 15 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Process-wide settings. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub session: SessionSettings,
    pub limits: LimitSettings,
    pub merge: MergeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Sliding idle timeout.
    pub ttl_secs: u64,
    /// Period of the background expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitSettings {
    pub max_rows: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self { max_rows: DEFAULT_MAX_ROWS }
    }
}

impl Settings {
    pub fn from_toml(input: &str) -> Result<Self, MergeError> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| MergeError::ConfigParse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        if self.session.ttl_secs == 0 {
            return Err(MergeError::ConfigValidation("session.ttl_secs must be > 0".into()));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(MergeError::ConfigValidation(
                "session.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.limits.max_rows == 0 {
            return Err(MergeError::ConfigValidation("limits.max_rows must be > 0".into()));
        }
        if self.merge.secondary_prefix.is_empty() {
            return Err(MergeError::ConfigValidation(
                "merge.secondary_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions { merge: self.merge.clone(), max_rows: self.limits.max_rows }
    }
}

// ---------------------------------------------------------------------------
// Job file
// ---------------------------------------------------------------------------

/// One match/merge run: two input files, the key mapping and the operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    /// Field delimiter for both files. Sniffed when absent.
    #[serde(default)]
    pub delimiter: Option<char>,
    pub mapping: ColumnMapping,
    pub operations: Vec<MergeOperation>,
}

impl JobConfig {
    pub fn from_toml(input: &str) -> Result<Self, MergeError> {
        let job: JobConfig =
            toml::from_str(input).map_err(|e| MergeError::ConfigParse(e.to_string()))?;
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        if self.name.trim().is_empty() {
            return Err(MergeError::ConfigValidation("name must not be empty".into()));
        }
        if self.mapping.column_a.is_empty() || self.mapping.column_b.is_empty() {
            return Err(MergeError::ConfigValidation(
                "mapping.column_a and mapping.column_b are required".into(),
            ));
        }
        if self.operations.is_empty() {
            return Err(MergeError::NoOperations);
        }
        if let Some(d) = self.delimiter {
            if !d.is_ascii() {
                return Err(MergeError::ConfigValidation(format!(
                    "delimiter must be a single ASCII character, got '{d}'"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
