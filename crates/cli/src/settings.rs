//! Settings file discovery.

use std::path::{Path, PathBuf};

use dupmerge_merge::Settings;

use crate::CliError;

/// `<config dir>/dupmerge/settings.toml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dupmerge").join("settings.toml"))
}

/// Load settings from `explicit`, else the default path if it exists, else
/// built-in defaults. An explicit path that cannot be read is an error.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, CliError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_settings_path().filter(|p| p.is_file()) {
            Some(path) => path,
            None => return Ok(Settings::default()),
        },
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("cannot read settings {}: {e}", path.display())))?;
    let settings = Settings::from_toml(&text).map_err(|e| {
        CliError::merge(e).with_hint(format!("check {}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}
