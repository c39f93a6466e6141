//! Client options file loading and parsing.

use std::path::Path;

use anyhow::{Context, Result};

use super::model::ClientOptions;
use crate::error::ConfigError;
use crate::validation::report::format_report;
use crate::validation::validate_options;

/// Loads the options file from disk and parses it.
pub fn load_from_path(path: &Path) -> Result<ClientOptions, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let options: ClientOptions =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(options)
}

/// Loads and fully validates the options file.
pub fn load_and_validate(path: &Path) -> Result<ClientOptions> {
    let options = load_from_path(path).context("Failed to load client options")?;
    validate(options)
}

/// Validates options that were built in code or from flat keys.
pub fn validate(options: ClientOptions) -> Result<ClientOptions> {
    let result = validate_options(&options);

    for issue in result.warnings() {
        tracing::warn!(
            key = %issue.key,
            suggestion = ?issue.suggestion,
            "Client options warning: {}",
            issue.message
        );
    }

    if !result.is_valid() {
        tracing::error!("Client options rejected\n{}", format_report(&result));
        anyhow::bail!(ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }

    Ok(options)
}
