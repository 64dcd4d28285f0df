//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures. The bot token never passes
//! through the file; it is resolved from the environment separately.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.discord-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.discord-mcp\config.json`
//!
//! A missing file at the default location is not an error; built-in
//! defaults apply. An explicitly given path that cannot be read is.

mod settings;

pub use settings::{BotConfig, Config, LoggingConfig, StartupConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable holding the bot token.
pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.discord-mcp/`
/// - **Windows:** `%USERPROFILE%\.discord-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".discord-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to defaults when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given file cannot be found or read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                let config = Config::default();
                config.validate()?;
                return Ok(config);
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// Resolves the bot token from the environment.
///
/// The token is required before any task starts; its absence is a fatal
/// configuration error.
///
/// # Errors
///
/// Returns [`ConfigError::MissingToken`] if `DISCORD_TOKEN` is unset or empty.
pub fn resolve_token() -> Result<String, ConfigError> {
    match std::env::var(TOKEN_ENV_VAR) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(ConfigError::MissingToken),
    }
}
