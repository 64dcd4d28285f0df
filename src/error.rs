//! Error types for discord-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include the bot token.
//! All error variants that could potentially contain sensitive data
//! use generic descriptions instead of including the actual values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The `DISCORD_TOKEN` environment variable is not set.
    #[error("DISCORD_TOKEN environment variable is required but not set")]
    MissingToken,

    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that can occur while loading or rendering message templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template directory does not exist.
    #[error("template directory not found: {path}")]
    DirectoryMissing {
        /// Path where the template directory was expected.
        path: PathBuf,
    },

    /// A template file could not be read.
    #[error("failed to read template file: {path}")]
    ReadError {
        /// Path to the template file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A template file failed to parse.
    #[error("invalid template '{key}'")]
    InvalidTemplate {
        /// The template key being loaded.
        key: String,
        /// The underlying parse error.
        #[source]
        source: minijinja::Error,
    },

    /// No template is registered under the requested key.
    #[error("template not found: {key}")]
    NotFound {
        /// The requested template key.
        key: String,
    },

    /// Template rendering failed.
    #[error("failed to render template '{key}'")]
    RenderError {
        /// The template key being rendered.
        key: String,
        /// The underlying rendering error.
        #[source]
        source: minijinja::Error,
    },
}
