//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! The bot token is deliberately NOT part of the file format; it is read
//! from the `DISCORD_TOKEN` environment variable only.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Bot identity settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Path to the message template directory.
    ///
    /// Default: `templates/messages` relative to the working directory.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Startup settings.
    #[serde(default)]
    pub startup: StartupConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        if self.startup.ready_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "startup.ready_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.startup.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "startup.poll_interval_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the effective template directory.
    #[must_use]
    pub fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("templates/messages"))
    }
}

/// Bot identity used in rendered message templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name used in the welcome message.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Organisation name used in the welcome message.
    #[serde(default = "default_orga_name")]
    pub orga_name: String,

    /// Website URL used in the welcome message.
    #[serde(default = "default_website_url")]
    pub website_url: String,

    /// Invite link used in the welcome message.
    #[serde(default = "default_discord_invite")]
    pub discord_invite: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            orga_name: default_orga_name(),
            website_url: default_website_url(),
            discord_invite: default_discord_invite(),
        }
    }
}

fn default_bot_name() -> String {
    "WaDn ~ MCP".to_string()
}

fn default_orga_name() -> String {
    "WaDn-X.De".to_string()
}

fn default_website_url() -> String {
    "https://wadn-x.de".to_string()
}

fn default_discord_invite() -> String {
    "https://discord.gg/qSVqRDrRbX".to_string()
}

/// Startup timing configuration.
///
/// The poll interval is a trade-off between shutdown latency and idle CPU
/// cost; 100 ms keeps both negligible.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartupConfig {
    /// How long to wait for the Discord connection to become ready, in seconds.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Interval between readiness/exit-signal polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_ready_timeout_secs() -> u64 {
    30
}

const fn default_poll_interval_ms() -> u64 {
    100
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "bot": {
                "name": "Test Bot",
                "orga_name": "Test Org",
                "website_url": "https://example.com",
                "discord_invite": "https://discord.gg/example"
            },
            "templates_dir": "custom/templates",
            "startup": {
                "ready_timeout_secs": 10,
                "poll_interval_ms": 50
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bot.name, "Test Bot");
        assert_eq!(config.templates_dir(), PathBuf::from("custom/templates"));
        assert_eq!(config.startup.ready_timeout_secs, 10);
        assert_eq!(config.startup.poll_interval_ms, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn bot_config_defaults() {
        let config = BotConfig::default();
        assert!(!config.name.is_empty());
        assert!(config.website_url.starts_with("https://"));
    }

    #[test]
    fn startup_config_defaults() {
        let config = StartupConfig::default();
        assert_eq!(config.ready_timeout_secs, 30);
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn default_templates_dir() {
        let config = Config::default();
        assert_eq!(config.templates_dir(), PathBuf::from("templates/messages"));
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{
            "logging": {
                "level": "loud"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_ready_timeout() {
        let json = r#"{
            "startup": {
                "ready_timeout_secs": 0
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
