//! Configuration Module
//!
//! Loads settings for the sign-in core and its sandbox binary from
//! `config/application.yml`, overridden by `APP_`-prefixed environment
//! variables (nested keys separated by `__`, e.g. `APP_SIGN_IN__CONCURRENCY`).
//!
//! # License
//! Licensed under the AGPLv3 license.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use config::{Config as ConfigFile, Environment, File, FileFormat};

use crate::state::{ConcurrencyPolicy, SignInOptions};

/// Session behaviour
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignInSettings {
    /// Entry points offered by the session
    #[serde(default)]
    pub options: SignInOptions,
    /// Handling of intents issued while one is loading
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// In-memory verification backend, the equivalent of a provider test mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxSettings {
    /// Code every SMS challenge carries
    #[serde(default = "default_sms_code")]
    pub sms_code: String,
    /// Simulated round-trip per call in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Phones that already belong to an account
    #[serde(default)]
    pub registered_phones: Vec<String>,
    /// Social identifiers that already belong to an account
    #[serde(default)]
    pub registered_social_ids: Vec<String>,
    /// Identifier the sandbox adapter returns per provider name
    #[serde(default)]
    pub social_ids: std::collections::HashMap<String, String>,
}

fn default_sms_code() -> String {
    "000000".to_string()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            sms_code: default_sms_code(),
            latency_ms: 0,
            registered_phones: Vec::new(),
            registered_social_ids: Vec::new(),
            social_ids: Default::default(),
        }
    }
}

/// Application configuration settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub sign_in: SignInSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl Settings {
    /// Loads settings from `config/application.yml` (optional) and the environment.
    ///
    /// # Errors
    /// Returns a `ConfigError` if a source cannot be parsed or a value has the
    /// wrong shape.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("config/application")
    }

    /// Loads settings from the given file stem plus the environment.
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let builder = ConfigFile::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize().map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parses settings from YAML text, without consulting the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config = ConfigFile::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        config.try_deserialize().map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = Settings::from_yaml_str("{}").unwrap();
        assert_eq!(settings.sign_in.options, SignInOptions::PhoneOnly { restore: false });
        assert_eq!(settings.sign_in.concurrency, ConcurrencyPolicy::LastWriteWins);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.sandbox.sms_code, "000000");
    }

    #[test]
    fn full_document_parses() {
        let yaml = r#"
sign_in:
  options:
    mode: phone_only
    restore: true
  concurrency: reject_while_loading
logging:
  level: debug
  json: true
sandbox:
  sms_code: "1234"
  latency_ms: 25
  registered_phones: ["+15550000001"]
  registered_social_ids: ["fb-1"]
  social_ids:
    facebook: fb-1
"#;
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.sign_in.options, SignInOptions::PhoneOnly { restore: true });
        assert_eq!(settings.sign_in.concurrency, ConcurrencyPolicy::RejectWhileLoading);
        assert!(settings.logging.json);
        assert_eq!(settings.sandbox.latency_ms, 25);
        assert_eq!(settings.sandbox.registered_phones, vec!["+15550000001"]);
        assert_eq!(settings.sandbox.social_ids.get("facebook").map(String::as_str), Some("fb-1"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let yaml = "sign_in:\n  options:\n    mode: carrier_pigeon\n";
        assert!(matches!(Settings::from_yaml_str(yaml), Err(ConfigError::ParseError(_))));
    }
}
