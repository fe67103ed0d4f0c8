//! Configuration loading, validation, and management for callmeter.
//!
//! Loads configuration from `~/.callmeter/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.callmeter/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when a caller does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Request admission limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// History, logging and export settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Cost model settings
    #[serde(default)]
    pub pricing: PricingConfig,
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_true() -> bool {
    true
}

/// Sliding-window admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// When false every request is admitted
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,

    #[serde(default = "default_rph")]
    pub requests_per_hour: u32,
}

fn default_rpm() -> u32 {
    50
}
fn default_rph() -> u32 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_rpm(),
            requests_per_hour: default_rph(),
        }
    }
}

/// History, log sink and export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Capacity of the in-memory request history
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Append-only log file mirroring request start/completion lines
    #[serde(default = "default_log_file", skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Default destination for analytics exports
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,

    /// Per-call timeout in seconds (0 = no timeout)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_max_history() -> usize {
    1000
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("callmeter.log"))
}
fn default_export_path() -> PathBuf {
    PathBuf::from("callmeter_analytics.json")
}
fn default_call_timeout() -> u64 {
    120
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            log_file: default_log_file(),
            export_path: default_export_path(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

/// Cost model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Entry used for models missing from the table
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom: HashMap<String, PricingOverrideConfig>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            custom: HashMap::new(),
        }
    }
}

/// Custom per-thousand-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1K input tokens
    pub input_per_1k: f64,
    /// Price per 1K output tokens
    pub output_per_1k: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.callmeter/config.toml).
    ///
    /// Environment overrides:
    /// - `CALLMETER_MODEL` replaces `default_model`
    /// - `CALLMETER_LOG_FILE` replaces `telemetry.log_file` (empty disables it)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("CALLMETER_MODEL") {
            config.default_model = model;
        }

        if let Ok(log_file) = std::env::var("CALLMETER_LOG_FILE") {
            config.telemetry.log_file = (!log_file.is_empty()).then(|| PathBuf::from(log_file));
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".callmeter")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.rate_limit;
        if limits.requests_per_minute == 0 || limits.requests_per_hour == 0 {
            return Err(ConfigError::ValidationError(
                "rate limits must be greater than zero".into(),
            ));
        }

        if limits.requests_per_hour < limits.requests_per_minute {
            return Err(ConfigError::ValidationError(
                "requests_per_hour must be >= requests_per_minute".into(),
            ));
        }

        if self.telemetry.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.max_history must be > 0".into(),
            ));
        }

        for (model, price) in &self.pricing.custom {
            let valid = |p: f64| p.is_finite() && p >= 0.0;
            if !valid(price.input_per_1k) || !valid(price.output_per_1k) {
                return Err(ConfigError::ValidationError(format!(
                    "pricing for '{model}' must be finite and non-negative"
                )));
            }
        }

        Ok(())
    }

    /// Per-call timeout, if one is configured.
    pub fn call_timeout(&self) -> Option<std::time::Duration> {
        match self.telemetry.call_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }

    /// Render the configuration as TOML (for the `config` command).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.rate_limit.requests_per_minute, 50);
        assert_eq!(config.rate_limit.requests_per_hour, 1000);
        assert_eq!(config.telemetry.max_history, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(
            parsed.rate_limit.requests_per_hour,
            config.rate_limit.requests_per_hour
        );
        assert_eq!(parsed.telemetry.log_file, config.telemetry.log_file);
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let config = AppConfig {
            rate_limit: RateLimitConfig {
                requests_per_minute: 0,
                ..RateLimitConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hourly_below_minute_rejected() {
        let config = AppConfig {
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_minute: 100,
                requests_per_hour: 10,
            },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requests_per_hour"));
    }

    #[test]
    fn negative_pricing_rejected() {
        let mut config = AppConfig::default();
        config.pricing.custom.insert(
            "bad".into(),
            PricingOverrideConfig {
                input_per_1k: -1.0,
                output_per_1k: 0.0,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.telemetry.call_timeout_secs, 120);
    }

    #[test]
    fn load_from_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_model = "claude-3-5-haiku-20241022"

[rate_limit]
requests_per_minute = 5
requests_per_hour = 100

[telemetry]
max_history = 10
call_timeout_secs = 0

[pricing.custom."my-model"]
input_per_1k = 0.001
output_per_1k = 0.002
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "claude-3-5-haiku-20241022");
        assert_eq!(config.rate_limit.requests_per_minute, 5);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.telemetry.max_history, 10);
        assert!(config.call_timeout().is_none());
        assert_eq!(config.pricing.default_model, "claude-3-5-sonnet-20241022");
        let custom = &config.pricing.custom["my-model"];
        assert!((custom.output_per_1k - 0.002).abs() < 1e-12);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "rate_limit = \"not a table\"").unwrap();

        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
