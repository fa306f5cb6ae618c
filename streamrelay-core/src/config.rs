use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the platform's internal API
    pub base_url: String,
    /// Origin/Referer sent with polling requests
    pub origin: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com/youtubei/v1".to_string(),
            origin: "https://www.youtube.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Delay between poll rounds, measured from round start
    pub poll_interval_ms: u64,
    /// How long a delivered message id suppresses duplicates
    pub dedup_window_seconds: u64,
    /// How often expired dedup entries are swept
    pub sweep_interval_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            dedup_window_seconds: 60,
            sweep_interval_seconds: 60,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_seconds)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file, and
    /// `STREAMRELAY_`-prefixed environment variables (in that precedence).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("STREAMRELAY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration, returning all problems at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.upstream.base_url.is_empty() {
            errors.push("upstream.base_url must not be empty".to_string());
        }
        if !self.upstream.base_url.starts_with("http") {
            errors.push(format!(
                "upstream.base_url must be an http(s) URL, got '{}'",
                self.upstream.base_url
            ));
        }
        if self.relay.poll_interval_ms < 100 {
            errors.push("relay.poll_interval_ms must be at least 100".to_string());
        }
        if self.relay.dedup_window_seconds == 0 {
            errors.push("relay.dedup_window_seconds must be non-zero".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relay.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.relay.dedup_window(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("server.port")));
    }

    #[test]
    fn test_validate_rejects_hot_poll_interval() {
        let mut config = Config::default();
        config.relay.poll_interval_ms = 10;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("poll_interval_ms")));
    }

    #[test]
    fn test_validate_rejects_bad_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
