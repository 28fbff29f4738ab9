use crate::broker::MemoryBrokerConfig;
use crate::faults::FaultProfile;
use crate::observability::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// HTTP trigger surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

/// Topic names and partition layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicConfig {
    pub uploads: String,
    pub processed: String,
    pub greetings: String,
    pub partitions: u32,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            uploads: "uploads".into(),
            processed: "uploads-processed".into(),
            greetings: "greetings".into(),
            partitions: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Period used when a start request omits the rate.
    pub default_rate_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            default_rate_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    pub group: String,
    pub workers: usize,
    pub fail_before_probability: f64,
    pub fail_after_probability: f64,
    pub max_delay_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            group: "upload-processors".into(),
            workers: 4,
            fail_before_probability: 0.1,
            fail_after_probability: 0.1,
            max_delay_ms: 10_000,
        }
    }
}

impl ProcessorConfig {
    pub fn fault_profile(&self) -> FaultProfile {
        FaultProfile {
            fail_before_probability: self.fail_before_probability,
            fail_after_probability: self.fail_after_probability,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    pub group: String,
    pub workers: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            group: "processed-uploads-validator".into(),
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TallyConfig {
    pub group: String,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            group: "processed-uploads-tally".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EchoConfig {
    pub reply_timeout_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 5_000,
        }
    }
}

impl EchoConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Complete service configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub topics: TopicConfig,
    pub generator: GeneratorConfig,
    pub processor: ProcessorConfig,
    pub verifier: VerifierConfig,
    pub tally: TallyConfig,
    pub broker: MemoryBrokerConfig,
    pub echo: EchoConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw)?;
        Self::from_json(value)
    }

    /// Builds a configuration from a (possibly partial) JSON object.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::Invalid {
                field: "<root>",
                reason: "config must be a JSON object".into(),
            });
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed HTTP bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http.bind.parse().map_err(|_| ConfigError::Invalid {
            field: "http.bind",
            reason: format!("'{}' is not a socket address", self.http.bind),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.topics.partitions == 0 {
            return Err(invalid("topics.partitions", "must be at least 1"));
        }
        for (field, name) in [
            ("topics.uploads", &self.topics.uploads),
            ("topics.processed", &self.topics.processed),
            ("topics.greetings", &self.topics.greetings),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.processor.workers == 0 {
            return Err(invalid("processor.workers", "must be at least 1"));
        }
        if self.verifier.workers == 0 {
            return Err(invalid("verifier.workers", "must be at least 1"));
        }
        if self.echo.reply_timeout_ms == 0 {
            return Err(invalid("echo.reply_timeout_ms", "must be positive"));
        }
        for (field, value) in [
            (
                "processor.fail_before_probability",
                self.processor.fail_before_probability,
            ),
            (
                "processor.fail_after_probability",
                self.processor.fail_after_probability,
            ),
            (
                "broker.publish_failure_probability",
                self.broker.publish_failure_probability,
            ),
            (
                "broker.redeliver_after_ack_probability",
                self.broker.redeliver_after_ack_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "probability must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
