use crate::config::{AppConfig, ConfigError};
use crate::observability::logging::{LogFormat, LogLevel};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Component hosted by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Generator,
    Processor,
    Verifier,
    Tally,
}

impl Role {
    pub fn defaults() -> Vec<Role> {
        vec![Role::Generator, Role::Processor, Role::Verifier]
    }
}

/// Aggregated runtime options derived from CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "seqcheck", version, about = "Delivery-guarantee checker for partitioned event pipelines")]
pub struct RuntimeOptions {
    /// JSON configuration file; missing keys fall back to defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Components to host (repeatable). Defaults to generator, processor, verifier.
    #[arg(long = "role", value_enum)]
    pub roles: Vec<Role>,

    /// HTTP bind address, overriding the config file.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Log level, overriding the config file.
    #[arg(long, value_parser = parse_level)]
    pub log_level: Option<LogLevel>,

    /// Log format (`text` or `json`), overriding the config file.
    #[arg(long, value_parser = parse_format)]
    pub log_format: Option<LogFormat>,
}

impl RuntimeOptions {
    pub fn from_env() -> Self {
        Self::parse()
    }

    /// Roles to host, with duplicates removed.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = if self.roles.is_empty() {
            Role::defaults()
        } else {
            self.roles.clone()
        };
        roles.sort();
        roles.dedup();
        roles
    }

    /// Loads the config file (or defaults) and applies command-line overrides.
    pub fn resolve_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.http.bind = bind.clone();
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    value.parse().map_err(|err: crate::LoggingError| err.to_string())
}

fn parse_format(value: &str) -> Result<LogFormat, String> {
    value.parse().map_err(|err: crate::LoggingError| err.to_string())
}
