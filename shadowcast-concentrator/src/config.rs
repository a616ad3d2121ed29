// Shadowcast Concentrator - configuration file loader
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Concentrator configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file at all) gives a working concentrator. Command-line flags
//! are applied on top by `main`.
//!
//! ```toml
//! listen = "0.0.0.0:47100"
//! http_port = 9100
//! notify = "127.0.0.1:47200"
//! company_id = 0x0059
//!
//! [pipeline]
//! queue_capacity = 64
//! purge_limit = 5
//! duplicate_filter = true
//! ```

use serde::Deserialize;
use shadowcast::{PipelineConfig, COMPANY_ID, DEFAULT_PURGE_LIMIT};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConcentratorConfig {
    /// UDP address receiving sensor broadcasts
    pub listen: SocketAddr,
    /// HTTP port for metrics and status
    pub http_port: u16,
    /// Subscriber receiving shadow notifications, if any
    pub notify: Option<SocketAddr>,
    /// Only broadcasts carrying this company id are decoded
    pub company_id: u16,
    pub pipeline: PipelineSection,
}

/// `[pipeline]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub queue_capacity: usize,
    pub purge_limit: usize,
    pub duplicate_filter: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            purge_limit: DEFAULT_PURGE_LIMIT,
            duplicate_filter: defaults.duplicate_filter,
        }
    }
}

impl Default for ConcentratorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 47100)),
            http_port: 9100,
            notify: None,
            company_id: COMPANY_ID,
            pipeline: PipelineSection::default(),
        }
    }
}

impl ConcentratorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ConcentratorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Pipeline settings for the core
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.pipeline.queue_capacity,
            purge_limit: self.pipeline.purge_limit,
            duplicate_filter: self.pipeline.duplicate_filter,
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.notify == Some(self.listen) {
            return Err(ConfigError::Invalid(
                "notify target must differ from the listen address".to_string(),
            ));
        }
        Ok(())
    }
}
