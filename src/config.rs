//! Configuration for the ingestion pipeline

use crate::error::{Result, ShadowcastError};
use crate::queue::DEFAULT_PURGE_LIMIT;

/// Pipeline-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Packet slots available to the ingestion queue
    pub queue_capacity: usize,

    /// Oldest packets discarded when the queue runs out of storage
    pub purge_limit: usize,

    /// Drop readings whose timestamp repeats the sender's last one
    pub duplicate_filter: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            purge_limit: DEFAULT_PURGE_LIMIT,
            duplicate_filter: true,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with a custom queue capacity
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom purge limit
    pub fn with_purge_limit(purge_limit: usize) -> Self {
        Self {
            purge_limit,
            ..Default::default()
        }
    }

    /// Create a configuration that forwards every decoded reading
    pub fn without_duplicate_filter() -> Self {
        Self {
            duplicate_filter: false,
            ..Default::default()
        }
    }

    /// Check the configuration can drive a pipeline
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ShadowcastError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.purge_limit, 5);
        assert!(config.duplicate_filter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_constructors() {
        assert_eq!(PipelineConfig::with_queue_capacity(8).queue_capacity, 8);
        assert_eq!(PipelineConfig::with_purge_limit(2).purge_limit, 2);
        assert!(!PipelineConfig::without_duplicate_filter().duplicate_filter);
    }

    #[test]
    fn test_pipeline_config_rejects_empty_queue() {
        let config = PipelineConfig::with_queue_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(ShadowcastError::InvalidConfig(_))
        ));
    }
}
