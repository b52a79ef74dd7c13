//! # Share Group Configuration
//!
//! Tunables for every component a share group owns. All values default to
//! the constants the renderer ships with; hosts may override them from a
//! TOML or RON file through [`Config`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::resources::pool_manager::BufferUsageType;
use crate::resources::suballocator::BuddyBlock;

/// Buffer pool sizing and pruning parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Largest static-usage allocation served by the buddy algorithm
    pub max_static_size_for_buddy: u64,
    /// Largest dynamic-usage allocation served by the buddy algorithm
    pub max_dynamic_size_for_buddy: u64,
    /// Minimum time between periodic prunes, in milliseconds
    pub prune_interval_ms: u64,
    /// Freed bytes that force a prune regardless of the interval
    pub max_total_empty_buffer_bytes: u64,
    /// Size of a freshly created backing block
    pub block_size: u64,
    /// Log per-pool statistics after every prune
    pub log_stats_on_prune: bool,
}

impl BufferPoolConfig {
    /// Size threshold at or below which `usage` selects the buddy algorithm
    pub fn buddy_size_limit(&self, usage: BufferUsageType) -> u64 {
        match usage {
            BufferUsageType::Static => self.max_static_size_for_buddy,
            BufferUsageType::Dynamic => self.max_dynamic_size_for_buddy,
        }
    }

    /// Prune interval as a duration
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            max_static_size_for_buddy: 256,
            max_dynamic_size_for_buddy: 4096,
            prune_interval_ms: 250,
            max_total_empty_buffer_bytes: 16 * 1024 * 1024,
            block_size: 4 * 1024 * 1024,
            log_stats_on_prune: false,
        }
    }
}

/// Initial reservations for the descriptor update builder
///
/// Sized so most applications never grow the arrays at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorUpdateConfig {
    /// Reserved buffer info records
    pub buffer_infos: usize,
    /// Reserved image info records
    pub image_infos: usize,
    /// Reserved write records
    pub write_descriptor_sets: usize,
    /// Reserved texel buffer views
    pub buffer_views: usize,
}

impl Default for DescriptorUpdateConfig {
    fn default() -> Self {
        Self {
            buffer_infos: 8,
            image_infos: 4,
            write_descriptor_sets: 8 + 4,
            buffer_views: 0,
        }
    }
}

/// Background pipeline job admission parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineJobConfig {
    /// Minimum time between two posted jobs, in microseconds
    ///
    /// Pipeline creation typically costs hundreds of microseconds; 2ms keeps
    /// at most one job in flight while still allowing ~500 pipelines/second.
    pub min_job_period_us: u64,
}

impl PipelineJobConfig {
    /// Minimum job period as a duration
    pub fn min_job_period(&self) -> Duration {
        Duration::from_micros(self.min_job_period_us)
    }
}

impl Default for PipelineJobConfig {
    fn default() -> Self {
        Self { min_job_period_us: 2000 }
    }
}

/// Complete configuration for one share group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareGroupConfig {
    /// Suballocation pool parameters
    pub buffer_pool: BufferPoolConfig,
    /// Descriptor update builder reservations
    pub descriptor_updates: DescriptorUpdateConfig,
    /// Pipeline job scheduler parameters
    pub pipeline_jobs: PipelineJobConfig,
}

impl Config for ShareGroupConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let pools = &self.buffer_pool;
        if pools.max_dynamic_size_for_buddy <= pools.max_static_size_for_buddy {
            return Err(ConfigError::Invalid(format!(
                "dynamic buddy threshold ({}) must exceed static threshold ({})",
                pools.max_dynamic_size_for_buddy, pools.max_static_size_for_buddy
            )));
        }
        if pools.block_size < BuddyBlock::MIN_NODE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "buffer pool block size {} is below the minimum of {}",
                pools.block_size,
                BuddyBlock::MIN_NODE_SIZE
            )));
        }
        if pools.prune_interval_ms == 0 {
            return Err(ConfigError::Invalid("prune interval is zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults() {
        let config = ShareGroupConfig::default();
        assert_eq!(config.buffer_pool.buddy_size_limit(BufferUsageType::Static), 256);
        assert_eq!(config.buffer_pool.buddy_size_limit(BufferUsageType::Dynamic), 4096);
        assert_eq!(config.buffer_pool.prune_interval(), Duration::from_millis(250));
        assert_eq!(config.pipeline_jobs.min_job_period(), Duration::from_millis(2));
        assert_eq!(config.descriptor_updates.write_descriptor_sets, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = ShareGroupConfig::default();
        config.buffer_pool.max_dynamic_size_for_buddy = 128;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_tiny_block_size() {
        let mut config = ShareGroupConfig::default();
        config.buffer_pool.block_size = 8;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.buffer_pool.block_size = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[buffer_pool]\nprune_interval_ms = 100\n").unwrap();

        let config = ShareGroupConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.buffer_pool.prune_interval_ms, 100);
        assert_eq!(config.buffer_pool.max_static_size_for_buddy, 256);
        assert_eq!(config.pipeline_jobs, PipelineJobConfig::default());
    }

    #[test]
    fn test_ron_save_and_load() {
        let file = Builder::new().suffix(".ron").tempfile().unwrap();
        let path = file.path();

        let mut config = ShareGroupConfig::default();
        config.pipeline_jobs.min_job_period_us = 500;
        config.save_to_file(path).unwrap();

        let loaded = ShareGroupConfig::load_from_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_rejected_on_load() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[buffer_pool]\nblock_size = 4\n").unwrap();

        let result = ShareGroupConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_format_from_text() {
        let config = ShareGroupConfig::from_str_in("(pipeline_jobs: (min_job_period_us: 10))", ConfigFormat::Ron).unwrap();
        assert_eq!(config.pipeline_jobs.min_job_period_us, 10);
        assert!(matches!(
            ShareGroupConfig::from_str_in("[buffer_pool", ConfigFormat::Toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = Builder::new().suffix(".yaml").tempfile().unwrap();
        let result = ShareGroupConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
