//! Core share group configuration

pub mod config;

pub use config::{BufferPoolConfig, DescriptorUpdateConfig, PipelineJobConfig, ShareGroupConfig};
