//! # Vulkan Share Group
//!
//! Resource sharing and submission coordination for a group of Vulkan
//! contexts that share objects.
//!
//! ## Features
//!
//! - **Buffer Suballocation**: Per-memory-type buddy and best-fit pools with
//!   periodic pruning of empty blocks
//! - **Batched Descriptor Updates**: One device call per batch, growable
//!   backing arrays addressed by offset
//! - **Priority Unification**: Every context of a group submits at the same
//!   priority, with GPU-ordered transitions
//! - **Pipeline Jobs**: Single-flight, rate-limited background compilation of
//!   monolithic pipelines
//! - **Texture Uploads**: Deferred full mip chain materialization for
//!   mutable textures
//!
//! Device creation, windowing, and memory allocation are left to the host;
//! the group reaches them through the [`backend::Renderer`],
//! [`backend::DescriptorSetUpdater`], [`backend::RenderPassCache`], and
//! [`rendering::WorkerPool`] traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_share_group::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vk_share_group::foundation::logging::init();
//!
//!     let config = ShareGroupConfig::load_from_file("share_group.toml")?;
//!     let group = ShareGroup::with_system_clock(config)?;
//!     let mut workers = ThreadWorkerPool::new(2)?;
//!
//!     // Hand `group` and `workers` to the contexts...
//!     assert!(group.is_empty());
//!
//!     workers.drain();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Shared utilities
pub mod foundation;
pub mod config;
pub mod core;

// Collaborator seams
pub mod backend;

// Share group components
pub mod state;
pub mod resources;
pub mod rendering;

mod share_group;

#[cfg(test)]
mod test_support;

pub use share_group::ShareGroup;

/// Common imports for share group users
pub mod prelude {
    pub use crate::{
        ShareGroup,
        backend::{
            DescriptorSetUpdater, RenderPassCache, RenderPassDesc, Renderer, VulkanError, VulkanResult,
        },
        config::{Config, ConfigError, ConfigFormat},
        core::ShareGroupConfig,
        foundation::{
            collections::{ContextKey, SlotMap, TextureKey},
            time::{Clock, ManualClock, SystemClock},
        },
        rendering::{PipelineCreationTask, ThreadWorkerPool, WaitablePipelineCreationTask, WorkerPool},
        resources::{BufferSuballocation, BufferUsageType, MutableTexture},
        state::{ContextInfo, ContextPriority, ProtectionType},
    };
}
