//! GPU-side resources owned by a share group

/// Virtual block suballocation algorithms
pub mod suballocator;

/// Buffer pools backed by device memory blocks
pub mod buffer_pool;

/// Lazily created per-(algorithm, memory type) pools
pub mod pool_manager;

/// Batched descriptor set updates
pub mod descriptor_set;

/// Mutable texture upload tracking
pub mod texture_upload;

pub use buffer_pool::{BufferPool, BufferSuballocation, PoolKey};
pub use descriptor_set::{DescriptorInfoRef, PendingDescriptorWrite, UpdateDescriptorSetsBuilder};
pub use pool_manager::{BufferUsageType, DefaultBufferPools};
pub use suballocator::{SuballocationAlgorithm, VirtualAllocation, VirtualBlock};
pub use texture_upload::{MipLevelSpecification, MutableTexture, TextureUploadTracker};
