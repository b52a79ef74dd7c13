//! Renderer services consumed by a share group

use ash::vk;

use crate::backend::error::VulkanResult;
use crate::state::priority::{ContextPriority, ProtectionTypes};

/// Index of a queue serial slot reserved for one ordered submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueSerialIndex(pub u32);

/// Parameters for a new backing memory block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBlockRequest {
    /// Block size in bytes
    pub size: vk::DeviceSize,
    /// Memory type the block must be allocated from
    pub memory_type_index: u32,
    /// Buffer usage the block's buffer is created with
    pub usage: vk::BufferUsageFlags,
    /// Property flags of `memory_type_index`
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// A buffer and the device memory bound to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBufferBlock {
    /// Buffer covering the whole block
    pub buffer: vk::Buffer,
    /// Memory bound to `buffer`
    pub memory: vk::DeviceMemory,
    /// Size of the block in bytes
    pub size: vk::DeviceSize,
}

/// Renderer-level services a share group relies on
///
/// Every method takes `&self`; implementations own whatever interior
/// mutability they need. All calls happen on the submission thread.
pub trait Renderer {
    /// Reserve a queue serial slot for an ordered submission
    fn allocate_queue_serial_index(&self) -> VulkanResult<QueueSerialIndex>;

    /// Return a slot reserved by [`Renderer::allocate_queue_serial_index`]
    fn release_queue_serial_index(&self, index: QueueSerialIndex);

    /// Submit a dependency ordering all work at `src_priority` before any
    /// later work at `dst_priority` for the given protection types
    fn submit_priority_dependency(
        &self,
        protection_types: ProtectionTypes,
        src_priority: ContextPriority,
        dst_priority: ContextPriority,
        index: QueueSerialIndex,
    ) -> VulkanResult<()>;

    /// Usage flags every default pool buffer is created with
    fn default_buffer_usage_flags(&self) -> vk::BufferUsageFlags;

    /// Property flags of a memory type
    fn memory_type_properties(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags;

    /// Create a buffer with bound memory for a pool block
    fn allocate_buffer_block(&self, request: &BufferBlockRequest) -> VulkanResult<DeviceBufferBlock>;

    /// Destroy a block created by [`Renderer::allocate_buffer_block`]
    fn free_buffer_block(&self, block: DeviceBufferBlock);

    /// Notification that a share group finished pruning its pools
    fn on_buffer_pool_prune(&self, _released_bytes: vk::DeviceSize) {}
}

/// Exclusive ordering scope on the submission queue
///
/// The serial slot is returned to the renderer when the scope is dropped.
pub struct ScopedQueueSerialIndex<'a> {
    renderer: &'a dyn Renderer,
    index: QueueSerialIndex,
}

impl<'a> ScopedQueueSerialIndex<'a> {
    /// Reserve a serial slot for the lifetime of the returned scope
    pub fn allocate(renderer: &'a dyn Renderer) -> VulkanResult<Self> {
        let index = renderer.allocate_queue_serial_index()?;
        Ok(Self { renderer, index })
    }

    /// The reserved slot
    pub fn index(&self) -> QueueSerialIndex {
        self.index
    }
}

impl Drop for ScopedQueueSerialIndex<'_> {
    fn drop(&mut self) {
        self.renderer.release_queue_serial_index(self.index);
    }
}
