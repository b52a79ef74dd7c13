//! Vulkan collaborator seams
//!
//! The share group never talks to the driver directly. Everything it needs
//! from the renderer, the device, and the render pass cache goes through the
//! traits defined here.

/// Error taxonomy shared by every component
pub mod error;

/// Renderer services: queue ordering, priority transitions, memory blocks
pub mod renderer;

/// Batched descriptor update entry point
pub mod device;

/// Render pass descriptions and the compatible render pass cache
pub mod render_pass;

pub use device::DescriptorSetUpdater;
pub use error::{VulkanError, VulkanResult};
pub use render_pass::{RenderPassCache, RenderPassDesc};
pub use renderer::{
    BufferBlockRequest, DeviceBufferBlock, QueueSerialIndex, Renderer, ScopedQueueSerialIndex,
};
