//! Vulkan error types
//!
//! No component retries a failed driver call; errors are surfaced to the
//! caller immediately.

use ash::vk;

/// Vulkan-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The device was lost; every later submission will fail as well
    #[error("Vulkan device lost")]
    DeviceLost,

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// The render pass cache could not produce a compatible render pass
    #[error("Render pass cache lookup failed: {reason}")]
    CacheLookup {
        /// Why the description was rejected
        reason: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

impl VulkanError {
    /// Classify a raw driver result
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory { requested: 0 }
            }
            other => Self::Api(other),
        }
    }

    /// Whether the error originated in (or is reported as) a driver failure
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Api(_) | Self::DeviceLost | Self::OutOfMemory { .. })
    }

    /// Whether the whole device should be considered lost
    pub fn marks_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::from_vk(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
