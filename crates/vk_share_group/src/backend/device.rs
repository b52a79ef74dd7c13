//! Batched descriptor set update entry point

use ash::vk;

/// Device entry point accepting one batch of descriptor writes
pub trait DescriptorSetUpdater {
    /// Apply every write in a single driver call
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);
}

impl DescriptorSetUpdater for ash::Device {
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        // The writes point into arrays owned by the caller for the duration
        // of this call.
        unsafe {
            ash::Device::update_descriptor_sets(self, writes, &[]);
        }
    }
}
