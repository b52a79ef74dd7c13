//! Render pass descriptions and the compatible render pass cache

use ash::vk;

use crate::backend::error::{VulkanError, VulkanResult};

/// Maximum number of color attachments a description may carry
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Attachment layout a pipeline is compiled against
///
/// Two descriptions that compare equal yield compatible render passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    color_formats: Vec<vk::Format>,
    depth_stencil_format: Option<vk::Format>,
    samples: vk::SampleCountFlags,
}

impl RenderPassDesc {
    /// Create an empty description with the given sample count
    pub fn new(samples: vk::SampleCountFlags) -> Self {
        Self {
            color_formats: Vec::new(),
            depth_stencil_format: None,
            samples,
        }
    }

    /// Append a color attachment
    pub fn with_color(mut self, format: vk::Format) -> Self {
        self.color_formats.push(format);
        self
    }

    /// Set the depth/stencil attachment
    pub fn with_depth_stencil(mut self, format: vk::Format) -> Self {
        self.depth_stencil_format = Some(format);
        self
    }

    /// Color attachment formats in attachment order
    pub fn color_formats(&self) -> &[vk::Format] {
        &self.color_formats
    }

    /// Depth/stencil attachment format, if any
    pub fn depth_stencil_format(&self) -> Option<vk::Format> {
        self.depth_stencil_format
    }

    /// Sample count shared by every attachment
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Reject descriptions no render pass can be built for
    pub fn validate(&self) -> VulkanResult<()> {
        if self.color_formats.len() > MAX_COLOR_ATTACHMENTS {
            return Err(VulkanError::CacheLookup {
                reason: format!(
                    "{} color attachments exceeds the limit of {}",
                    self.color_formats.len(),
                    MAX_COLOR_ATTACHMENTS
                ),
            });
        }
        if !self.samples.as_raw().is_power_of_two() {
            return Err(VulkanError::CacheLookup {
                reason: format!("sample count {:?} is not a single count", self.samples),
            });
        }
        if self.color_formats.iter().any(|&format| format == vk::Format::UNDEFINED)
            || self.depth_stencil_format == Some(vk::Format::UNDEFINED)
        {
            return Err(VulkanError::CacheLookup {
                reason: "attachment format is undefined".to_string(),
            });
        }
        Ok(())
    }
}

/// Cache producing render passes compatible with a description
pub trait RenderPassCache {
    /// Look up (or create) a render pass compatible with `desc`
    ///
    /// Fails with [`VulkanError::CacheLookup`] on a malformed or unsupported
    /// description.
    fn get_compatible_render_pass(&mut self, desc: &RenderPassDesc) -> VulkanResult<vk::RenderPass>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_description() {
        let desc = RenderPassDesc::new(vk::SampleCountFlags::TYPE_4)
            .with_color(vk::Format::R8G8B8A8_UNORM)
            .with_depth_stencil(vk::Format::D24_UNORM_S8_UINT);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.color_formats().len(), 1);
    }

    #[test]
    fn test_invalid_descriptions() {
        let mixed_samples = RenderPassDesc::new(
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
        );
        assert!(matches!(mixed_samples.validate(), Err(VulkanError::CacheLookup { .. })));

        let mut too_many = RenderPassDesc::new(vk::SampleCountFlags::TYPE_1);
        for _ in 0..=MAX_COLOR_ATTACHMENTS {
            too_many = too_many.with_color(vk::Format::R8G8B8A8_UNORM);
        }
        assert!(too_many.validate().is_err());

        let undefined = RenderPassDesc::new(vk::SampleCountFlags::TYPE_1)
            .with_color(vk::Format::UNDEFINED);
        assert!(undefined.validate().is_err());
    }
}
