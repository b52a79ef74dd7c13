//! Mutable texture upload tracking
//!
//! Applications tend to re-upload the same mutable texture many times before
//! drawing with it. Building its full mip chain on every upload would be
//! wasted work, so the share group remembers the last uploaded mutable
//! texture and only materializes the chain once uploads switch to a
//! different texture.
//!
//! The tracked texture is named by a [`TextureKey`]. A key whose texture was
//! removed from the owning map no longer resolves, so a destroyed texture is
//! never touched even if [`TextureUploadTracker::on_texture_release`] was
//! missed.

use ash::vk;

use crate::backend::error::VulkanResult;
use crate::foundation::collections::{SlotMap, TextureKey};

/// Texture state the tracker needs to see
pub trait MutableTexture {
    /// Whether the texture's storage is immutable
    fn is_immutable(&self) -> bool;

    /// Whether every level was specified consistently enough for the whole
    /// chain to be allocated at once
    fn is_mutable_texture_consistently_specified_for_flush(&self) -> bool;

    /// Allocate and initialize the full mip chain
    fn ensure_full_mip_chain_initialized(&mut self) -> VulkanResult<()>;
}

/// Remembers the most recently uploaded mutable texture of a share group
#[derive(Debug, Default)]
pub struct TextureUploadTracker {
    prev_uploaded_mutable_texture: Option<TextureKey>,
    mutable_textures_uploaded: u64,
}

impl TextureUploadTracker {
    /// Create a tracker with nothing tracked
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload to `new_texture`
    ///
    /// When this upload switches away from a mutable, consistently specified
    /// texture, that texture's full mip chain is materialized now.
    pub fn on_mutable_texture_upload<T: MutableTexture>(
        &mut self,
        textures: &mut SlotMap<TextureKey, T>,
        new_texture: TextureKey,
    ) -> VulkanResult<()> {
        let prev = self
            .prev_uploaded_mutable_texture
            .filter(|&key| textures.get(key).is_some_and(|texture| !texture.is_immutable()));

        let Some(prev) = prev else {
            self.prev_uploaded_mutable_texture = Some(new_texture);
            return Ok(());
        };

        if prev == new_texture {
            return Ok(());
        }

        if let Some(texture) = textures.get_mut(prev) {
            if texture.is_mutable_texture_consistently_specified_for_flush() {
                texture.ensure_full_mip_chain_initialized()?;
                self.mutable_textures_uploaded += 1;
                log::trace!("Materialized full mip chain of {:?}", prev);
            }
        }

        self.prev_uploaded_mutable_texture = Some(new_texture);
        Ok(())
    }

    /// Forget `texture` if it is the tracked one
    pub fn on_texture_release(&mut self, texture: TextureKey) {
        if self.prev_uploaded_mutable_texture == Some(texture) {
            self.reset_prev_texture();
        }
    }

    /// Forget the tracked texture
    pub fn reset_prev_texture(&mut self) {
        self.prev_uploaded_mutable_texture = None;
    }

    /// Currently tracked texture
    pub fn prev_texture(&self) -> Option<TextureKey> {
        self.prev_uploaded_mutable_texture
    }

    /// Number of full mip chains materialized so far
    pub fn mutable_textures_uploaded(&self) -> u64 {
        self.mutable_textures_uploaded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelDesc {
    format: vk::Format,
    extent: [u32; 3],
}

/// Per-level specification history of a mutable texture
///
/// A texture is consistently specified when its base level and every level
/// up to the highest specified one exist, all share the base format, and
/// each level has exactly the halved extent of the one before it.
#[derive(Debug, Clone, Default)]
pub struct MipLevelSpecification {
    levels: Vec<Option<LevelDesc>>,
}

impl MipLevelSpecification {
    /// Levels beyond this cannot exist for any 32-bit extent
    pub const MAX_LEVELS: u32 = u32::BITS;

    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `level` was (re)specified
    ///
    /// Levels at or past [`Self::MAX_LEVELS`] are ignored.
    pub fn specify_level(&mut self, level: u32, format: vk::Format, extent: vk::Extent3D) {
        if level >= Self::MAX_LEVELS {
            log::debug!("Ignoring specification of out-of-range mip level {}", level);
            return;
        }
        let level = level as usize;
        if self.levels.len() <= level {
            self.levels.resize(level + 1, None);
        }
        self.levels[level] = Some(LevelDesc {
            format,
            extent: [extent.width, extent.height, extent.depth],
        });
    }

    /// Number of levels up to the highest one specified
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Whether the levels form a consistent chain
    pub fn is_consistently_specified(&self) -> bool {
        let Some(Some(base)) = self.levels.first().copied() else {
            return false;
        };
        let largest = base.extent.iter().copied().max().unwrap_or(0);
        if largest == 0 {
            return false;
        }
        let full_chain_length = (u32::BITS - largest.leading_zeros()) as usize;
        if self.levels.len() > full_chain_length {
            return false;
        }

        self.levels.iter().copied().enumerate().all(|(level, desc)| {
            desc.is_some_and(|desc| {
                desc.format == base.format
                    && desc
                        .extent
                        .iter()
                        .zip(base.extent)
                        .all(|(&size, base_size)| size == (base_size >> level).max(1))
            })
        })
    }
}
