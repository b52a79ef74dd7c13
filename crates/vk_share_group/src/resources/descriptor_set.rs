//! Batched descriptor set updates
//!
//! Draw-time code records descriptor writes into an
//! [`UpdateDescriptorSetsBuilder`] and the whole batch reaches the driver in
//! one `vkUpdateDescriptorSets` call at flush time.
//!
//! Writes never hold pointers into the info arrays. They name a range of an
//! array by offset, and the range is resolved only while flushing, when none
//! of the arrays can grow. Growing an array therefore never invalidates a
//! recorded write.

use ash::vk;

use crate::backend::device::DescriptorSetUpdater;
use crate::backend::error::{VulkanError, VulkanResult};
use crate::core::config::DescriptorUpdateConfig;

/// Which info array a pending write reads its descriptors from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorInfoRef {
    /// No info array (descriptor types carrying their data elsewhere)
    None,
    /// Offset into the buffer info array
    Buffer(usize),
    /// Offset into the image info array
    Image(usize),
    /// Offset into the texel buffer view array
    TexelBufferView(usize),
}

/// One descriptor write awaiting flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDescriptorWrite {
    /// Descriptor set being written
    pub dst_set: vk::DescriptorSet,
    /// Binding within the set
    pub dst_binding: u32,
    /// First array element written
    pub dst_array_element: u32,
    /// Number of descriptors written
    pub descriptor_count: u32,
    /// Type of every descriptor written
    pub descriptor_type: vk::DescriptorType,
    /// Source of the descriptor data
    pub info: DescriptorInfoRef,
}

impl Default for PendingDescriptorWrite {
    fn default() -> Self {
        Self {
            dst_set: vk::DescriptorSet::null(),
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_count: 0,
            descriptor_type: vk::DescriptorType::SAMPLER,
            info: DescriptorInfoRef::None,
        }
    }
}

impl PendingDescriptorWrite {
    /// Read `count` buffer infos starting at `offset`
    pub fn set_buffer_infos(&mut self, offset: usize, count: u32) {
        self.info = DescriptorInfoRef::Buffer(offset);
        self.descriptor_count = count;
    }

    /// Read `count` image infos starting at `offset`
    pub fn set_image_infos(&mut self, offset: usize, count: u32) {
        self.info = DescriptorInfoRef::Image(offset);
        self.descriptor_count = count;
    }

    /// Read `count` texel buffer views starting at `offset`
    pub fn set_texel_buffer_views(&mut self, offset: usize, count: u32) {
        self.info = DescriptorInfoRef::TexelBufferView(offset);
        self.descriptor_count = count;
    }
}

/// Accumulates descriptor writes for a single batched update
pub struct UpdateDescriptorSetsBuilder {
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_views: Vec<vk::BufferView>,
    writes: Vec<PendingDescriptorWrite>,
    growth_count: u32,
}

impl UpdateDescriptorSetsBuilder {
    /// Create a builder with the configured initial reservations
    pub fn new(config: &DescriptorUpdateConfig) -> Self {
        Self {
            buffer_infos: Vec::with_capacity(config.buffer_infos),
            image_infos: Vec::with_capacity(config.image_infos),
            buffer_views: Vec::with_capacity(config.buffer_views),
            writes: Vec::with_capacity(config.write_descriptor_sets),
            growth_count: 0,
        }
    }

    /// Reserve `count` buffer infos, returning their offset and storage
    ///
    /// The slice is only valid until the next call on this builder; keep the
    /// offset to refer to the records later. Fails with
    /// [`VulkanError::OutOfMemory`] when the array cannot grow.
    pub fn alloc_buffer_infos(&mut self, count: usize) -> VulkanResult<(usize, &mut [vk::DescriptorBufferInfo])> {
        alloc_infos(&mut self.buffer_infos, count, &mut self.growth_count)
    }

    /// Reserve `count` image infos, returning their offset and storage
    pub fn alloc_image_infos(&mut self, count: usize) -> VulkanResult<(usize, &mut [vk::DescriptorImageInfo])> {
        alloc_infos(&mut self.image_infos, count, &mut self.growth_count)
    }

    /// Reserve `count` texel buffer views, returning their offset and storage
    pub fn alloc_buffer_views(&mut self, count: usize) -> VulkanResult<(usize, &mut [vk::BufferView])> {
        alloc_infos(&mut self.buffer_views, count, &mut self.growth_count)
    }

    /// Append `count` default-initialized writes, returning their offset and storage
    pub fn alloc_write_descriptor_sets(
        &mut self,
        count: usize,
    ) -> VulkanResult<(usize, &mut [PendingDescriptorWrite])> {
        let offset = self.writes.len();
        self.writes
            .try_reserve(count)
            .map_err(|_| out_of_memory::<PendingDescriptorWrite>(count))?;
        self.writes.resize(offset + count, PendingDescriptorWrite::default());
        Ok((offset, &mut self.writes[offset..]))
    }

    /// Number of writes waiting for flush
    pub fn pending_write_count(&self) -> usize {
        self.writes.len()
    }

    /// Pending write at `index`
    pub fn write(&self, index: usize) -> Option<&PendingDescriptorWrite> {
        self.writes.get(index)
    }

    /// Recorded buffer infos
    pub fn buffer_infos(&self) -> &[vk::DescriptorBufferInfo] {
        &self.buffer_infos
    }

    /// Recorded image infos
    pub fn image_infos(&self) -> &[vk::DescriptorImageInfo] {
        &self.image_infos
    }

    /// Recorded texel buffer views
    pub fn buffer_views(&self) -> &[vk::BufferView] {
        &self.buffer_views
    }

    /// Capacities of the (buffer info, image info, buffer view, write) arrays
    pub fn capacities(&self) -> (usize, usize, usize, usize) {
        (
            self.buffer_infos.capacity(),
            self.image_infos.capacity(),
            self.buffer_views.capacity(),
            self.writes.capacity(),
        )
    }

    /// Number of times an info array had to grow
    pub fn growth_count(&self) -> u32 {
        self.growth_count
    }

    /// Issue every pending write in one update call
    ///
    /// Returns the number of writes flushed, 0 without touching the device
    /// when nothing is pending. All arrays are cleared afterwards with their
    /// capacity retained. A write whose range falls outside its info array
    /// discards the whole batch and is reported as an invalid operation.
    pub fn flush_descriptor_set_updates(&mut self, device: &dyn DescriptorSetUpdater) -> VulkanResult<u32> {
        if self.writes.is_empty() {
            debug_assert!(self.buffer_infos.is_empty());
            debug_assert!(self.image_infos.is_empty());
            self.clear();
            return Ok(0);
        }

        let resolved: VulkanResult<Vec<vk::WriteDescriptorSet>> =
            self.writes.iter().map(|write| self.resolve(write)).collect();
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                self.clear();
                return Err(err);
            }
        };

        device.update_descriptor_sets(&resolved);
        let flushed = u32::try_from(resolved.len()).unwrap_or(u32::MAX);
        drop(resolved);

        log::trace!("Flushed {} descriptor writes", flushed);
        self.clear();
        Ok(flushed)
    }

    fn resolve(&self, write: &PendingDescriptorWrite) -> VulkanResult<vk::WriteDescriptorSet> {
        let builder = vk::WriteDescriptorSet::builder()
            .dst_set(write.dst_set)
            .dst_binding(write.dst_binding)
            .dst_array_element(write.dst_array_element)
            .descriptor_type(write.descriptor_type);
        let count = write.descriptor_count as usize;

        let resolved = match write.info {
            DescriptorInfoRef::Buffer(offset) => {
                builder.buffer_info(info_range(&self.buffer_infos, offset, count, "buffer info")?).build()
            }
            DescriptorInfoRef::Image(offset) => {
                builder.image_info(info_range(&self.image_infos, offset, count, "image info")?).build()
            }
            DescriptorInfoRef::TexelBufferView(offset) => builder
                .texel_buffer_view(info_range(&self.buffer_views, offset, count, "buffer view")?)
                .build(),
            DescriptorInfoRef::None => {
                let mut resolved = builder.build();
                resolved.descriptor_count = write.descriptor_count;
                resolved
            }
        };
        Ok(resolved)
    }

    fn clear(&mut self) {
        self.writes.clear();
        self.buffer_infos.clear();
        self.image_infos.clear();
        self.buffer_views.clear();
    }
}

fn info_range<'a, T>(infos: &'a [T], offset: usize, count: usize, what: &str) -> VulkanResult<&'a [T]> {
    offset
        .checked_add(count)
        .and_then(|end| infos.get(offset..end))
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("{what} range {offset}+{count} exceeds {} records", infos.len()),
        })
}

fn out_of_memory<T>(count: usize) -> VulkanError {
    let bytes = count.saturating_mul(std::mem::size_of::<T>());
    VulkanError::OutOfMemory {
        requested: u64::try_from(bytes).unwrap_or(u64::MAX),
    }
}

fn alloc_infos<'a, T: Default + Clone>(
    infos: &'a mut Vec<T>,
    count: usize,
    growth_count: &mut u32,
) -> VulkanResult<(usize, &'a mut [T])> {
    let offset = infos.len();
    let new_size = offset.checked_add(count).ok_or_else(|| out_of_memory::<T>(count))?;
    if new_size > infos.capacity() {
        let new_capacity = infos.capacity().saturating_mul(2).max(new_size);
        infos
            .try_reserve_exact(new_capacity - offset)
            .map_err(|_| out_of_memory::<T>(count))?;
        *growth_count += 1;
    }
    infos.resize(new_size, T::default());
    Ok((offset, &mut infos[offset..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::test_support::MockDescriptorUpdater;

    fn builder() -> UpdateDescriptorSetsBuilder {
        UpdateDescriptorSetsBuilder::new(&DescriptorUpdateConfig::default())
    }

    fn buffer(raw: u64) -> vk::Buffer {
        vk::Buffer::from_raw(raw)
    }

    fn record_uniform_write(builder: &mut UpdateDescriptorSetsBuilder, binding: u32, raw: u64) {
        let (offset, infos) = builder.alloc_buffer_infos(1).unwrap();
        infos[0] = vk::DescriptorBufferInfo {
            buffer: buffer(raw),
            offset: raw * 16,
            range: 64,
        };
        let (_, writes) = builder.alloc_write_descriptor_sets(1).unwrap();
        writes[0].dst_set = vk::DescriptorSet::from_raw(7);
        writes[0].dst_binding = binding;
        writes[0].descriptor_type = vk::DescriptorType::UNIFORM_BUFFER;
        writes[0].set_buffer_infos(offset, 1);
    }

    #[test]
    fn test_flush_counts_and_clears() {
        let device = MockDescriptorUpdater::new();
        let mut builder = builder();

        for binding in 0..5 {
            record_uniform_write(&mut builder, binding, u64::from(binding) + 1);
        }
        assert_eq!(builder.flush_descriptor_set_updates(&device).unwrap(), 5);
        assert_eq!(device.call_count(), 1);
        assert_eq!(device.calls()[0].len(), 5);

        assert_eq!(builder.flush_descriptor_set_updates(&device).unwrap(), 0);
        assert_eq!(device.call_count(), 1);
        assert_eq!(builder.pending_write_count(), 0);
        assert!(builder.buffer_infos().is_empty());
    }

    #[test]
    fn test_capacity_retained_after_flush() {
        let device = MockDescriptorUpdater::new();
        let mut builder = builder();

        builder.alloc_buffer_infos(20).unwrap();
        let (_, writes) = builder.alloc_write_descriptor_sets(1).unwrap();
        writes[0].descriptor_type = vk::DescriptorType::STORAGE_BUFFER;
        writes[0].set_buffer_infos(0, 20);
        let grown = builder.capacities();

        builder.flush_descriptor_set_updates(&device).unwrap();
        assert_eq!(builder.capacities(), grown);
    }

    #[test]
    fn test_growth_policy_doubles_or_fits() {
        let mut builder = builder();
        assert_eq!(builder.capacities().0, 8);

        builder.alloc_buffer_infos(8).unwrap();
        assert_eq!(builder.growth_count(), 0);

        builder.alloc_buffer_infos(1).unwrap();
        assert_eq!(builder.capacities().0, 16);

        builder.alloc_buffer_infos(40).unwrap();
        assert_eq!(builder.capacities().0, 49);
        assert_eq!(builder.growth_count(), 2);

        // Zero initial reservation still grows to the required size.
        builder.alloc_buffer_views(3).unwrap();
        assert_eq!(builder.capacities().2, 3);
    }

    #[test]
    fn test_recorded_data_survives_growth() {
        let device = MockDescriptorUpdater::new();
        let mut builder = builder();

        for binding in 0..6 {
            record_uniform_write(&mut builder, binding, u64::from(binding) + 1);
        }
        let (image_offset, images) = builder.alloc_image_infos(2).unwrap();
        images[0].image_view = vk::ImageView::from_raw(100);
        images[1].image_view = vk::ImageView::from_raw(101);
        let (_, writes) = builder.alloc_write_descriptor_sets(1).unwrap();
        writes[0].descriptor_type = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
        writes[0].set_image_infos(image_offset, 2);

        // Interleave allocations so every info array grows at least once.
        for binding in 6..30 {
            record_uniform_write(&mut builder, binding, u64::from(binding) + 1);
            builder.alloc_image_infos(1).unwrap();
        }
        let (view_offset, views) = builder.alloc_buffer_views(1).unwrap();
        views[0] = vk::BufferView::from_raw(55);
        let (_, writes) = builder.alloc_write_descriptor_sets(1).unwrap();
        writes[0].descriptor_type = vk::DescriptorType::UNIFORM_TEXEL_BUFFER;
        writes[0].set_texel_buffer_views(view_offset, 1);
        assert!(builder.growth_count() >= 3);

        assert_eq!(builder.flush_descriptor_set_updates(&device).unwrap(), 32);

        let flushed = &device.calls()[0];
        for (index, write) in flushed.iter().filter(|w| w.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER).enumerate() {
            let raw = index as u64 + 1;
            assert_eq!(write.dst_binding, index as u32);
            assert_eq!(write.buffer_infos, vec![(buffer(raw), raw * 16, 64)]);
        }
        let images = flushed
            .iter()
            .find(|w| w.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .unwrap();
        assert_eq!(
            images.image_views,
            vec![vk::ImageView::from_raw(100), vk::ImageView::from_raw(101)]
        );
        let texel = flushed.last().unwrap();
        assert_eq!(texel.texel_buffer_views, vec![vk::BufferView::from_raw(55)]);
    }

    #[test]
    fn test_unsatisfiable_growth_reports_out_of_memory() {
        let device = MockDescriptorUpdater::new();
        let mut builder = builder();
        record_uniform_write(&mut builder, 0, 1);

        let result = builder.alloc_buffer_infos(usize::MAX / 2);
        assert!(matches!(result, Err(VulkanError::OutOfMemory { .. })));
        assert!(matches!(
            builder.alloc_write_descriptor_sets(usize::MAX / 2),
            Err(VulkanError::OutOfMemory { .. })
        ));

        // Earlier records are untouched and still flush.
        assert_eq!(builder.buffer_infos().len(), 1);
        assert_eq!(builder.flush_descriptor_set_updates(&device).unwrap(), 1);
        assert_eq!(device.calls()[0][0].buffer_infos, vec![(buffer(1), 16, 64)]);
    }

    #[test]
    fn test_out_of_range_reference_discards_batch() {
        let device = MockDescriptorUpdater::new();
        let mut builder = builder();

        builder.alloc_buffer_infos(1).unwrap();
        let (_, writes) = builder.alloc_write_descriptor_sets(1).unwrap();
        writes[0].set_buffer_infos(0, 4);

        let result = builder.flush_descriptor_set_updates(&device);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(device.call_count(), 0);
        assert_eq!(builder.pending_write_count(), 0);
    }
}
