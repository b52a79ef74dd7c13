//! General algorithm
//!
//! Free space is kept as an offset-ordered map of disjoint ranges. Allocation
//! picks the smallest range that fits the aligned request (best fit, lowest
//! offset on ties) and splits off the leading padding and the trailing
//! remainder. Freeing reinserts the range and merges it with adjacent free
//! neighbours.

use std::collections::BTreeMap;

use ash::vk;

use super::{align_up, VirtualAllocation};

/// Virtual block using best-fit free ranges
#[derive(Debug)]
pub struct GeneralBlock {
    size: vk::DeviceSize,
    free_size: vk::DeviceSize,
    allocation_count: usize,
    // offset -> length
    free_ranges: BTreeMap<vk::DeviceSize, vk::DeviceSize>,
}

impl GeneralBlock {
    /// Create a block covering `size` bytes
    pub fn new(size: vk::DeviceSize) -> Self {
        let mut free_ranges = BTreeMap::new();
        if size > 0 {
            free_ranges.insert(0, size);
        }
        Self {
            size,
            free_size: size,
            allocation_count: 0,
            free_ranges,
        }
    }

    /// Carve out `size` bytes at `alignment`
    pub fn allocate(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<VirtualAllocation> {
        let size = size.max(1);
        let alignment = alignment.max(1);

        let (range_offset, range_size, aligned) = self
            .free_ranges
            .iter()
            .filter_map(|(&offset, &length)| {
                let aligned = align_up(offset, alignment);
                let end = aligned.checked_add(size)?;
                (end <= offset + length).then_some((offset, length, aligned))
            })
            .min_by_key(|&(offset, length, _)| (length, offset))?;

        self.free_ranges.remove(&range_offset);
        if aligned > range_offset {
            self.free_ranges.insert(range_offset, aligned - range_offset);
        }
        let end = aligned + size;
        let range_end = range_offset + range_size;
        if end < range_end {
            self.free_ranges.insert(end, range_end - end);
        }

        self.free_size -= size;
        self.allocation_count += 1;

        Some(VirtualAllocation {
            offset: aligned,
            size,
            handle: 0,
        })
    }

    /// Return a range and merge it with free neighbours
    pub fn free(&mut self, allocation: &VirtualAllocation) {
        let mut offset = allocation.offset;
        let mut length = allocation.size.max(1);

        if let Some((&prev_offset, &prev_length)) = self.free_ranges.range(..offset).next_back() {
            debug_assert!(prev_offset + prev_length <= offset, "free range overlaps {offset}");
            if prev_offset + prev_length == offset {
                self.free_ranges.remove(&prev_offset);
                offset = prev_offset;
                length += prev_length;
            }
        }

        let end = offset + length;
        if let Some(next_length) = self.free_ranges.remove(&end) {
            length += next_length;
        }
        debug_assert!(
            self.free_ranges.range(offset..offset + length).next().is_none(),
            "double free at {}",
            allocation.offset
        );

        self.free_ranges.insert(offset, length);
        self.free_size += allocation.size.max(1);
        self.allocation_count -= 1;
    }

    /// Total block size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Bytes not covered by any live allocation
    pub fn free_size(&self) -> vk::DeviceSize {
        self.free_size
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of disjoint free ranges
    pub fn free_range_count(&self) -> usize {
        self.free_ranges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_sizes_no_rounding() {
        let mut block = GeneralBlock::new(1000);
        let allocation = block.allocate(300, 1).unwrap();
        assert_eq!(allocation.offset, 0);
        assert_eq!(block.free_size(), 700);
    }

    #[test]
    fn test_best_fit_prefers_smallest_hole() {
        let mut block = GeneralBlock::new(1000);
        let a = block.allocate(100, 1).unwrap();
        let _b = block.allocate(50, 1).unwrap();
        let c = block.allocate(30, 1).unwrap();
        let _d = block.allocate(100, 1).unwrap();

        // Holes: [0, 100) and [150, 180) plus the tail at 280.
        block.free(&a);
        block.free(&c);

        let fit = block.allocate(25, 1).unwrap();
        assert_eq!(fit.offset, 150);
    }

    #[test]
    fn test_alignment_padding_stays_free() {
        let mut block = GeneralBlock::new(1024);
        block.allocate(10, 1).unwrap();
        let aligned = block.allocate(64, 64).unwrap();

        assert_eq!(aligned.offset, 64);
        assert_eq!(block.free_size(), 1024 - 10 - 64);
        // Padding [10, 64) is usable by an unaligned request.
        assert_eq!(block.allocate(20, 1).unwrap().offset, 10);
    }

    #[test]
    fn test_coalesces_back_to_one_range() {
        let mut block = GeneralBlock::new(512);
        let allocations: Vec<_> = (0..4).map(|_| block.allocate(100, 1).unwrap()).collect();

        block.free(&allocations[1]);
        block.free(&allocations[3]);
        block.free(&allocations[0]);
        block.free(&allocations[2]);

        assert_eq!(block.allocation_count(), 0);
        assert_eq!(block.free_range_count(), 1);
        assert_eq!(block.free_size(), 512);
    }

    #[test]
    fn test_too_large() {
        let mut block = GeneralBlock::new(128);
        assert!(block.allocate(129, 1).is_none());
        assert!(block.allocate(100, 64).is_some());
        assert!(block.allocate(64, 64).is_none());
    }
}
