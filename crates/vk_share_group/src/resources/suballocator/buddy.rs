//! Buddy algorithm
//!
//! The region forms a binary tree of power-of-two nodes. The smallest node
//! is [`BuddyBlock::MIN_NODE_SIZE`] bytes and has order 0; the root covers
//! the whole region. Allocation takes the lowest-offset free node of the
//! smallest sufficient order, splitting larger nodes on the way down. Freeing
//! walks back up, merging a node with its buddy while the buddy is free.
//!
//! Nodes are aligned to their own size relative to the block start, so an
//! alignment request is satisfied by rounding the node up to it.

use ash::vk;

use super::VirtualAllocation;

/// Virtual block using the buddy algorithm
#[derive(Debug)]
pub struct BuddyBlock {
    size: vk::DeviceSize,
    free_size: vk::DeviceSize,
    allocation_count: usize,
    // One offset-sorted free list per order.
    free_lists: Vec<Vec<vk::DeviceSize>>,
}

impl BuddyBlock {
    /// Smallest node the tree is split into
    pub const MIN_NODE_SIZE: vk::DeviceSize = 16;

    /// Create a block covering `size` bytes
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two or is below
    /// [`BuddyBlock::MIN_NODE_SIZE`].
    pub fn new(size: vk::DeviceSize) -> Self {
        assert!(size.is_power_of_two(), "buddy block size {size} is not a power of two");
        assert!(size >= Self::MIN_NODE_SIZE);

        let max_order = (size / Self::MIN_NODE_SIZE).trailing_zeros() as usize;
        let mut free_lists = vec![Vec::new(); max_order + 1];
        free_lists[max_order].push(0);

        Self {
            size,
            free_size: size,
            allocation_count: 0,
            free_lists,
        }
    }

    fn max_order(&self) -> usize {
        self.free_lists.len() - 1
    }

    /// Carve out a node holding `size` bytes at `alignment`
    pub fn allocate(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<VirtualAllocation> {
        let node_size = size
            .max(alignment)
            .max(Self::MIN_NODE_SIZE)
            .checked_next_power_of_two()?;
        if node_size > self.size {
            return None;
        }
        let min_order = (node_size / Self::MIN_NODE_SIZE).trailing_zeros() as usize;

        let found_order = (min_order..=self.max_order()).find(|&order| !self.free_lists[order].is_empty())?;
        let offset = self.free_lists[found_order].remove(0);

        // Split from the found order down, keeping the left child each time.
        for order in (min_order..found_order).rev() {
            let right_child = offset + (Self::MIN_NODE_SIZE << order);
            let list = &mut self.free_lists[order];
            let (Ok(index) | Err(index)) = list.binary_search(&right_child);
            list.insert(index, right_child);
        }

        self.free_size -= node_size;
        self.allocation_count += 1;

        Some(VirtualAllocation {
            offset,
            size,
            handle: min_order as u32,
        })
    }

    /// Return a node, merging it with free buddies
    pub fn free(&mut self, allocation: &VirtualAllocation) {
        let min_order = allocation.handle as usize;
        let mut offset = allocation.offset;
        let max_order = self.max_order();
        debug_assert!(!self.free_lists[min_order].contains(&offset), "double free at {offset}");

        for order in min_order..=max_order {
            let node_size = Self::MIN_NODE_SIZE << order;
            let buddy = offset ^ node_size;
            let list = &mut self.free_lists[order];

            match list.binary_search(&buddy) {
                Ok(index) if order < max_order => {
                    list.remove(index);
                    offset = offset.min(buddy);
                }
                _ => {
                    let (Ok(index) | Err(index)) = list.binary_search(&offset);
                    list.insert(index, offset);
                    break;
                }
            }
        }

        self.free_size += Self::MIN_NODE_SIZE << min_order;
        self.allocation_count -= 1;
    }

    /// Total block size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Bytes in free nodes; internal fragmentation counts as used
    pub fn free_size(&self) -> vk::DeviceSize {
        self.free_size
    }

    /// Number of live nodes
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }
}
