//! Buffer pools
//!
//! A pool owns every backing block of one (algorithm, memory type) pair.
//! Each block is a renderer-created buffer with bound memory plus a virtual
//! block tracking which ranges of it are handed out.

use std::fmt::Write as _;

use ash::vk;

use crate::backend::error::{VulkanError, VulkanResult};
use crate::backend::renderer::{BufferBlockRequest, DeviceBufferBlock, Renderer};
use crate::foundation::collections::{BlockKey, SlotMap};
use crate::resources::suballocator::{BuddyBlock, SuballocationAlgorithm, VirtualAllocation, VirtualBlock};

/// Identifies the pool a suballocation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Suballocation algorithm of the pool
    pub algorithm: SuballocationAlgorithm,
    /// Memory type every block of the pool is allocated from
    pub memory_type_index: u32,
}

/// A range of a pool block handed out to a caller
///
/// Not `Clone`: a suballocation is returned to its pool exactly
/// once.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferSuballocation {
    pool: PoolKey,
    block: BlockKey,
    buffer: vk::Buffer,
    allocation: VirtualAllocation,
}

impl BufferSuballocation {
    /// Pool that owns this range
    pub fn pool(&self) -> PoolKey {
        self.pool
    }

    /// Buffer the range lives in
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Offset of the range inside [`BufferSuballocation::buffer`]
    pub fn offset(&self) -> vk::DeviceSize {
        self.allocation.offset
    }

    /// Requested size of the range
    pub fn size(&self) -> vk::DeviceSize {
        self.allocation.size
    }
}

/// One backing block of a pool
#[derive(Debug)]
struct BufferBlock {
    device: DeviceBufferBlock,
    virtual_block: VirtualBlock,
}

impl BufferBlock {
    fn is_empty(&self) -> bool {
        self.virtual_block.is_empty()
    }
}

/// Arena of same-algorithm, same-memory-type buffer blocks
#[derive(Debug)]
pub struct BufferPool {
    key: PoolKey,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
    block_size: vk::DeviceSize,
    blocks: SlotMap<BlockKey, BufferBlock>,
    total_allocated_bytes: vk::DeviceSize,
    total_freed_bytes: vk::DeviceSize,
    freed_since_prune: vk::DeviceSize,
    orphaned_blocks: usize,
}

impl BufferPool {
    /// Create an empty pool; blocks are created on demand
    pub fn new(
        key: PoolKey,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
        block_size: vk::DeviceSize,
    ) -> Self {
        Self {
            key,
            usage,
            memory_properties,
            block_size,
            blocks: SlotMap::with_key(),
            total_allocated_bytes: 0,
            total_freed_bytes: 0,
            freed_since_prune: 0,
            orphaned_blocks: 0,
        }
    }

    /// The (algorithm, memory type) pair this pool serves
    pub fn key(&self) -> PoolKey {
        self.key
    }

    /// Suballocation algorithm used by every block
    pub fn algorithm(&self) -> SuballocationAlgorithm {
        self.key.algorithm
    }

    /// Memory type every block is allocated from
    pub fn memory_type_index(&self) -> u32 {
        self.key.memory_type_index
    }

    /// Property flags of the pool's memory type
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_properties
    }

    /// Suballocate `size` bytes at `alignment`, creating a block if needed
    pub fn allocate(
        &mut self,
        renderer: &dyn Renderer,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
    ) -> VulkanResult<BufferSuballocation> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "zero-sized suballocation".to_string(),
            });
        }
        if !alignment.is_power_of_two() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("alignment {alignment} is not a power of two"),
            });
        }

        let existing = self.blocks.iter_mut().find_map(|(block_key, block)| {
            block
                .virtual_block
                .allocate(size, alignment)
                .map(|allocation| (block_key, block.device.buffer, allocation))
        });

        let (block_key, buffer, allocation) = match existing {
            Some(found) => found,
            None => {
                let block_key = self.create_block(renderer, size, alignment)?;
                let block = &mut self.blocks[block_key];
                let allocation = block
                    .virtual_block
                    .allocate(size, alignment)
                    .ok_or(VulkanError::OutOfMemory { requested: size })?;
                (block_key, block.device.buffer, allocation)
            }
        };

        self.total_allocated_bytes += size;
        Ok(BufferSuballocation {
            pool: self.key,
            block: block_key,
            buffer,
            allocation,
        })
    }

    fn create_block(
        &mut self,
        renderer: &dyn Renderer,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
    ) -> VulkanResult<BlockKey> {
        let needed = size.max(alignment).max(self.block_size);
        let block_size = match self.key.algorithm {
            SuballocationAlgorithm::Buddy => needed
                .max(BuddyBlock::MIN_NODE_SIZE)
                .checked_next_power_of_two()
                .ok_or(VulkanError::OutOfMemory { requested: size })?,
            SuballocationAlgorithm::General => needed,
        };

        let request = BufferBlockRequest {
            size: block_size,
            memory_type_index: self.key.memory_type_index,
            usage: self.usage,
            memory_properties: self.memory_properties,
        };
        let device = renderer.allocate_buffer_block(&request)?;

        log::debug!(
            "Created {:?} buffer block of {} bytes for memory type {} ({} blocks)",
            self.key.algorithm,
            block_size,
            self.key.memory_type_index,
            self.blocks.len() + 1
        );

        Ok(self.blocks.insert(BufferBlock {
            device,
            virtual_block: VirtualBlock::new(self.key.algorithm, block_size),
        }))
    }

    /// Return a suballocation to this pool
    pub fn free(&mut self, suballocation: BufferSuballocation) -> VulkanResult<()> {
        if suballocation.pool != self.key {
            return Err(VulkanError::InvalidOperation {
                reason: format!("suballocation from {:?} freed into {:?}", suballocation.pool, self.key),
            });
        }
        let block = self.blocks.get_mut(suballocation.block).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "suballocation refers to a released block".to_string(),
        })?;

        block.virtual_block.free(&suballocation.allocation);
        self.total_freed_bytes += suballocation.allocation.size;
        self.freed_since_prune += suballocation.allocation.size;
        Ok(())
    }

    /// Release every block with no live suballocation
    ///
    /// Returns the number of bytes handed back to the renderer.
    pub fn prune_empty_buffers(&mut self, renderer: &dyn Renderer) -> vk::DeviceSize {
        let empty: Vec<BlockKey> = self
            .blocks
            .iter()
            .filter(|(_, block)| block.is_empty())
            .map(|(block_key, _)| block_key)
            .collect();

        let mut released = 0;
        for block_key in empty {
            if let Some(block) = self.blocks.remove(block_key) {
                released += block.device.size;
                renderer.free_buffer_block(block.device);
            }
        }

        self.freed_since_prune = 0;
        released
    }

    /// Release every block
    ///
    /// With `orphan_non_empty`, blocks that still hold live suballocations are
    /// left alive instead of freed: a context in another share group may still
    /// have GPU work referencing them. Returns the number of orphaned blocks.
    pub fn destroy(&mut self, renderer: &dyn Renderer, orphan_non_empty: bool) -> usize {
        let mut orphaned = 0;
        for (_, block) in self.blocks.drain() {
            if block.is_empty() {
                renderer.free_buffer_block(block.device);
            } else if orphan_non_empty {
                log::warn!(
                    "Orphaning {:?} buffer block {:?} with {} live suballocations",
                    self.key.algorithm,
                    block.device.buffer,
                    block.virtual_block.allocation_count()
                );
                orphaned += 1;
            } else {
                log::warn!(
                    "Destroying {:?} buffer block {:?} with {} live suballocations",
                    self.key.algorithm,
                    block.device.buffer,
                    block.virtual_block.allocation_count()
                );
                renderer.free_buffer_block(block.device);
            }
        }
        self.orphaned_blocks += orphaned;
        orphaned
    }

    /// Whether the pool currently owns no block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of backing blocks
    pub fn buffer_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total size of all backing blocks
    pub fn memory_size(&self) -> vk::DeviceSize {
        self.blocks.values().map(|block| block.device.size).sum()
    }

    /// Bytes of backing memory not covered by a live suballocation
    pub fn unused_bytes(&self) -> vk::DeviceSize {
        self.blocks.values().map(|block| block.virtual_block.free_size()).sum()
    }

    /// Number of live suballocations across all blocks
    pub fn allocation_count(&self) -> usize {
        self.blocks.values().map(|block| block.virtual_block.allocation_count()).sum()
    }

    /// Bytes ever suballocated from this pool
    pub fn total_allocated_bytes(&self) -> vk::DeviceSize {
        self.total_allocated_bytes
    }

    /// Bytes ever returned to this pool
    pub fn total_freed_bytes(&self) -> vk::DeviceSize {
        self.total_freed_bytes
    }

    /// Bytes returned since the last prune
    pub fn freed_since_prune(&self) -> vk::DeviceSize {
        self.freed_since_prune
    }

    /// Blocks leaked by [`BufferPool::destroy`]
    pub fn orphaned_blocks(&self) -> usize {
        self.orphaned_blocks
    }

    /// Append a one-line summary of the pool
    pub fn add_stats(&self, out: &mut String) {
        let _ = write!(
            out,
            "{:?} memory type {}: {} blocks, {}/{} KB unused",
            self.key.algorithm,
            self.key.memory_type_index,
            self.buffer_count(),
            self.unused_bytes() / 1024,
            self.memory_size() / 1024
        );
    }
}
