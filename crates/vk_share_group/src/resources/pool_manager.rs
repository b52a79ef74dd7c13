//! Default buffer pool manager
//!
//! A share group owns one lazily created [`BufferPool`] per (algorithm,
//! memory type) pair. The algorithm is picked per request: small requests go
//! to the buddy pools, where rounding to a power of two wastes little, and
//! everything else to the general pools. Dynamic usage relaxes the buddy
//! threshold since allocation speed matters more there.
//!
//! Pruning is per share group: the "freed bytes" half of the prune heuristic
//! only counts suballocations returned to this group's pools.

use std::sync::Arc;

use ash::vk;

use crate::backend::error::{VulkanError, VulkanResult};
use crate::backend::renderer::Renderer;
use crate::core::config::BufferPoolConfig;
use crate::foundation::time::{Clock, Stopwatch};
use crate::resources::buffer_pool::{BufferPool, BufferSuballocation, PoolKey};
use crate::resources::suballocator::SuballocationAlgorithm;

/// How often the contents of a buffer change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsageType {
    /// Written once, read many times
    Static,
    /// Rewritten frequently
    Dynamic,
}

/// Per-(algorithm, memory type) buffer pools of one share group
pub struct DefaultBufferPools {
    config: BufferPoolConfig,
    clock: Arc<dyn Clock>,
    // Indexed by [algorithm][memory type].
    pools: [Vec<Option<BufferPool>>; 2],
    last_prune: Stopwatch,
    prune_count: u64,
}

impl DefaultBufferPools {
    /// Create a manager with no pools
    pub fn new(config: BufferPoolConfig, clock: Arc<dyn Clock>) -> Self {
        let last_prune = Stopwatch::start(clock.as_ref());
        Self {
            config,
            clock,
            pools: std::array::from_fn(|_| {
                std::iter::repeat_with(|| None).take(vk::MAX_MEMORY_TYPES).collect()
            }),
            last_prune,
            prune_count: 0,
        }
    }

    /// Algorithm a request of `size` bytes with `usage` is served by
    pub fn select_algorithm(&self, size: vk::DeviceSize, usage: BufferUsageType) -> SuballocationAlgorithm {
        if size <= self.config.buddy_size_limit(usage) {
            SuballocationAlgorithm::Buddy
        } else {
            SuballocationAlgorithm::General
        }
    }

    /// Pool serving a request, created on first use
    pub fn get_or_create_pool(
        &mut self,
        renderer: &dyn Renderer,
        size: vk::DeviceSize,
        memory_type_index: u32,
        usage: BufferUsageType,
    ) -> VulkanResult<&mut BufferPool> {
        let algorithm = self.select_algorithm(size, usage);
        let block_size = self.config.block_size;

        let slot = self.pools[algorithm.index()]
            .get_mut(memory_type_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("memory type index {memory_type_index} out of range"),
            })?;

        Ok(slot.get_or_insert_with(|| {
            log::debug!("Creating {:?} buffer pool for memory type {}", algorithm, memory_type_index);
            BufferPool::new(
                PoolKey { algorithm, memory_type_index },
                renderer.default_buffer_usage_flags(),
                renderer.memory_type_properties(memory_type_index),
                block_size,
            )
        }))
    }

    /// Suballocate from the pool serving the request
    pub fn allocate(
        &mut self,
        renderer: &dyn Renderer,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
        memory_type_index: u32,
        usage: BufferUsageType,
    ) -> VulkanResult<BufferSuballocation> {
        self.get_or_create_pool(renderer, size, memory_type_index, usage)?
            .allocate(renderer, size, alignment)
    }

    /// Return a suballocation to the pool that produced it
    pub fn free_suballocation(&mut self, suballocation: BufferSuballocation) -> VulkanResult<()> {
        let key = suballocation.pool();
        match self.pool_mut(key.algorithm, key.memory_type_index) {
            Some(pool) => pool.free(suballocation),
            None => Err(VulkanError::InvalidOperation {
                reason: format!("no pool for {key:?}"),
            }),
        }
    }

    /// Existing pool for a pair, if it was ever created
    pub fn pool(&self, algorithm: SuballocationAlgorithm, memory_type_index: u32) -> Option<&BufferPool> {
        self.pools[algorithm.index()]
            .get(memory_type_index as usize)
            .and_then(Option::as_ref)
    }

    fn pool_mut(&mut self, algorithm: SuballocationAlgorithm, memory_type_index: u32) -> Option<&mut BufferPool> {
        self.pools[algorithm.index()]
            .get_mut(memory_type_index as usize)
            .and_then(Option::as_mut)
    }

    fn iter(&self) -> impl Iterator<Item = &BufferPool> {
        self.pools.iter().flatten().flatten()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut BufferPool> {
        self.pools.iter_mut().flatten().flatten()
    }

    /// Bytes returned to any pool of this group since the last prune
    pub fn destroyed_size_since_prune(&self) -> vk::DeviceSize {
        self.iter().map(BufferPool::freed_since_prune).sum()
    }

    /// Whether a prune should run now
    ///
    /// Prunes happen periodically to keep the heuristic fresh, and early when
    /// a lot of memory was freed so it is returned as soon as possible.
    pub fn is_due_for_prune(&self) -> bool {
        if self.last_prune.elapsed(self.clock.as_ref()) > self.config.prune_interval() {
            return true;
        }
        self.destroyed_size_since_prune() >= self.config.max_total_empty_buffer_bytes
    }

    /// Release empty blocks from every pool
    ///
    /// Does nothing beyond restarting the prune timer when no suballocation
    /// was freed since the last prune.
    pub fn prune_empty_buffers(&mut self, renderer: &dyn Renderer) {
        self.last_prune.reset(self.clock.as_ref());

        if self.destroyed_size_since_prune() == 0 {
            return;
        }

        let released: vk::DeviceSize = self
            .iter_mut()
            .map(|pool| pool.prune_empty_buffers(renderer))
            .sum();
        self.prune_count += 1;

        log::debug!("Pruned {} bytes of empty buffer blocks", released);
        renderer.on_buffer_pool_prune(released);

        if self.config.log_stats_on_prune {
            self.log_buffer_pools();
        }
    }

    /// Number of prunes that scanned the pools
    pub fn prune_count(&self) -> u64 {
        self.prune_count
    }

    /// Release every pool
    ///
    /// See [`BufferPool::destroy`] for `orphan_non_empty`. Returns the total
    /// number of orphaned blocks.
    pub fn destroy(&mut self, renderer: &dyn Renderer, orphan_non_empty: bool) -> usize {
        let mut orphaned = 0;
        for slot in self.pools.iter_mut().flatten() {
            if let Some(mut pool) = slot.take() {
                orphaned += pool.destroy(renderer, orphan_non_empty);
            }
        }
        orphaned
    }

    /// Total (block count, memory size) across every pool
    pub fn calculate_total_buffer_count(&self) -> (usize, vk::DeviceSize) {
        self.iter().fold((0, 0), |(count, size), pool| {
            (count + pool.buffer_count(), size + pool.memory_size())
        })
    }

    /// Log block totals and one line per non-empty pool
    pub fn log_buffer_pools(&self) {
        let (total_buffer_count, total_memory_size) = self.calculate_total_buffer_count();
        log::info!(
            "BufferBlocks count: {} memorySize: {} KB, unused/memorySize per pool:",
            total_buffer_count,
            total_memory_size / 1024
        );
        for pool in self.iter().filter(|pool| pool.buffer_count() > 0) {
            let mut line = String::new();
            pool.add_stats(&mut line);
            log::info!("\t{}", line);
        }
    }
}
