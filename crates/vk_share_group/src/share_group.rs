//! Share group aggregate
//!
//! A [`ShareGroup`] is the state every context of one sharing group has in
//! common: the unified submission priority, the default buffer pools, the
//! descriptor update batch, the mutable texture upload tracker, and the
//! monolithic pipeline job slot. It does no locking of its own; callers
//! serialize access on the submission thread.

use std::sync::Arc;

use ash::vk;

use crate::backend::device::DescriptorSetUpdater;
use crate::backend::error::{VulkanError, VulkanResult};
use crate::backend::render_pass::RenderPassCache;
use crate::backend::renderer::Renderer;
use crate::config::{Config, ConfigError};
use crate::core::config::ShareGroupConfig;
use crate::foundation::collections::{ContextKey, SlotMap, TextureKey};
use crate::foundation::time::{Clock, SystemClock};
use crate::rendering::pipeline_scheduler::{MonolithicPipelineScheduler, WaitablePipelineCreationTask};
use crate::rendering::worker_pool::WorkerPool;
use crate::resources::buffer_pool::BufferSuballocation;
use crate::resources::descriptor_set::UpdateDescriptorSetsBuilder;
use crate::resources::pool_manager::{BufferUsageType, DefaultBufferPools};
use crate::resources::texture_upload::{MutableTexture, TextureUploadTracker};
use crate::state::priority::{ContextInfo, ContextPriority, ContextPriorityState};

/// State shared by all contexts of one group
pub struct ShareGroup {
    contexts: SlotMap<ContextKey, ContextInfo>,
    contexts_priority: ContextPriorityState,
    default_buffer_pools: DefaultBufferPools,
    update_descriptor_sets_builder: UpdateDescriptorSetsBuilder,
    texture_upload_tracker: TextureUploadTracker,
    pipeline_scheduler: MonolithicPipelineScheduler,
    orphan_non_empty_buffer_blocks: bool,
}

impl ShareGroup {
    /// Create an empty group driven by `clock`
    pub fn new(config: ShareGroupConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            contexts: SlotMap::with_key(),
            contexts_priority: ContextPriorityState::new(),
            default_buffer_pools: DefaultBufferPools::new(config.buffer_pool, Arc::clone(&clock)),
            update_descriptor_sets_builder: UpdateDescriptorSetsBuilder::new(&config.descriptor_updates),
            texture_upload_tracker: TextureUploadTracker::new(),
            pipeline_scheduler: MonolithicPipelineScheduler::new(config.pipeline_jobs, clock),
            orphan_non_empty_buffer_blocks: false,
        })
    }

    /// Create an empty group driven by wall-clock time
    pub fn with_system_clock(config: ShareGroupConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(SystemClock::new()))
    }

    // Contexts and priority

    /// Join a context to the group
    ///
    /// The context's priority is unified with the group first; its stored
    /// priority is the group priority on return.
    pub fn add_context(&mut self, renderer: &dyn Renderer, info: ContextInfo) -> VulkanResult<ContextKey> {
        let mut info = info;
        self.contexts_priority
            .unify(renderer, &mut self.contexts, &mut info)?;

        if info.has_display_texture_share_group {
            // Blocks may still back textures shared with other groups.
            self.orphan_non_empty_buffer_blocks = true;
        }

        let key = self.contexts.insert(info);
        log::debug!("Context {:?} joined share group at {:?}", key, info.priority);
        Ok(key)
    }

    /// Detach a context, returning its last known state
    pub fn remove_context(&mut self, key: ContextKey) -> Option<ContextInfo> {
        self.contexts.remove(key)
    }

    /// Whether no context belongs to the group
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Number of member contexts
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Current priority of a member
    pub fn context_priority(&self, key: ContextKey) -> Option<ContextPriority> {
        self.contexts.get(key).map(|info| info.priority)
    }

    /// Unified group priority, once a context has joined
    pub fn contexts_priority(&self) -> Option<ContextPriority> {
        self.contexts_priority.priority()
    }

    /// Whether the group is pinned to the default priority
    pub fn is_contexts_priority_locked(&self) -> bool {
        self.contexts_priority.is_locked()
    }

    /// Pin the group to the default priority on behalf of `caller`
    pub fn lock_default_contexts_priority(&mut self, renderer: &dyn Renderer, caller: ContextKey) -> VulkanResult<()> {
        let protection = self
            .contexts
            .get(caller)
            .map(|info| info.protection)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("context {caller:?} is not a member of this share group"),
            })?;

        self.contexts_priority
            .lock_default(renderer, &mut self.contexts, protection)
    }

    // Buffer pools

    /// Default buffer pools of the group
    pub fn default_buffer_pools(&self) -> &DefaultBufferPools {
        &self.default_buffer_pools
    }

    /// Suballocate from the default pool serving the request
    pub fn allocate_buffer(
        &mut self,
        renderer: &dyn Renderer,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
        memory_type_index: u32,
        usage: BufferUsageType,
    ) -> VulkanResult<BufferSuballocation> {
        self.default_buffer_pools
            .allocate(renderer, size, alignment, memory_type_index, usage)
    }

    /// Return a suballocation made by [`ShareGroup::allocate_buffer`]
    pub fn free_buffer(&mut self, suballocation: BufferSuballocation) -> VulkanResult<()> {
        self.default_buffer_pools.free_suballocation(suballocation)
    }

    /// Prune empty pool blocks if the heuristic says so
    ///
    /// Returns whether a prune ran.
    pub fn prune_default_buffer_pools(&mut self, renderer: &dyn Renderer) -> bool {
        if !self.default_buffer_pools.is_due_for_prune() {
            return false;
        }
        self.default_buffer_pools.prune_empty_buffers(renderer);
        true
    }

    /// Whether pool blocks still in use are leaked instead of freed on destroy
    pub fn orphans_non_empty_buffer_blocks(&self) -> bool {
        self.orphan_non_empty_buffer_blocks
    }

    // Descriptor updates

    /// Builder collecting this batch's descriptor writes
    pub fn update_descriptor_sets_builder(&mut self) -> &mut UpdateDescriptorSetsBuilder {
        &mut self.update_descriptor_sets_builder
    }

    /// Submit every recorded descriptor write in one device call
    pub fn flush_descriptor_set_updates(&mut self, device: &dyn DescriptorSetUpdater) -> VulkanResult<u32> {
        self.update_descriptor_sets_builder
            .flush_descriptor_set_updates(device)
    }

    // Textures

    /// Record an upload to a mutable texture
    pub fn on_mutable_texture_upload<T: MutableTexture>(
        &mut self,
        textures: &mut SlotMap<TextureKey, T>,
        texture: TextureKey,
    ) -> VulkanResult<()> {
        self.texture_upload_tracker
            .on_mutable_texture_upload(textures, texture)
    }

    /// Notification that `texture` is being destroyed
    pub fn on_texture_release(&mut self, texture: TextureKey) {
        self.texture_upload_tracker.on_texture_release(texture);
    }

    /// Mutable texture upload tracker of the group
    pub fn texture_upload_tracker(&self) -> &TextureUploadTracker {
        &self.texture_upload_tracker
    }

    // Pipelines

    /// Try to post a monolithic pipeline creation task
    ///
    /// See [`MonolithicPipelineScheduler::schedule`].
    pub fn schedule_monolithic_pipeline_creation_task(
        &mut self,
        render_pass_cache: &mut dyn RenderPassCache,
        pool: &dyn WorkerPool,
        task: &mut WaitablePipelineCreationTask,
    ) -> VulkanResult<bool> {
        self.pipeline_scheduler
            .schedule(render_pass_cache, pool, task)
    }

    /// Block until the outstanding pipeline job, if any, has finished
    pub fn wait_for_current_monolithic_pipeline_creation_task(&self) {
        self.pipeline_scheduler.wait();
    }

    /// Pipeline job scheduler of the group
    pub fn pipeline_scheduler(&self) -> &MonolithicPipelineScheduler {
        &self.pipeline_scheduler
    }

    /// Release everything the group holds on the renderer
    ///
    /// Returns the number of orphaned buffer blocks.
    pub fn on_destroy(&mut self, renderer: &dyn Renderer) -> usize {
        if !self.contexts.is_empty() {
            log::warn!("Destroying share group with {} live contexts", self.contexts.len());
        }

        self.wait_for_current_monolithic_pipeline_creation_task();

        let orphaned = self
            .default_buffer_pools
            .destroy(renderer, self.orphan_non_empty_buffer_blocks);
        if orphaned > 0 {
            log::info!("Orphaned {} non-empty buffer blocks", orphaned);
        }

        self.texture_upload_tracker.reset_prev_texture();
        orphaned
    }
}
