//! Recording doubles for the collaborator traits
//!
//! None of them touch a GPU. Handles are fabricated from counters so tests
//! can compare them.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use ash::vk;
use ash::vk::Handle;

use crate::backend::device::DescriptorSetUpdater;
use crate::backend::error::{VulkanError, VulkanResult};
use crate::backend::render_pass::{RenderPassCache, RenderPassDesc};
use crate::backend::renderer::{BufferBlockRequest, DeviceBufferBlock, QueueSerialIndex, Renderer};
use crate::rendering::worker_pool::{Job, WaitableEvent, WorkerPool};
use crate::state::priority::{ContextPriority, ProtectionTypes};

/// One submitted priority dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityTransition {
    pub protection_types: ProtectionTypes,
    pub src: ContextPriority,
    pub dst: ContextPriority,
    pub index: QueueSerialIndex,
}

#[derive(Default)]
pub struct MockRenderer {
    next_serial: Cell<u32>,
    outstanding_serials: RefCell<HashSet<QueueSerialIndex>>,
    transitions: RefCell<Vec<PriorityTransition>>,
    fail_submission: Cell<Option<vk::Result>>,
    fail_block_allocation: Cell<Option<vk::Result>>,
    next_handle: Cell<u64>,
    live_blocks: RefCell<HashMap<vk::Buffer, DeviceBufferBlock>>,
    block_requests: RefCell<Vec<BufferBlockRequest>>,
    prune_notifications: RefCell<Vec<vk::DeviceSize>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority_transitions(&self) -> Vec<PriorityTransition> {
        self.transitions.borrow().clone()
    }

    pub fn outstanding_serial_indices(&self) -> usize {
        self.outstanding_serials.borrow().len()
    }

    pub fn fail_next_submission(&self, result: vk::Result) {
        self.fail_submission.set(Some(result));
    }

    pub fn fail_next_block_allocation(&self, result: vk::Result) {
        self.fail_block_allocation.set(Some(result));
    }

    pub fn live_block_count(&self) -> usize {
        self.live_blocks.borrow().len()
    }

    pub fn block_requests(&self) -> Vec<BufferBlockRequest> {
        self.block_requests.borrow().clone()
    }

    pub fn prune_notifications(&self) -> Vec<vk::DeviceSize> {
        self.prune_notifications.borrow().clone()
    }

    fn next_raw_handle(&self) -> u64 {
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        raw
    }
}

impl Renderer for MockRenderer {
    fn allocate_queue_serial_index(&self) -> VulkanResult<QueueSerialIndex> {
        let index = QueueSerialIndex(self.next_serial.get());
        self.next_serial.set(index.0 + 1);
        self.outstanding_serials.borrow_mut().insert(index);
        Ok(index)
    }

    fn release_queue_serial_index(&self, index: QueueSerialIndex) {
        assert!(self.outstanding_serials.borrow_mut().remove(&index), "released {index:?} twice");
    }

    fn submit_priority_dependency(
        &self,
        protection_types: ProtectionTypes,
        src_priority: ContextPriority,
        dst_priority: ContextPriority,
        index: QueueSerialIndex,
    ) -> VulkanResult<()> {
        assert!(
            self.outstanding_serials.borrow().contains(&index),
            "priority dependency submitted outside its ordering scope"
        );
        if let Some(result) = self.fail_submission.take() {
            return Err(VulkanError::from_vk(result));
        }
        self.transitions.borrow_mut().push(PriorityTransition {
            protection_types,
            src: src_priority,
            dst: dst_priority,
            index,
        });
        Ok(())
    }

    fn default_buffer_usage_flags(&self) -> vk::BufferUsageFlags {
        vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
    }

    fn memory_type_properties(&self, _memory_type_index: u32) -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    fn allocate_buffer_block(&self, request: &BufferBlockRequest) -> VulkanResult<DeviceBufferBlock> {
        self.block_requests.borrow_mut().push(*request);
        if let Some(result) = self.fail_block_allocation.take() {
            return Err(VulkanError::from_vk(result));
        }
        let block = DeviceBufferBlock {
            buffer: vk::Buffer::from_raw(self.next_raw_handle()),
            memory: vk::DeviceMemory::from_raw(self.next_raw_handle()),
            size: request.size,
        };
        self.live_blocks.borrow_mut().insert(block.buffer, block);
        Ok(block)
    }

    fn free_buffer_block(&self, block: DeviceBufferBlock) {
        let removed = self.live_blocks.borrow_mut().remove(&block.buffer);
        assert_eq!(removed, Some(block), "freed a block that is not live");
    }

    fn on_buffer_pool_prune(&self, released_bytes: vk::DeviceSize) {
        self.prune_notifications.borrow_mut().push(released_bytes);
    }
}

/// Contents of one write as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub dst_binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub buffer_infos: Vec<(vk::Buffer, vk::DeviceSize, vk::DeviceSize)>,
    pub image_views: Vec<vk::ImageView>,
    pub texel_buffer_views: Vec<vk::BufferView>,
}

#[derive(Default)]
pub struct MockDescriptorUpdater {
    calls: RefCell<Vec<Vec<RecordedWrite>>>,
}

impl MockDescriptorUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls(&self) -> Vec<Vec<RecordedWrite>> {
        self.calls.borrow().clone()
    }
}

/// Copy `count` elements from a write's info pointer, if it is set
///
/// # Safety
/// A non-null `ptr` must point to at least `count` initialized elements.
unsafe fn read_infos<T: Copy>(ptr: *const T, count: u32) -> Vec<T> {
    if ptr.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, count as usize).to_vec()
    }
}

impl DescriptorSetUpdater for MockDescriptorUpdater {
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let recorded = writes
            .iter()
            .map(|write| {
                // The builder keeps its arrays alive for the duration of this call.
                let (buffer_infos, image_infos, texel_buffer_views) = unsafe {
                    (
                        read_infos(write.p_buffer_info, write.descriptor_count),
                        read_infos(write.p_image_info, write.descriptor_count),
                        read_infos(write.p_texel_buffer_view, write.descriptor_count),
                    )
                };
                RecordedWrite {
                    dst_binding: write.dst_binding,
                    descriptor_type: write.descriptor_type,
                    buffer_infos: buffer_infos.iter().map(|info| (info.buffer, info.offset, info.range)).collect(),
                    image_views: image_infos.iter().map(|info| info.image_view).collect(),
                    texel_buffer_views,
                }
            })
            .collect();
        self.calls.borrow_mut().push(recorded);
    }
}

/// Render pass cache that validates descriptions and hands out fresh handles
#[derive(Default)]
pub struct MockRenderPassCache {
    returned: Vec<vk::RenderPass>,
}

impl MockRenderPassCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_count(&self) -> usize {
        self.returned.len()
    }

    pub fn returned_render_passes(&self) -> Vec<vk::RenderPass> {
        self.returned.clone()
    }
}

impl RenderPassCache for MockRenderPassCache {
    fn get_compatible_render_pass(&mut self, desc: &RenderPassDesc) -> VulkanResult<vk::RenderPass> {
        desc.validate()?;
        let render_pass = vk::RenderPass::from_raw(0x1000 + self.returned.len() as u64);
        self.returned.push(render_pass);
        Ok(render_pass)
    }
}

/// Worker pool that holds jobs until the test runs them
#[derive(Default)]
pub struct ManualWorkerPool {
    queue: RefCell<VecDeque<(Job, WaitableEvent)>>,
}

impl ManualWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn run_next(&self) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some((job, event)) => {
                event.run(job);
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl WorkerPool for ManualWorkerPool {
    fn post_worker_task(&self, job: Job) -> VulkanResult<WaitableEvent> {
        let event = WaitableEvent::new();
        self.queue.borrow_mut().push_back((job, event.clone()));
        Ok(event)
    }
}
