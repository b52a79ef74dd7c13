//! Monolithic pipeline creation scheduling
//!
//! Draws proceed with a fast-linked pipeline while the monolithic one is
//! compiled in the background. Each share group keeps at most one such job
//! in flight and spaces posts at least `min_job_period` apart, so a burst of
//! draws needing new pipelines cannot flood the shared worker pool. Skipped
//! posts are not errors: the caller simply tries again on a later draw.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ash::vk;

use crate::backend::error::VulkanResult;
use crate::backend::render_pass::{RenderPassCache, RenderPassDesc};
use crate::core::config::PipelineJobConfig;
use crate::foundation::time::Clock;
use crate::rendering::worker_pool::{WaitableEvent, WorkerPool};

/// Background pipeline compilation work
///
/// The task only sees the render pass handle it is given; it must not reach
/// back into share group state while it runs.
pub trait PipelineCreationTask: Send + 'static {
    /// Render pass the pipeline must be compatible with
    fn render_pass_desc(&self) -> &RenderPassDesc;

    /// Build the pipeline against `compatible_render_pass`
    fn execute(self: Box<Self>, compatible_render_pass: vk::RenderPass);
}

/// A pipeline creation task together with its completion handle
///
/// The task stays here until it is posted; afterwards only the event
/// remains.
pub struct WaitablePipelineCreationTask {
    task: Option<Box<dyn PipelineCreationTask>>,
    event: Option<WaitableEvent>,
}

impl WaitablePipelineCreationTask {
    /// Wrap a task that has not been posted yet
    pub fn new(task: Box<dyn PipelineCreationTask>) -> Self {
        Self { task: Some(task), event: None }
    }

    /// Whether the task has been handed to a worker pool
    pub fn is_posted(&self) -> bool {
        self.task.is_none()
    }

    /// Whether the posted task has finished
    pub fn is_ready(&self) -> bool {
        self.event.as_ref().is_some_and(WaitableEvent::is_ready)
    }

    /// Completion handle, once posted
    pub fn event(&self) -> Option<&WaitableEvent> {
        self.event.as_ref()
    }
}

/// Single-flight, rate-limited poster of pipeline creation tasks
pub struct MonolithicPipelineScheduler {
    min_job_period: Duration,
    clock: Arc<dyn Clock>,
    current_job: Option<WaitableEvent>,
    last_job_time: Option<Duration>,
    posted_count: u64,
}

impl MonolithicPipelineScheduler {
    /// Create a scheduler with nothing in flight
    pub fn new(config: PipelineJobConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_job_period: config.min_job_period(),
            clock,
            current_job: None,
            last_job_time: None,
            posted_count: 0,
        }
    }

    /// Try to post `task` to `pool`
    ///
    /// Returns `Ok(false)` without side effects when the task was already
    /// posted, when the previous job is still running, or when the last post
    /// happened less than the minimum period ago. The compatible render pass
    /// is looked up only once posting is certain. If the pool refuses the
    /// job, the task is handed back and can be scheduled again.
    pub fn schedule(
        &mut self,
        render_pass_cache: &mut dyn RenderPassCache,
        pool: &dyn WorkerPool,
        task: &mut WaitablePipelineCreationTask,
    ) -> VulkanResult<bool> {
        let Some(desc) = task.task.as_ref().map(|task| task.render_pass_desc()) else {
            return Ok(false);
        };

        if self.has_pending_job() {
            return Ok(false);
        }

        let now = self.clock.now();
        if let Some(last) = self.last_job_time {
            if now.saturating_sub(last) < self.min_job_period {
                return Ok(false);
            }
        }

        let render_pass = render_pass_cache.get_compatible_render_pass(desc)?;

        let Some(inner) = task.task.take() else {
            return Ok(false);
        };
        let slot = Arc::new(Mutex::new(Some(inner)));
        let job_slot = Arc::clone(&slot);
        let posted = pool.post_worker_task(Box::new(move || {
            let inner = job_slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(inner) = inner {
                inner.execute(render_pass);
            }
        }));
        let event = match posted {
            Ok(event) => event,
            Err(err) => {
                task.task = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                return Err(err);
            }
        };

        task.event = Some(event.clone());
        self.current_job = Some(event);
        self.last_job_time = Some(now);
        self.posted_count += 1;
        log::trace!("Posted monolithic pipeline job #{}", self.posted_count);
        Ok(true)
    }

    /// Whether a posted job has not finished yet
    pub fn has_pending_job(&self) -> bool {
        self.current_job.as_ref().is_some_and(|job| !job.is_ready())
    }

    /// Block until the outstanding job, if any, has finished
    pub fn wait(&self) {
        if let Some(job) = &self.current_job {
            job.wait();
        }
    }

    /// Number of jobs posted so far
    pub fn posted_count(&self) -> u64 {
        self.posted_count
    }
}
