//! Background pipeline compilation

/// Worker pool seam and its thread-backed implementation
pub mod worker_pool;

/// Single-flight, rate-limited monolithic pipeline job posting
pub mod pipeline_scheduler;

pub use pipeline_scheduler::{MonolithicPipelineScheduler, PipelineCreationTask, WaitablePipelineCreationTask};
pub use worker_pool::{Job, JobState, ThreadWorkerPool, WaitableEvent, WorkerPool};
