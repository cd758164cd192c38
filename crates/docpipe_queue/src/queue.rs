//! The [`JobQueue`] trait: a durable, pg-boss-style job queue (§4.A).

use crate::error::QueueError;
use async_trait::async_trait;
use docpipe_protocol::{EnqueueOptions, Job, JobId, JobState};
use std::collections::HashMap;

pub type CountsByState = HashMap<JobState, u64>;
pub type CountsByKind = HashMap<String, CountsByState>;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Inserts a job with state `created`. A singleton key that matches an
    /// already-queued job of the same kind drops the new enqueue, returning
    /// the existing job's id instead of inserting a duplicate.
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError>;

    /// Atomically selects up to `batch_size` rows in state `created` or
    /// `retry` with `start_after <= now`, in (priority DESC, created_on ASC)
    /// order, marks them `active`, and returns them. Concurrent dequeuers
    /// never see the same row.
    async fn dequeue(&self, kind: &str, batch_size: usize) -> Result<Vec<Job>, QueueError>;

    async fn complete(&self, job_id: JobId, output: serde_json::Value) -> Result<(), QueueError>;

    /// If `retry_count < retry_limit`, schedules a retry with the next
    /// backoff delay; otherwise marks the job permanently `failed`.
    async fn fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError>;

    /// Unconditionally marks the job `failed`, bypassing the `retry_count
    /// < retry_limit` check `fail` applies. Used when a caller (the retry
    /// manager) has already decided the underlying document is
    /// permanently failed and the job itself must not be rescheduled.
    async fn force_fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError>;

    async fn get(&self, job_id: JobId) -> Result<Job, QueueError>;

    /// Cancels a queued job. Succeeds only if the job is still `created`.
    async fn cancel(&self, job_id: JobId) -> Result<(), QueueError>;

    async fn counts(&self) -> Result<CountsByKind, QueueError>;

    /// Lists jobs not yet completed or cancelled (`created`, `retry`,
    /// `active`, or `failed`), most recently created first. Used by
    /// queue-introspection endpoints, which surface failures too.
    async fn list_active(&self) -> Result<Vec<Job>, QueueError>;
}
