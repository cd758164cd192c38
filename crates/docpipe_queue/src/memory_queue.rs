//! An in-memory [`JobQueue`], used by worker-pool and retry-manager tests.

use crate::error::QueueError;
use crate::queue::{CountsByKind, JobQueue};
use async_trait::async_trait;
use docpipe_protocol::{EnqueueOptions, Job, JobId, JobState};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();

        if let Some(key) = &options.singleton_key {
            if let Some(existing) = jobs.values().find(|j| {
                j.kind == kind
                    && j.singleton_key.as_deref() == Some(key.as_str())
                    && matches!(j.state, JobState::Created | JobState::Retry | JobState::Active)
            }) {
                return Ok(existing.id);
            }
        }

        let id = JobId::new();
        let now = chrono::Utc::now();
        let job = Job {
            id,
            kind: kind.to_string(),
            payload,
            state: JobState::Created,
            priority: options.priority,
            retry_count: 0,
            retry_limit: options.retry_limit,
            retry_delay: options.retry_delay,
            retry_backoff: options.retry_backoff,
            start_after: now + chrono::Duration::from_std(options.delay).unwrap_or_default(),
            expire_in: options.expire_in,
            singleton_key: options.singleton_key,
            created_on: now,
            started_on: None,
            completed_on: None,
            output: None,
        };
        jobs.insert(id, job);
        Ok(id)
    }

    async fn dequeue(&self, kind: &str, batch_size: usize) -> Result<Vec<Job>, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = chrono::Utc::now();

        let mut candidates: Vec<JobId> = jobs
            .values()
            .filter(|j| {
                j.kind == kind
                    && matches!(j.state, JobState::Created | JobState::Retry)
                    && j.start_after <= now
            })
            .map(|j| j.id)
            .collect();

        candidates.sort_by(|a, b| {
            let ja = &jobs[a];
            let jb = &jobs[b];
            jb.priority
                .cmp(&ja.priority)
                .then_with(|| ja.created_on.cmp(&jb.created_on))
        });
        candidates.truncate(batch_size);

        let mut dequeued = Vec::with_capacity(candidates.len());
        for id in candidates {
            let job = jobs.get_mut(&id).unwrap();
            job.state = JobState::Active;
            job.started_on = Some(now);
            dequeued.push(job.clone());
        }
        Ok(dequeued)
    }

    async fn complete(&self, job_id: JobId, output: serde_json::Value) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
        job.state = JobState::Completed;
        job.completed_on = Some(chrono::Utc::now());
        job.output = Some(output);
        Ok(())
    }

    async fn fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
        if job.retry_count < job.retry_limit {
            let delay = job.next_retry_delay();
            job.retry_count += 1;
            job.state = JobState::Retry;
            job.start_after = chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        } else {
            job.state = JobState::Failed;
            job.completed_on = Some(chrono::Utc::now());
        }
        job.output = Some(serde_json::json!({ "error": error }));
        Ok(())
    }

    async fn force_fail(&self, job_id: JobId, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
        job.state = JobState::Failed;
        job.completed_on = Some(chrono::Utc::now());
        job.output = Some(serde_json::json!({ "error": error }));
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or(QueueError::JobNotFound(job_id))
    }

    async fn cancel(&self, job_id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
        if job.state != JobState::Created {
            return Err(QueueError::NotCancellable(job_id));
        }
        job.state = JobState::Cancelled;
        Ok(())
    }

    async fn counts(&self) -> Result<CountsByKind, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        let mut counts: CountsByKind = CountsByKind::new();
        for job in jobs.values() {
            *counts.entry(job.kind.clone()).or_default().entry(job.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_active(&self) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        let mut active: Vec<Job> = jobs
            .values()
            .filter(|j| {
                matches!(
                    j.state,
                    JobState::Created | JobState::Retry | JobState::Active | JobState::Failed
                )
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_on.cmp(&a.created_on));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeue_orders_by_priority_then_created_on() {
        let queue = InMemoryJobQueue::new();
        let mut low = EnqueueOptions::default();
        low.priority = 0;
        let mut high = EnqueueOptions::default();
        high.priority = 10;

        let first = queue.enqueue("parse", serde_json::json!({}), low).await.unwrap();
        let second = queue.enqueue("parse", serde_json::json!({}), high).await.unwrap();

        let batch = queue.dequeue("parse", 10).await.unwrap();
        assert_eq!(batch[0].id, second);
        assert_eq!(batch[1].id, first);
    }

    #[tokio::test]
    async fn singleton_key_drops_second_enqueue() {
        let queue = InMemoryJobQueue::new();
        let mut opts = EnqueueOptions::default();
        opts.singleton_key = Some("doc-1".into());
        let first = queue
            .enqueue("embed", serde_json::json!({}), opts.clone())
            .await
            .unwrap();
        let second = queue
            .enqueue("embed", serde_json::json!({}), opts)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fail_retries_until_limit_then_fails_permanently() {
        let queue = InMemoryJobQueue::new();
        let mut opts = EnqueueOptions::default();
        opts.retry_limit = 1;
        let id = queue.enqueue("parse", serde_json::json!({}), opts).await.unwrap();

        queue.fail(id, "transient").await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().state, JobState::Retry);

        queue.fail(id, "transient again").await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn cancel_only_succeeds_while_created() {
        let queue = InMemoryJobQueue::new();
        let id = queue
            .enqueue("parse", serde_json::json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.dequeue("parse", 1).await.unwrap();
        assert!(queue.cancel(id).await.is_err());
    }
}
