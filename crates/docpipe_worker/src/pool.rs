//! The worker pool: one polling task per job kind (§4.B, §5).

use crate::handler::StageHandler;
use docpipe_protocol::job::kinds;
use docpipe_queue::JobQueue;
use docpipe_retry::{stage_for_job_kind, RetryDecision, RetryManager};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Batch size and polling interval for one job kind.
#[derive(Debug, Clone, Copy)]
pub struct KindConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
}

/// Default per-kind configuration (§4.B).
pub fn default_kind_config(kind: &str) -> KindConfig {
    match kind {
        k if k == kinds::PARSE => KindConfig {
            batch_size: 3,
            poll_interval: Duration::from_secs(5),
        },
        k if k == kinds::EMBED => KindConfig {
            batch_size: 5,
            poll_interval: Duration::from_secs(2),
        },
        k if k == kinds::GRAPH_INGEST => KindConfig {
            batch_size: 3,
            poll_interval: Duration::from_secs(5),
        },
        k if k == kinds::ANALYZE => KindConfig {
            batch_size: 3,
            poll_interval: Duration::from_secs(5),
        },
        k if k == kinds::EXTRACT_FINANCIALS => KindConfig {
            batch_size: 3,
            poll_interval: Duration::from_secs(5),
        },
        _ => KindConfig {
            batch_size: 1,
            poll_interval: Duration::from_secs(5),
        },
    }
}

struct Registration {
    handler: Arc<dyn StageHandler>,
    config: KindConfig,
}

/// Hosts a registry mapping job kind to handler and per-kind configuration.
/// On [`WorkerPool::start`] it spawns one polling task per registered kind.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    retry: Arc<RetryManager>,
    registrations: HashMap<String, Registration>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, retry: Arc<RetryManager>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            retry,
            registrations: HashMap::new(),
            shutdown,
        }
    }

    /// Register a handler for `kind`, using the default batch/poll config
    /// for well-known kinds unless `config` overrides it.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn StageHandler>,
        config: Option<KindConfig>,
    ) {
        let kind = kind.into();
        let config = config.unwrap_or_else(|| default_kind_config(&kind));
        self.registrations.insert(kind, Registration { handler, config });
    }

    /// Spawn one polling task per registered kind. Each task loops:
    /// dequeue, process concurrently, sleep the polling interval. Returns
    /// join handles the caller awaits on graceful shutdown.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.registrations
            .iter()
            .map(|(kind, registration)| {
                let kind = kind.clone();
                let handler = registration.handler.clone();
                let config = registration.config;
                let queue = self.queue.clone();
                let retry = self.retry.clone();
                let mut shutdown_rx = self.shutdown.subscribe();

                tokio::spawn(async move {
                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }

                        match queue.dequeue(&kind, config.batch_size).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                let mut handles = Vec::with_capacity(jobs.len());
                                for job in jobs {
                                    let handler = handler.clone();
                                    let queue = queue.clone();
                                    let retry = retry.clone();
                                    let kind = kind.clone();
                                    docpipe_observability::METRICS.inc_jobs_dequeued();
                                    handles.push(tokio::spawn(async move {
                                        let job_id = job.id;
                                        match handler.handle(&job).await {
                                            Ok(output) => {
                                                docpipe_observability::METRICS.inc_jobs_completed();
                                                let _ = queue.complete(job_id, output).await;
                                            }
                                            Err(error) => {
                                                docpipe_observability::METRICS.inc_jobs_retried();
                                                handle_failure(&queue, &retry, &kind, job_id, &job.payload, error)
                                                    .await;
                                            }
                                        }
                                    }));
                                }
                                for handle in handles {
                                    let _ = handle.await;
                                }
                            }
                            Ok(_) => {}
                            Err(error) => {
                                tracing::warn!(kind = %kind, %error, "dequeue failed");
                            }
                        }

                        tokio::select! {
                            _ = tokio::time::sleep(config.poll_interval) => {}
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Signal all polling tasks to stop after their current iteration.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Route a handler failure through the retry manager (§4.C) before the
/// queue sees it: `RetryDecision::Retry` reschedules via `queue.fail`
/// (which applies the queue's own retry-count bookkeeping);
/// `RetryDecision::PermanentlyFailed` has already moved the document to its
/// stage-specific failed status, so the job itself must not be rescheduled
/// — `queue.force_fail` marks it failed unconditionally. A job whose
/// payload carries no `document_id`, or one whose kind isn't a known
/// pipeline stage, falls back to the plain `queue.fail` path: there's no
/// document to classify against.
async fn handle_failure(
    queue: &Arc<dyn JobQueue>,
    retry: &Arc<RetryManager>,
    kind: &str,
    job_id: docpipe_protocol::JobId,
    payload: &serde_json::Value,
    error: String,
) {
    let document_id = payload
        .get("document_id")
        .and_then(|v| serde_json::from_value::<docpipe_protocol::DocumentId>(v.clone()).ok());
    let stage = stage_for_job_kind(kind);

    let (Some(document_id), Some(stage)) = (document_id, stage) else {
        let _ = queue.fail(job_id, &error).await;
        return;
    };

    match retry.handle_job_failure(document_id, stage, &error).await {
        Ok(RetryDecision::Retry) => {
            let _ = queue.fail(job_id, &error).await;
        }
        Ok(RetryDecision::PermanentlyFailed(_)) => {
            let _ = queue.force_fail(job_id, &error).await;
        }
        Err(retry_error) => {
            tracing::warn!(%kind, %job_id, %retry_error, "retry manager failed to classify job failure");
            let _ = queue.fail(job_id, &error).await;
        }
    }
}
