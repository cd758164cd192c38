//! The worker pool that drains [`docpipe_queue`] by dispatching to registered
//! [`StageHandler`]s, one polling task per job kind (§4.B).

pub mod handler;
pub mod pool;

pub use handler::StageHandler;
pub use pool::{default_kind_config, KindConfig, WorkerPool};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docpipe_db::{InMemoryStorageAdapter, StorageAdapter};
    use docpipe_protocol::{EnqueueOptions, Job};
    use docpipe_queue::{InMemoryJobQueue, JobQueue};
    use docpipe_retry::RetryManager;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_retry_manager(queue: Arc<dyn JobQueue>) -> Arc<RetryManager> {
        Arc::new(RetryManager::with_queue(
            Arc::new(InMemoryStorageAdapter::new()),
            queue,
        ))
    }

    struct EchoHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StageHandler for EchoHandler {
        async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(job.payload.clone())
        }
    }

    struct AlwaysFailHandler;

    #[async_trait]
    impl StageHandler for AlwaysFailHandler {
        async fn handle(&self, _job: &Job) -> Result<serde_json::Value, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn dispatches_to_the_registered_handler_and_completes() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let job_id = queue
            .enqueue("parse", serde_json::json!({"x": 1}), EnqueueOptions::default())
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(queue.clone(), test_retry_manager(queue.clone()));
        pool.register(
            "parse",
            Arc::new(EchoHandler {
                calls: calls.clone(),
            }),
            Some(KindConfig {
                batch_size: 3,
                poll_interval: Duration::from_millis(20),
            }),
        );

        let handles = pool.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        pool.shutdown();
        for handle in handles {
            let _ = handle.await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let job = queue.get(job_id).await.unwrap();
        assert_eq!(job.state, docpipe_protocol::JobState::Completed);
    }

    #[tokio::test]
    async fn handler_errors_route_to_queue_fail() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let job_id = queue
            .enqueue("parse", serde_json::json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let mut pool = WorkerPool::new(queue.clone(), test_retry_manager(queue.clone()));
        pool.register(
            "parse",
            Arc::new(AlwaysFailHandler),
            Some(KindConfig {
                batch_size: 3,
                poll_interval: Duration::from_millis(20),
            }),
        );

        let handles = pool.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        pool.shutdown();
        for handle in handles {
            let _ = handle.await;
        }

        let job = queue.get(job_id).await.unwrap();
        assert!(matches!(
            job.state,
            docpipe_protocol::JobState::Retry | docpipe_protocol::JobState::Failed
        ));
    }

    #[tokio::test]
    async fn handler_errors_for_a_known_document_route_through_the_retry_manager() {
        let storage = Arc::new(InMemoryStorageAdapter::new());
        let document = docpipe_protocol::Document::new(
            docpipe_protocol::DocumentId::new(),
            docpipe_protocol::OrganizationId::new(),
            docpipe_protocol::DealId::new(),
            "report.pdf",
            "application/pdf",
        );
        let document_id = document.id;
        storage.seed_document(document);

        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let retry = Arc::new(RetryManager::with_queue(storage.clone(), queue.clone()));
        let job_id = queue
            .enqueue(
                "parse",
                serde_json::json!({"document_id": document_id}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let mut pool = WorkerPool::new(queue.clone(), retry);
        pool.register(
            "parse",
            Arc::new(AlwaysFailHandler),
            Some(KindConfig {
                batch_size: 3,
                poll_interval: Duration::from_millis(20),
            }),
        );

        let handles = pool.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        pool.shutdown();
        for handle in handles {
            let _ = handle.await;
        }

        let document = storage.get_document(document_id).await.unwrap();
        assert_eq!(document.retry_history.len(), 1);
        assert!(document.processing_error.is_some());

        let job = queue.get(job_id).await.unwrap();
        assert_eq!(job.state, docpipe_protocol::JobState::Retry);
    }

    #[tokio::test]
    async fn shutdown_stops_polling_without_panicking() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let mut pool = WorkerPool::new(queue.clone(), test_retry_manager(queue));
        pool.register(
            "parse",
            Arc::new(AlwaysFailHandler),
            Some(KindConfig {
                batch_size: 1,
                poll_interval: Duration::from_millis(10),
            }),
        );
        let handles = pool.start();
        pool.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
