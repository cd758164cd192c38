//! Embed-chunks handler, the fast path (§4.F).

use crate::providers::{EmbeddingProvider, FastPathNode, GraphEngine};
use async_trait::async_trait;
use docpipe_db::StorageAdapter;
use docpipe_protocol::{DealId, DocumentId, DocumentStatus, Job, Namespace, OrganizationId, UsageRow};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BATCH_SIZE: usize = 64;
const MAX_RETRY_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_millis(5000);
const TARGET_LATENCY: Duration = Duration::from_secs(5);

#[derive(Debug, serde::Deserialize)]
struct EmbedPayload {
    document_id: DocumentId,
    deal_id: DealId,
    #[serde(default)]
    organization_id: Option<OrganizationId>,
}

fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    !(lower.contains("auth") || lower.contains("invalid request") || lower.contains("unauthorized"))
}

async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    inputs: Vec<String>,
) -> Result<Vec<Vec<f32>>, String> {
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 0;
    loop {
        match provider.embed(inputs.clone(), "document").await {
            Ok(vectors) => return Ok(vectors),
            Err(message) if attempt < MAX_RETRY_ATTEMPTS && is_retryable(&message) => {
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
            Err(message) => return Err(message),
        }
    }
}

pub struct EmbedChunksHandler {
    storage: Arc<dyn StorageAdapter>,
    graph: Arc<dyn GraphEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbedChunksHandler {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        graph: Arc<dyn GraphEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            storage,
            graph,
            embedder,
        }
    }
}

#[async_trait]
impl docpipe_worker::StageHandler for EmbedChunksHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let payload: EmbedPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| format!("invalid embed payload: {e}"))?;

        let organization_id = match payload.organization_id {
            Some(id) => id,
            None => {
                let deal = self
                    .storage
                    .get_deal(payload.deal_id)
                    .await
                    .map_err(|e| e.to_string())?;
                deal.organization_id
            }
        };
        let namespace = Namespace::new(organization_id, payload.deal_id);

        let chunks = self
            .storage
            .get_chunks_by_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        if chunks.is_empty() {
            self.storage
                .update_embeddings_and_status(payload.document_id, Vec::new(), Vec::new(), DocumentStatus::Embedded)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(serde_json::json!({"document_id": payload.document_id, "embedded": 0}));
        }

        let started = Instant::now();
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(BATCH_SIZE) {
            let inputs: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = embed_with_retry(self.embedder.as_ref(), inputs).await?;
            if embeddings.len() != batch.len() {
                return Err(format!(
                    "embedding provider returned {} vectors for {} inputs",
                    embeddings.len(),
                    batch.len()
                ));
            }

            for (chunk, vector) in batch.iter().zip(embeddings.into_iter()) {
                self.graph
                    .upsert_fast_path_node(FastPathNode {
                        chunk_id: chunk.id,
                        content: chunk.content.clone(),
                        vector: vector.clone(),
                        document_id: payload.document_id.as_uuid(),
                        deal_id: payload.deal_id.as_uuid(),
                        organization_id: organization_id.as_uuid(),
                        namespace_underscore: namespace.underscore(),
                        chunk_index: chunk.index,
                        page: chunk.metadata.page,
                        chunk_kind: chunk.kind.as_str().to_string(),
                        token_count: chunk.token_count,
                        created_at: chrono::Utc::now(),
                    })
                    .await?;
                chunk_ids.push(chunk.id);
                vectors.push(vector);
            }
        }

        let elapsed = started.elapsed();
        if elapsed > TARGET_LATENCY {
            tracing::warn!(
                document_id = %payload.document_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "fast-path embedding exceeded target latency"
            );
        }

        self.storage
            .update_embeddings_and_status(payload.document_id, chunk_ids, vectors, DocumentStatus::Embedded)
            .await
            .map_err(|e| e.to_string())?;

        docpipe_observability::log_usage_row(&UsageRow::Feature {
            feature: "fast_path_embedding".to_string(),
            status: docpipe_protocol::FeatureOutcome::Success,
            duration: elapsed,
            error_message: None,
            metadata: serde_json::Map::new(),
        });

        Ok(serde_json::json!({
            "document_id": payload.document_id,
            "embedded": chunks.len(),
            "latency_ms": elapsed.as_millis() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_retryable() {
        assert!(!is_retryable("401 Unauthorized"));
        assert!(!is_retryable("invalid request: missing field"));
    }

    #[test]
    fn rate_limits_are_retryable() {
        assert!(is_retryable("HTTP 429 rate limit exceeded"));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct FlakyEmbedder {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl EmbeddingProvider for FlakyEmbedder {
            async fn embed(&self, inputs: Vec<String>, _input_type: &str) -> Result<Vec<Vec<f32>>, String> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("HTTP 429".to_string())
                } else {
                    Ok(inputs.iter().map(|_| vec![0.0_f32; 3]).collect())
                }
            }
        }

        let provider = FlakyEmbedder {
            calls: AtomicUsize::new(0),
        };
        let result = embed_with_retry(&provider, vec!["a".to_string()]).await;
        assert!(result.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
