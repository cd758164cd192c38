//! Knowledge-graph ingest handler, the deep path (§4.G).

use crate::providers::GraphEngine;
use async_trait::async_trait;
use docpipe_db::StorageAdapter;
use docpipe_protocol::{DealId, DocumentId, DocumentStatus, Episode, Job, Namespace, OrganizationId, SchemaHint, Stage};
use docpipe_queue::JobQueue;
use docpipe_retry::RetryManager;
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_CONCURRENCY: usize = 10;
const PROGRESS_EVERY: usize = 10;
/// Estimated cost per character ingested: `(total_chars / 4) * $0.00000012` (§4.G).
const COST_PER_TOKEN_USD: f64 = 0.00000012;

#[derive(Debug, serde::Deserialize)]
struct GraphIngestPayload {
    document_id: DocumentId,
    deal_id: DealId,
    organization_id: OrganizationId,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    is_retry: bool,
}

/// A coarse document-type hint biasing the graph engine's extractor (§4.G).
fn document_type_hint(file_name: &str, content_type: &str) -> &'static str {
    let lower = format!("{file_name} {content_type}").to_lowercase();
    if ["financial", "balance", "income", "cashflow", "p&l", "ebitda"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "financial"
    } else if ["contract", "agreement", "nda", "legal"].iter().any(|k| lower.contains(k)) {
        "legal"
    } else if ["market", "competitor", "industry"].iter().any(|k| lower.contains(k)) {
        "market"
    } else if ["org", "operations", "headcount", "staffing"].iter().any(|k| lower.contains(k)) {
        "operational"
    } else {
        "general"
    }
}

pub struct GraphIngestHandler {
    storage: Arc<dyn StorageAdapter>,
    queue: Arc<dyn JobQueue>,
    retry: Arc<RetryManager>,
    graph: Arc<dyn GraphEngine>,
    concurrency: usize,
}

impl GraphIngestHandler {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        queue: Arc<dyn JobQueue>,
        retry: Arc<RetryManager>,
        graph: Arc<dyn GraphEngine>,
    ) -> Self {
        Self {
            storage,
            queue,
            retry,
            graph,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[async_trait]
impl docpipe_worker::StageHandler for GraphIngestHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let payload: GraphIngestPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| format!("invalid graph-ingest payload: {e}"))?;

        let document = self
            .storage
            .get_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        if document.status == DocumentStatus::GraphitiIngested && !payload.is_retry {
            self.enqueue_analyze(job).await?;
            return Ok(serde_json::json!({"document_id": payload.document_id, "skipped": true}));
        }

        if payload.is_retry {
            self.retry
                .prepare_stage_retry(payload.document_id, Stage::GraphitiIngested)
                .await
                .map_err(|e| e.to_string())?;
        } else {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::GraphitiIngesting, None)
                .await
                .map_err(|e| e.to_string())?;
        }

        let chunks = self
            .storage
            .get_chunks_by_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        if chunks.is_empty() {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::GraphitiIngested, None)
                .await
                .map_err(|e| e.to_string())?;
            self.retry
                .mark_stage_complete(payload.document_id, Stage::GraphitiIngested)
                .await
                .map_err(|e| e.to_string())?;
            self.enqueue_analyze(job).await?;
            return Ok(serde_json::json!({"document_id": payload.document_id, "episodes": 0}));
        }

        let namespace = Namespace::new(payload.organization_id, payload.deal_id);
        let file_name = payload.file_name.clone().unwrap_or_else(|| document.name.clone());
        let hint = document_type_hint(&file_name, &document.content_type);
        let schema = SchemaHint::document_ingest();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut total_chars = 0usize;
        let mut tasks = Vec::with_capacity(chunks.len());

        for (position, chunk) in chunks.iter().enumerate() {
            total_chars += chunk.content.len();
            let episode = Episode {
                name: Episode::chunk_episode_name(&file_name, chunk.index),
                namespace: namespace.colon(),
                content: chunk.content.clone(),
                source_description: format!("document_type={hint}"),
                reference_time: chrono::Utc::now(),
                schema_hint: schema.clone(),
            };
            let semaphore = semaphore.clone();
            let graph = self.graph.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                graph.add_episode(episode).await
            });
            if (position + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(
                    document_id = %payload.document_id,
                    chunk = position + 1,
                    total = chunks.len(),
                    "graph ingest progress"
                );
            }
        }

        for result in futures::future::join_all(tasks).await {
            result?;
        }

        let estimated_cost_usd = (total_chars as f64 / 4.0) * COST_PER_TOKEN_USD;

        self.storage
            .update_document_status(payload.document_id, DocumentStatus::GraphitiIngested, None)
            .await
            .map_err(|e| e.to_string())?;
        self.retry
            .mark_stage_complete(payload.document_id, Stage::GraphitiIngested)
            .await
            .map_err(|e| e.to_string())?;

        self.enqueue_analyze(job).await?;

        Ok(serde_json::json!({
            "document_id": payload.document_id,
            "episodes": chunks.len(),
            "estimated_cost_usd": estimated_cost_usd,
        }))
    }
}

impl GraphIngestHandler {
    async fn enqueue_analyze(&self, job: &Job) -> Result<(), String> {
        let mut envelope = job.payload.clone();
        if let serde_json::Value::Object(map) = &mut envelope {
            map.insert("is_retry".to_string(), serde_json::Value::Bool(false));
        }
        self.queue
            .enqueue(
                docpipe_protocol::job::kinds::ANALYZE,
                envelope,
                docpipe_protocol::EnqueueOptions::default(),
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
