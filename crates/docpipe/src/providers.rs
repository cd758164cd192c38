//! Stand-in provider implementations (§3 "External provider seams").
//!
//! No live object-store, embedding, graph, rerank, or LLM vendor is wired
//! into this binary: those require account credentials this crate can't
//! assume. These implementations keep the pipeline runnable end to end in
//! dev/test and degrade the way the retrieval/handler layers expect a
//! genuinely unreachable provider to degrade (empty results, not panics).

use async_trait::async_trait;
use docpipe_handlers::providers::{EmbeddingProvider, FastPathNode, GraphCandidate, GraphEngine, LlmClient, LlmResponse, ObjectStore, RerankProvider};
use docpipe_protocol::Episode;

pub struct UnconfiguredObjectStore;

#[async_trait]
impl ObjectStore for UnconfiguredObjectStore {
    async fn download(&self, gcs_path: &str) -> Result<Vec<u8>, String> {
        Err(format!("no object store configured; cannot download {gcs_path}"))
    }
}

pub struct UnconfiguredEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for UnconfiguredEmbeddingProvider {
    async fn embed(&self, _inputs: Vec<String>, _input_type: &str) -> Result<Vec<Vec<f32>>, String> {
        Err("no embedding provider configured".to_string())
    }
}

/// A graph engine with no backing store: writes are accepted and dropped,
/// searches always report a connection failure so callers degrade to
/// their documented empty-result behavior rather than panic.
pub struct UnconfiguredGraphEngine;

#[async_trait]
impl GraphEngine for UnconfiguredGraphEngine {
    async fn upsert_fast_path_node(&self, _node: FastPathNode) -> Result<(), String> {
        Ok(())
    }

    async fn add_episode(&self, _episode: Episode) -> Result<(), String> {
        Ok(())
    }

    async fn search(&self, _namespace: &str, _query: &str, _limit: usize) -> Result<Vec<GraphCandidate>, String> {
        Err("graph connection refused: no graph store configured".to_string())
    }

    async fn fast_path_search(&self, _namespace: &str, _query: &str, _limit: usize) -> Result<Vec<GraphCandidate>, String> {
        Err("graph connection refused: no graph store configured".to_string())
    }
}

/// Identity reranker: preserves input order, used when no vendor reranker
/// is configured. `HybridRetrievalService` treats this the same as any
/// other synchronous reranker.
pub struct IdentityRerankProvider;

impl RerankProvider for IdentityRerankProvider {
    fn rerank(&self, _query: &str, candidates: &[String], top_k: usize) -> Result<Vec<(usize, f32)>, String> {
        Ok((0..candidates.len().min(top_k)).map(|i| (i, 1.0 - i as f32 * 0.05)).collect())
    }
}

pub struct UnconfiguredLlmClient;

#[async_trait]
impl LlmClient for UnconfiguredLlmClient {
    async fn complete(&self, model: &str, _system: &str, _prompt: &str) -> Result<LlmResponse, String> {
        Err(format!("no LLM provider configured for model {model}"))
    }
}
