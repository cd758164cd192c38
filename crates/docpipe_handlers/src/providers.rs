//! External provider seams (object store, embeddings, reranker, graph
//! engine, LLM). Handlers depend on these traits, never on a concrete
//! vendor SDK, so tests can substitute fakes (§9 "global singletons").

use async_trait::async_trait;
use docpipe_protocol::Episode;

/// Downloads a document's bytes from object storage (`gs://bucket/object`, §6).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, gcs_path: &str) -> Result<Vec<u8>, String>;
}

/// Calls an embedding model. Implementations should surface transient
/// provider errors so the caller's retry loop (§4.F) can distinguish them
/// from fatal ones by message content (classified downstream).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, inputs: Vec<String>, input_type: &str) -> Result<Vec<Vec<f32>>, String>;
}

/// A candidate returned by a graph search (§4.I).
#[derive(Debug, Clone)]
pub struct GraphCandidate {
    pub edge_name: String,
    pub text: String,
    pub source_entity: String,
    pub target_entity: String,
    pub confidence: Option<f32>,
    pub page: Option<u32>,
    pub chunk_index: Option<u32>,
    pub title: Option<String>,
    pub invalid_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A fast-path node written by the embed-chunks handler (§4.F).
#[derive(Debug, Clone)]
pub struct FastPathNode {
    pub chunk_id: uuid::Uuid,
    pub content: String,
    pub vector: Vec<f32>,
    pub document_id: uuid::Uuid,
    pub deal_id: uuid::Uuid,
    pub organization_id: uuid::Uuid,
    pub namespace_underscore: String,
    pub chunk_index: u32,
    pub page: Option<u32>,
    pub chunk_kind: String,
    pub token_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The knowledge-graph engine: episode ingestion, fast-path node storage,
/// and hybrid search, all scoped to a tenant namespace (§4.G, §4.I, §4.J).
#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn upsert_fast_path_node(&self, node: FastPathNode) -> Result<(), String>;

    async fn add_episode(&self, episode: Episode) -> Result<(), String>;

    /// Returns up to `limit` candidate facts for `query` within `namespace`
    /// (colon-joined). Implementations should internally hybridize
    /// keyword/vector search; callers treat the result as opaque ranking input.
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphCandidate>, String>;

    /// Vector search over the fast-path node store, used by
    /// `retrieve_with_fallback` (§4.I) when the graph layer yields nothing.
    async fn fast_path_search(
        &self,
        namespace_underscore: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphCandidate>, String>;
}

/// The reranker's SDK is synchronous (§9); the trait stays synchronous and
/// callers wrap it in `spawn_blocking`.
pub trait RerankProvider: Send + Sync {
    /// Returns `(candidate_index, score)` pairs for the top `top_k` candidates.
    fn rerank(&self, query: &str, candidates: &[String], top_k: usize) -> Result<Vec<(usize, f32)>, String>;
}

/// Token usage and content returned by an LLM completion call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A structured-output-capable LLM client (§4.H, §4.L).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, model: &str, system: &str, prompt: &str) -> Result<LlmResponse, String>;
}
