//! Hybrid retrieval (§4.I): graph search, rerank, supersession filtering,
//! and citation assembly, with a fast-path fallback over §4.F's node store.

use docpipe_handlers::providers::{GraphCandidate, GraphEngine, RerankProvider};
use docpipe_protocol::Namespace;
use std::sync::Arc;
use std::time::Instant;

/// End-to-end retrieval budget (§4.I). Not enforced as a hard cutoff here;
/// callers that need a hard deadline should wrap `retrieve` in a timeout.
pub const RETRIEVAL_BUDGET_MS: u64 = 3000;

const CANDIDATE_COUNT: usize = 50;
const RERANK_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Qa,
    Chat,
    Document,
}

impl SourceKind {
    /// Infers source kind from the edge name prefix (§4.I): `qa-response…`
    /// is a QA answer, `chat-fact…` is a chat-derived fact, else a document.
    fn from_edge_name(edge_name: &str) -> Self {
        if edge_name.starts_with("qa-response") {
            Self::Qa
        } else if edge_name.starts_with("chat-fact") {
            Self::Chat
        } else {
            Self::Document
        }
    }
}

const DEFAULT_CITATION_CONFIDENCE: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    pub text: String,
    pub confidence: f32,
    pub page: Option<u32>,
    pub chunk_index: Option<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResponse {
    pub results: Vec<RankedResult>,
    pub sources: Vec<Source>,
    pub entities: Vec<String>,
    pub total_latency_ms: u64,
    pub graph_ms: u64,
    pub rerank_ms: u64,
    pub candidate_count: usize,
}

/// Rerank candidates synchronously inside a blocking task (§9: the
/// reranker's SDK is synchronous). Falls back to original order with
/// decreasing placeholder scores on failure (§4.I).
async fn rerank_candidates(
    reranker: Arc<dyn RerankProvider>,
    query: String,
    texts: Vec<String>,
    top_k: usize,
) -> Vec<(usize, f32)> {
    let count = texts.len();
    let result = tokio::task::spawn_blocking(move || reranker.rerank(&query, &texts, top_k)).await;
    match result {
        Ok(Ok(ranked)) => ranked,
        _ => (0..count.min(top_k))
            .map(|i| (i, 1.0 - (i as f32 * 0.05)))
            .collect(),
    }
}

fn assemble_entities(candidates: &[&GraphCandidate]) -> Vec<String> {
    let mut entities = Vec::new();
    for candidate in candidates {
        for name in [&candidate.source_entity, &candidate.target_entity] {
            if !name.is_empty() && !entities.contains(name) {
                entities.push(name.clone());
            }
        }
    }
    entities
}

fn assemble_source(candidate: &GraphCandidate) -> Source {
    Source {
        kind: SourceKind::from_edge_name(&candidate.edge_name),
        text: candidate.text.clone(),
        confidence: candidate.confidence.unwrap_or(DEFAULT_CITATION_CONFIDENCE),
        page: candidate.page,
        chunk_index: candidate.chunk_index,
        title: candidate.title.clone(),
    }
}

pub struct HybridRetrievalService {
    graph: Arc<dyn GraphEngine>,
    reranker: Arc<dyn RerankProvider>,
}

impl HybridRetrievalService {
    pub fn new(graph: Arc<dyn GraphEngine>, reranker: Arc<dyn RerankProvider>) -> Self {
        Self { graph, reranker }
    }

    /// The full hybrid-retrieval pipeline (§4.I). `semantic_only` skips
    /// supersession filtering and entity extraction but returns the
    /// identical response shape.
    pub async fn retrieve(&self, namespace: Namespace, query: &str, semantic_only: bool) -> RetrievalResponse {
        let total_started = Instant::now();

        let graph_started = Instant::now();
        let candidates = match self.graph.search(&namespace.colon(), query, CANDIDATE_COUNT).await {
            Ok(c) => c,
            Err(error) => {
                tracing::warn!(%error, namespace = %namespace, "graph search failed; degrading to empty result");
                Vec::new()
            }
        };
        let graph_ms = graph_started.elapsed().as_millis() as u64;
        let candidate_count = candidates.len();

        self.finish(candidates, query, semantic_only, graph_ms, total_started).await
    }

    /// Fast-path fallback (§4.I): if graph search yields zero candidates,
    /// fall back to a vector search over the fast-path node store.
    pub async fn retrieve_with_fallback(&self, namespace: Namespace, query: &str) -> RetrievalResponse {
        let total_started = Instant::now();

        let graph_started = Instant::now();
        let mut candidates = match self.graph.search(&namespace.colon(), query, CANDIDATE_COUNT).await {
            Ok(c) => c,
            Err(error) => {
                tracing::warn!(%error, namespace = %namespace, "graph search failed; degrading to empty result");
                Vec::new()
            }
        };
        if candidates.is_empty() {
            candidates = self
                .graph
                .fast_path_search(&namespace.underscore(), query, CANDIDATE_COUNT)
                .await
                .unwrap_or_default();
        }
        let graph_ms = graph_started.elapsed().as_millis() as u64;

        self.finish(candidates, query, false, graph_ms, total_started).await
    }

    async fn finish(
        &self,
        candidates: Vec<GraphCandidate>,
        query: &str,
        semantic_only: bool,
        graph_ms: u64,
        total_started: Instant,
    ) -> RetrievalResponse {
        let candidate_count = candidates.len();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        let rerank_started = Instant::now();
        let ranked = rerank_candidates(self.reranker.clone(), query.to_string(), texts.clone(), RERANK_TOP_K).await;
        let rerank_ms = rerank_started.elapsed().as_millis() as u64;

        let survivors: Vec<(&GraphCandidate, f32)> = ranked
            .into_iter()
            .filter_map(|(index, score)| candidates.get(index).map(|c| (c, score)))
            .filter(|(c, _)| semantic_only || !c.invalid_at.is_some())
            .collect();

        let results = survivors
            .iter()
            .map(|(c, score)| RankedResult {
                text: c.text.clone(),
                score: *score,
            })
            .collect();

        let sources = survivors.iter().map(|(c, _)| assemble_source(c)).collect();

        let entities = if semantic_only {
            Vec::new()
        } else {
            let refs: Vec<&GraphCandidate> = survivors.iter().map(|(c, _)| *c).collect();
            assemble_entities(&refs)
        };

        RetrievalResponse {
            results,
            sources,
            entities,
            total_latency_ms: total_started.elapsed().as_millis() as u64,
            graph_ms,
            rerank_ms,
            candidate_count,
        }
    }
}
