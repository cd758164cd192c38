//! `docpipe search`: run hybrid retrieval from the CLI (§4.I).

use crate::cli::output::print_table;
use docpipe_protocol::{DealId, Namespace, OrganizationId};
use docpipe_retrieval::HybridRetrievalService;
use std::sync::Arc;

pub async fn search(
    retrieval: Arc<HybridRetrievalService>,
    organization_id: OrganizationId,
    deal_id: DealId,
    query: &str,
) -> anyhow::Result<()> {
    let namespace = Namespace::new(organization_id, deal_id);
    let response = retrieval.retrieve_with_fallback(namespace, query).await;

    if response.results.is_empty() {
        println!("no results ({} candidates considered)", response.candidate_count);
        return Ok(());
    }

    let rows = response
        .results
        .iter()
        .zip(response.sources.iter())
        .map(|(result, source)| {
            vec![
                format!("{:.3}", result.score),
                format!("{:?}", source.kind),
                source.title.clone().unwrap_or_default(),
                truncate(&result.text, 80),
            ]
        })
        .collect();

    print_table(&["Score", "Source", "Title", "Text"], rows);
    println!(
        "{} results from {} candidates in {}ms (graph {}ms, rerank {}ms)",
        response.results.len(),
        response.candidate_count,
        response.total_latency_ms,
        response.graph_ms,
        response.rerank_ms,
    );
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}…", text.chars().take(max_chars).collect::<String>())
    }
}
