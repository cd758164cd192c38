//! `docpipe`: the document intelligence pipeline's CLI and HTTP server (§6).

use clap::{Parser, Subcommand};
use docpipe::{cli, http, providers, tenant};
use docpipe_config::ModelRegistry;
use docpipe_db::DuckDbStorageAdapter;
use docpipe_handlers::{AnalyzeHandler, EmbedChunksHandler, ExtractFinancialsHandler, GraphIngestHandler, ParseHandler};
use docpipe_protocol::job::kinds;
use docpipe_protocol::{DealId, DocumentId, OrganizationId};
use docpipe_queue::DuckDbJobQueue;
use docpipe_retrieval::HybridRetrievalService;
use docpipe_retry::RetryManager;
use docpipe_worker::WorkerPool;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "docpipe", about = "Document intelligence pipeline")]
struct Cli {
    /// Directory holding the DuckDB-backed document and job stores.
    #[arg(long, env = "DOCPIPE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and worker pool.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Inspect jobs still in flight.
    Queue {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Manually retry a document's next pending stage.
    Retry {
        document_id: DocumentId,
        #[arg(long)]
        gcs_path: Option<String>,
    },
    /// Run hybrid retrieval against a deal's namespace.
    Search {
        query: String,
        #[arg(long)]
        organization_id: OrganizationId,
        #[arg(long)]
        deal_id: DealId,
    },
    /// Rewrite a legacy deal-only graph-store namespace to the composite form.
    MigrateNamespace {
        legacy_namespace: String,
        #[arg(long)]
        dry_run: bool,
    },
}

fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
    let dir = cli
        .data_dir
        .clone()
        .or_else(|| dirs::home_dir().map(|h| h.join(".docpipe")))
        .ok_or_else(|| anyhow::anyhow!("could not determine a data directory; pass --data-dir"))?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let dir = data_dir(&cli)?;

    let storage: Arc<dyn docpipe_db::StorageAdapter> = Arc::new(DuckDbStorageAdapter::open(&dir.join("documents.duckdb"))?);
    let queue: Arc<dyn docpipe_queue::JobQueue> = Arc::new(DuckDbJobQueue::open(&dir.join("jobs.duckdb"))?);
    let retry = Arc::new(RetryManager::with_queue(storage.clone(), queue.clone()));

    match cli.command {
        Command::Serve { bind } => serve(&bind, storage, queue, retry).await,
        Command::Queue { kind } => cli::queue::list(queue, kind.as_deref()).await,
        Command::Retry { document_id, gcs_path } => cli::retry::retry_document(storage, retry, document_id, gcs_path).await,
        Command::Search {
            query,
            organization_id,
            deal_id,
        } => {
            let graph = Arc::new(providers::UnconfiguredGraphEngine);
            let reranker = Arc::new(providers::IdentityRerankProvider);
            let retrieval = Arc::new(HybridRetrievalService::new(graph, reranker));
            cli::search::search(retrieval, organization_id, deal_id, &query).await
        }
        Command::MigrateNamespace { legacy_namespace, dry_run } => cli::migrate::run(storage, &legacy_namespace, dry_run).await,
    }
}

fn model_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    if let Ok(model) = docpipe_config::ModelString::parse("openai:gpt-4o") {
        registry.register(
            "analysis",
            docpipe_config::AgentModelConfig {
                primary: model,
                fallback: None,
            },
        );
    }
    registry
}

async fn serve(
    bind: &str,
    storage: Arc<dyn docpipe_db::StorageAdapter>,
    queue: Arc<dyn docpipe_queue::JobQueue>,
    retry: Arc<RetryManager>,
) -> anyhow::Result<()> {
    let object_store = Arc::new(providers::UnconfiguredObjectStore);
    let embedder = Arc::new(providers::UnconfiguredEmbeddingProvider);
    let graph: Arc<dyn docpipe_handlers::GraphEngine> = Arc::new(providers::UnconfiguredGraphEngine);
    let llm = Arc::new(providers::UnconfiguredLlmClient);
    let models = Arc::new(model_registry());

    let mut pool = WorkerPool::new(queue.clone(), retry.clone());
    pool.register(
        kinds::PARSE,
        Arc::new(ParseHandler::new(storage.clone(), queue.clone(), retry.clone(), object_store)),
        None,
    );
    pool.register(
        kinds::EMBED,
        Arc::new(EmbedChunksHandler::new(storage.clone(), graph.clone(), embedder)),
        None,
    );
    pool.register(
        kinds::GRAPH_INGEST,
        Arc::new(GraphIngestHandler::new(storage.clone(), queue.clone(), retry.clone(), graph.clone())),
        None,
    );
    pool.register(
        kinds::ANALYZE,
        Arc::new(AnalyzeHandler::new(storage.clone(), queue.clone(), retry.clone(), llm, models)),
        None,
    );
    pool.register(
        kinds::EXTRACT_FINANCIALS,
        Arc::new(ExtractFinancialsHandler::new(storage.clone(), retry.clone())),
        None,
    );
    let worker_handles = pool.start();

    let reranker = Arc::new(providers::IdentityRerankProvider);
    let retrieval = Arc::new(HybridRetrievalService::new(graph, reranker));
    let membership = Arc::new(tenant::EnvMembershipResolver::from_env());

    let state = Arc::new(http::AppState {
        storage,
        queue,
        retry,
        retrieval,
        membership,
        api_key: std::env::var("DOCPIPE_API_KEY").ok(),
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind, "docpipe listening");
    axum::serve(listener, app).await?;

    pool.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }
    Ok(())
}
