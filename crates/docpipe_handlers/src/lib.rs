//! Stage handlers for the staged document pipeline (§4.E–§4.H): parse,
//! embed, graph-ingest, analyze, and extract-financials.

pub mod analyze;
pub mod embed;
pub mod extract_financials;
pub mod graph_ingest;
pub mod parse;
pub mod providers;

pub use analyze::AnalyzeHandler;
pub use embed::EmbedChunksHandler;
pub use extract_financials::ExtractFinancialsHandler;
pub use graph_ingest::GraphIngestHandler;
pub use parse::{is_spreadsheet_content_type, ParseFailure, ParseHandler, ParseResult};
pub use providers::{EmbeddingProvider, FastPathNode, GraphCandidate, GraphEngine, LlmClient, LlmResponse, ObjectStore, RerankProvider};
