use docpipe_protocol::DocumentId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("deal {0} not found")]
    DealNotFound(uuid::Uuid),
    #[error("vector count {vectors} does not match chunk-id count {chunk_ids}")]
    EmbeddingLengthMismatch { vectors: usize, chunk_ids: usize },
    #[error("duckdb error: {0}")]
    Duckdb(#[from] duckdb::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
