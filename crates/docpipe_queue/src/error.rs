use docpipe_protocol::JobId;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {0} is not in state 'created' and cannot be cancelled")]
    NotCancellable(JobId),
    #[error("duckdb error: {0}")]
    Duckdb(#[from] duckdb::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
