//! The [`StageHandler`] contract (§4.B).

use async_trait::async_trait;
use docpipe_protocol::Job;

/// A handler receives a job and returns an output envelope on success, or
/// an error message on failure. The worker pool calls `queue.complete` on
/// success and routes failures through the retry manager before they reach
/// `queue.fail`.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String>;
}
