//! Retry manager (§4.C): classifies errors, decides retry eligibility, and
//! maintains per-document pipeline-stage state.

use docpipe_db::StorageAdapter;
use docpipe_protocol::{
    classify, job::kinds, ClassifiedError, Document, DocumentStatus, EnqueueOptions,
    RetryHistoryEntry, Stage,
};
use docpipe_queue::JobQueue;
use std::sync::Arc;
use std::time::Duration;

/// The job kind that resumes the pipeline at a given stage.
fn stage_job_kind(stage: Stage) -> &'static str {
    match stage {
        Stage::Parsed => kinds::PARSE,
        Stage::Embedded => kinds::EMBED,
        Stage::GraphitiIngested => kinds::GRAPH_INGEST,
        Stage::Analyzed => kinds::ANALYZE,
        Stage::ExtractedFinancials => kinds::EXTRACT_FINANCIALS,
    }
}

/// The stage a job kind advances, the inverse of [`stage_job_kind`]. Used by
/// the worker pool to resolve which stage a failed job belongs to before
/// calling [`RetryManager::handle_job_failure`].
pub fn stage_for_job_kind(kind: &str) -> Option<Stage> {
    match kind {
        kinds::PARSE => Some(Stage::Parsed),
        kinds::EMBED => Some(Stage::Embedded),
        kinds::GRAPH_INGEST => Some(Stage::GraphitiIngested),
        kinds::ANALYZE => Some(Stage::Analyzed),
        kinds::EXTRACT_FINANCIALS => Some(Stage::ExtractedFinancials),
        _ => None,
    }
}

/// Per-stage attempt cap: a stage may be retried at most this many times
/// before the document moves to a stage-specific failed status (§4.C).
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Lifetime attempt cap across all stages, guarding against poison-pill
/// documents (§4.C, §5).
pub const MAX_TOTAL_RETRY_ATTEMPTS: u32 = 5;

/// Minimum time between manual-retry requests (§4.C).
pub const MANUAL_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error(transparent)]
    Storage(#[from] docpipe_db::StorageError),
    #[error(transparent)]
    Queue(#[from] docpipe_queue::QueueError),
}

/// Outcome of [`RetryManager::handle_job_failure`].
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retryable and under the per-stage cap: the caller should rethrow so
    /// the job queue reschedules the job.
    Retry,
    /// Non-retryable, or the per-stage cap was hit: the document has been
    /// moved to its stage-specific failed status.
    PermanentlyFailed(DocumentStatus),
}

/// Why a manual retry request was rejected (§4.C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualRetryRejection {
    TotalAttemptsExhausted,
    CooldownActive { seconds_remaining: u64 },
}

impl ManualRetryRejection {
    /// User-facing reason text for the rejection.
    pub fn message(&self) -> String {
        match self {
            Self::TotalAttemptsExhausted => {
                format!("Maximum retry attempts ({MAX_TOTAL_RETRY_ATTEMPTS}) reached.")
            }
            Self::CooldownActive { seconds_remaining } => {
                format!("Please wait {seconds_remaining}s before retrying again.")
            }
        }
    }
}

/// The failed `DocumentStatus` a stage maps to when its attempts are
/// exhausted. Only parse, embed, and analyze have dedicated failed
/// statuses in the closed enum; graph-ingest and extract-financials fall
/// back to the generic `Failed` status.
fn stage_failed_status(stage: Stage) -> DocumentStatus {
    match stage {
        Stage::Parsed => DocumentStatus::Failed,
        Stage::Embedded => DocumentStatus::EmbeddingFailed,
        Stage::GraphitiIngested => DocumentStatus::Failed,
        Stage::Analyzed => DocumentStatus::AnalysisFailed,
        Stage::ExtractedFinancials => DocumentStatus::Failed,
    }
}

/// The in-progress `DocumentStatus` a stage sets before being (re)run.
fn stage_in_progress_status(stage: Stage) -> DocumentStatus {
    match stage {
        Stage::Parsed => DocumentStatus::Parsing,
        Stage::Embedded => DocumentStatus::Embedding,
        Stage::GraphitiIngested => DocumentStatus::GraphitiIngesting,
        Stage::Analyzed => DocumentStatus::Analyzing,
        Stage::ExtractedFinancials => DocumentStatus::ExtractingFinancials,
    }
}

/// Count attempts for one stage within a document's retry history.
fn stage_attempt_count(history: &[RetryHistoryEntry], stage: Stage) -> u32 {
    history.iter().filter(|e| e.stage == stage.as_str()).count() as u32
}

pub struct RetryManager {
    storage: Arc<dyn StorageAdapter>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl RetryManager {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            queue: None,
        }
    }

    /// Attach a job queue so [`RetryManager::enqueue_stage_retry`] can
    /// re-enqueue the job kind that resumes a given stage.
    pub fn with_queue(storage: Arc<dyn StorageAdapter>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            storage,
            queue: Some(queue),
        }
    }

    /// Re-enqueue the job kind that resumes `stage`, carrying the same
    /// identifying envelope fields as the original job, with `is_retry` set.
    pub async fn enqueue_stage_retry(
        &self,
        envelope: serde_json::Value,
        stage: Stage,
    ) -> Result<docpipe_protocol::JobId, RetryError> {
        let queue = self
            .queue
            .as_ref()
            .expect("enqueue_stage_retry requires a queue; construct via RetryManager::with_queue");
        let mut payload = envelope;
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert("is_retry".to_string(), serde_json::Value::Bool(true));
        }
        let job_id = queue
            .enqueue(stage_job_kind(stage), payload, EnqueueOptions::default())
            .await?;
        Ok(job_id)
    }

    /// Classify a raw error message (§4.C, §4.K). Stateless and pure;
    /// delegated straight to the shared classifier so retry decisions and
    /// the external HTTP surface agree on exactly one taxonomy.
    pub fn classify(&self, raw_message: &str) -> ClassifiedError {
        classify(raw_message)
    }

    /// Handle a stage handler's failure:
    /// 1. Store the classified error on the document.
    /// 2. Append a retry-history entry.
    /// 3. If retryable and under the per-stage cap, signal `Retry`;
    ///    otherwise move the document to its stage-specific failed status.
    pub async fn handle_job_failure(
        &self,
        document_id: docpipe_protocol::DocumentId,
        stage: Stage,
        raw_message: &str,
    ) -> Result<RetryDecision, RetryError> {
        let classified = self.classify(raw_message);
        self.storage
            .update_processing_error(document_id, classified.clone())
            .await?;

        let document = self.storage.get_document(document_id).await?;
        let attempt = document.retry_history.len() as u32 + 1;
        let entry = RetryHistoryEntry::new(attempt, stage.as_str(), &classified);
        self.storage.append_retry_history(document_id, entry).await?;

        let history = self.storage.get_retry_history(document_id).await?;
        let stage_attempts = stage_attempt_count(&history, stage);

        if classified.retryable && stage_attempts < MAX_RETRY_ATTEMPTS {
            return Ok(RetryDecision::Retry);
        }

        let failed_status = stage_failed_status(stage);
        self.storage
            .update_document_status(document_id, failed_status, Some(classified))
            .await?;
        Ok(RetryDecision::PermanentlyFailed(failed_status))
    }

    /// A manual retry is accepted only if total attempts are under the
    /// lifetime cap and at least the cooldown has elapsed since the most
    /// recent attempt (§4.C).
    pub fn can_manual_retry(
        &self,
        document: &Document,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), ManualRetryRejection> {
        if document.retry_history.len() as u32 >= MAX_TOTAL_RETRY_ATTEMPTS {
            return Err(ManualRetryRejection::TotalAttemptsExhausted);
        }
        if let Some(last) = document.retry_history.last() {
            let elapsed = now.signed_duration_since(last.timestamp);
            let cooldown = chrono::Duration::from_std(MANUAL_RETRY_COOLDOWN).unwrap();
            if elapsed < cooldown {
                let remaining = (cooldown - elapsed).num_seconds().max(0) as u64;
                return Err(ManualRetryRejection::CooldownActive {
                    seconds_remaining: remaining,
                });
            }
        }
        Ok(())
    }

    /// Determine the next stage to run from `last_completed_stage` (§4.C):
    /// `None` (pending) resumes at the parse stage; otherwise the stage
    /// graph's successor of the last completed stage.
    pub fn get_next_retry_stage(&self, last_completed_stage: Option<Stage>) -> Option<Stage> {
        match last_completed_stage {
            None => Some(Stage::Parsed),
            Some(stage) => stage.next(),
        }
    }

    /// Before a retry of stage `S`: clear partial data for `S`, then set
    /// the document status to `S`'s in-progress status (§4.C).
    pub async fn prepare_stage_retry(
        &self,
        document_id: docpipe_protocol::DocumentId,
        stage: Stage,
    ) -> Result<(), RetryError> {
        self.storage.clear_stage_data(document_id, stage).await?;
        self.storage.clear_processing_error(document_id).await?;
        self.storage
            .update_document_status(document_id, stage_in_progress_status(stage), None)
            .await?;
        Ok(())
    }

    /// Advance the document's stage pointer once a stage completes successfully.
    pub async fn mark_stage_complete(
        &self,
        document_id: docpipe_protocol::DocumentId,
        stage: Stage,
    ) -> Result<(), RetryError> {
        self.storage.update_document_stage(document_id, stage).await?;
        Ok(())
    }
}
