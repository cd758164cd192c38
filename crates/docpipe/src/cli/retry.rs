//! `docpipe retry`: manually retry a document from the CLI, honoring the
//! same cooldown and attempt cap as the `/webhooks/retry` endpoint (§4.C).

use docpipe_db::StorageAdapter;
use docpipe_protocol::{DocumentId, Stage};
use docpipe_retry::RetryManager;
use std::sync::Arc;

pub async fn retry_document(
    storage: Arc<dyn StorageAdapter>,
    retry: Arc<RetryManager>,
    document_id: DocumentId,
    gcs_path: Option<String>,
) -> anyhow::Result<()> {
    let document = storage.get_document(document_id).await?;

    if let Err(rejection) = retry.can_manual_retry(&document, chrono::Utc::now()) {
        println!("{}", rejection.message());
        return Ok(());
    }

    let Some(stage) = retry.get_next_retry_stage(document.last_completed_stage) else {
        println!("document {document_id} has already completed every stage");
        return Ok(());
    };

    if stage == Stage::Parsed && gcs_path.is_none() {
        println!("retrying the parse stage requires --gcs-path");
        return Ok(());
    }

    let envelope = serde_json::json!({
        "document_id": document.id,
        "deal_id": document.deal_id,
        "gcs_path": gcs_path.unwrap_or_default(),
        "file_type": document.content_type,
    });

    let job_id = retry.enqueue_stage_retry(envelope, stage).await?;
    println!("enqueued retry of stage {stage} as job {job_id}");
    Ok(())
}
