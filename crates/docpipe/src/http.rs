//! The HTTP surface (§6): ingest/retry webhooks, queue introspection and
//! cancellation, and hybrid search, each behind the tenant or API-key
//! boundary §6 describes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use docpipe_db::StorageAdapter;
use docpipe_protocol::job::kinds;
use docpipe_protocol::{DealId, DocumentId, EnqueueOptions, JobId, JobState, Namespace, OrganizationId, Stage, UserId};
use docpipe_queue::JobQueue;
use docpipe_retrieval::HybridRetrievalService;
use docpipe_retry::RetryManager;
use docpipe_tenant::{check_membership, MembershipError, MembershipResolver};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::tenant::user_id_from_bearer;

pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub queue: Arc<dyn JobQueue>,
    pub retry: Arc<RetryManager>,
    pub retrieval: Arc<HybridRetrievalService>,
    pub membership: Arc<dyn MembershipResolver>,
    pub api_key: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let webhooks = Router::new()
        .route("/webhooks/document-uploaded", post(document_uploaded))
        .route("/webhooks/document-uploaded/batch", post(document_uploaded_batch))
        .route("/webhooks/retry/:document_id", post(retry_document));

    let api = Router::new()
        .route("/api/processing/queue", get(list_queue))
        .route("/api/processing/queue/:job_id", delete(cancel_job))
        .route("/api/search/hybrid", post(search_hybrid));

    Router::new()
        .merge(webhooks)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Validates `x-api-key` against the configured webhook key. Skipped
/// (permissive) when no key is configured, matching `Settings::from_env`'s
/// "missing optional settings fall back to sensible defaults" convention.
fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "missing or invalid API key"))
    }
}

/// Resolves tenant context from `Authorization`/`x-organization-id`,
/// enforcing the §6 status-code mapping for the failure cases.
async fn resolve_tenant(state: &AppState, headers: &HeaderMap) -> Result<(UserId, OrganizationId), Response> {
    let user_id = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(user_id_from_bearer)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing or invalid Authorization header"))?;

    let organization_id = headers
        .get("x-organization-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| OrganizationId::from_str(v).ok());

    match check_membership(state.membership.as_ref(), user_id, organization_id).await {
        Ok(()) => Ok((user_id, organization_id.expect("membership check only succeeds with Some"))),
        Err(MembershipError::MissingOrganizationHeader) => {
            Err(api_error(StatusCode::BAD_REQUEST, "missing x-organization-id header"))
        }
        Err(MembershipError::NotAMember) => Err(api_error(StatusCode::FORBIDDEN, "not a member of this organization")),
    }
}

#[derive(Debug, Deserialize)]
struct DocumentUploadedPayload {
    document_id: DocumentId,
    deal_id: DealId,
    #[allow(dead_code)]
    user_id: UserId,
    gcs_path: String,
    file_type: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    is_retry: bool,
    #[serde(default)]
    last_completed_stage: Option<Stage>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
}

async fn enqueue_document(state: &AppState, payload: DocumentUploadedPayload) -> WebhookResponse {
    let kind = match payload.last_completed_stage {
        None => kinds::PARSE,
        Some(stage) => match stage.next() {
            Some(next_stage) => stage_job_kind(next_stage),
            None => {
                return WebhookResponse {
                    success: true,
                    message: "document already complete".to_string(),
                    job_id: None,
                }
            }
        },
    };

    let envelope = serde_json::json!({
        "document_id": payload.document_id,
        "deal_id": payload.deal_id,
        "gcs_path": payload.gcs_path,
        "file_type": payload.file_type,
        "file_name": payload.file_name,
        "is_retry": payload.is_retry,
    });

    match state.queue.enqueue(kind, envelope, EnqueueOptions::default()).await {
        Ok(job_id) => WebhookResponse {
            success: true,
            message: "enqueued".to_string(),
            job_id: Some(job_id),
        },
        Err(error) => WebhookResponse {
            success: false,
            message: error.to_string(),
            job_id: None,
        },
    }
}

fn stage_job_kind(stage: Stage) -> &'static str {
    match stage {
        Stage::Parsed => kinds::PARSE,
        Stage::Embedded => kinds::EMBED,
        Stage::GraphitiIngested => kinds::GRAPH_INGEST,
        Stage::Analyzed => kinds::ANALYZE,
        Stage::ExtractedFinancials => kinds::EXTRACT_FINANCIALS,
    }
}

async fn document_uploaded(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DocumentUploadedPayload>,
) -> Response {
    if let Err(response) = check_api_key(&state, &headers) {
        return response;
    }
    Json(enqueue_document(&state, payload).await).into_response()
}

async fn document_uploaded_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payloads): Json<Vec<DocumentUploadedPayload>>,
) -> Response {
    if let Err(response) = check_api_key(&state, &headers) {
        return response;
    }
    let mut responses = Vec::with_capacity(payloads.len());
    for payload in payloads {
        responses.push(enqueue_document(&state, payload).await);
    }
    Json(responses).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct RetryQuery {
    #[serde(default)]
    gcs_path: Option<String>,
}

async fn retry_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<DocumentId>,
    Query(query): Query<RetryQuery>,
) -> Response {
    if let Err(response) = check_api_key(&state, &headers) {
        return response;
    }

    let document = match state.storage.get_document(document_id).await {
        Ok(document) => document,
        Err(_) => return api_error(StatusCode::NOT_FOUND, "document not found"),
    };

    if let Err(rejection) = state.retry.can_manual_retry(&document, chrono::Utc::now()) {
        return api_error(StatusCode::TOO_MANY_REQUESTS, rejection.message());
    }

    let Some(stage) = state.retry.get_next_retry_stage(document.last_completed_stage) else {
        return api_error(StatusCode::CONFLICT, "document has already completed every stage");
    };

    if stage == Stage::Parsed && query.gcs_path.is_none() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "retrying the parse stage requires a ?gcs_path= query parameter",
        );
    }

    let envelope = serde_json::json!({
        "document_id": document.id,
        "deal_id": document.deal_id,
        "gcs_path": query.gcs_path.unwrap_or_default(),
        "file_type": document.content_type,
    });

    match state.retry.enqueue_stage_retry(envelope, stage).await {
        Ok(job_id) => Json(WebhookResponse {
            success: true,
            message: format!("retrying stage {stage}"),
            job_id: Some(job_id),
        })
        .into_response(),
        Err(error) => api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct QueueListQuery {
    project_id: Option<DealId>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QueueJobView {
    id: JobId,
    document_id: Option<DocumentId>,
    document_name: Option<String>,
    file_type: Option<String>,
    status: &'static str,
    processing_stage: Option<&'static str>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    time_in_queue: i64,
    estimated_completion: Option<chrono::DateTime<chrono::Utc>>,
    retry_count: u32,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueueListResponse {
    jobs: Vec<QueueJobView>,
    total: usize,
    has_more: bool,
}

fn job_status_label(state: JobState) -> &'static str {
    match state {
        JobState::Created | JobState::Retry => "queued",
        JobState::Active => "processing",
        JobState::Failed => "failed",
        JobState::Completed | JobState::Cancelled => "completed",
    }
}

fn processing_stage_label(kind: &str) -> Option<&'static str> {
    match kind {
        k if k == kinds::PARSE => Some("parsing"),
        k if k == kinds::EMBED || k == kinds::GRAPH_INGEST => Some("embedding"),
        k if k == kinds::ANALYZE || k == kinds::EXTRACT_FINANCIALS => Some("analyzing"),
        _ => None,
    }
}

/// Base processing times in seconds for {parsing, embedding, analyzing},
/// scaled 1.5x for PDF and 2.0x for spreadsheet file types (§6).
fn estimate_remaining_seconds(kind: &str, file_type: &str) -> Option<i64> {
    let base = match kind {
        k if k == kinds::PARSE => 30,
        k if k == kinds::EMBED || k == kinds::GRAPH_INGEST => 20,
        k if k == kinds::ANALYZE || k == kinds::EXTRACT_FINANCIALS => 60,
        _ => return None,
    };
    let lower = file_type.to_lowercase();
    let multiplier = if lower.contains("pdf") {
        1.5
    } else if lower.contains("spreadsheet") || lower.contains("excel") || lower.contains("xlsx") || lower.contains("xls") {
        2.0
    } else {
        1.0
    };
    Some((base as f64 * multiplier) as i64)
}

async fn list_queue(State(state): State<Arc<AppState>>, headers: HeaderMap, Query(query): Query<QueueListQuery>) -> Response {
    if let Err(response) = resolve_tenant(&state, &headers).await {
        return response;
    }

    let jobs = match state.queue.list_active().await {
        Ok(jobs) => jobs,
        Err(error) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    let now = chrono::Utc::now();
    let mut views = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let document_id = job.payload.get("document_id").and_then(|v| v.as_str()).and_then(|s| DocumentId::from_str(s).ok());
        let deal_id = job.payload.get("deal_id").and_then(|v| v.as_str()).and_then(|s| DealId::from_str(s).ok());
        if let Some(project_id) = query.project_id {
            if deal_id != Some(project_id) {
                continue;
            }
        }

        let file_type = job.payload.get("file_type").and_then(|v| v.as_str()).map(str::to_string);
        let document_name = match document_id {
            Some(id) => state.storage.get_document(id).await.ok().map(|d| d.name),
            None => None,
        };
        let estimated_completion = file_type
            .as_deref()
            .and_then(|ft| estimate_remaining_seconds(&job.kind, ft))
            .map(|secs| now + chrono::Duration::seconds(secs));
        let error = job.output.as_ref().and_then(|v| v.get("error")).and_then(|v| v.as_str()).map(str::to_string);

        views.push(QueueJobView {
            id: job.id,
            document_id,
            document_name,
            file_type,
            status: job_status_label(job.state),
            processing_stage: processing_stage_label(&job.kind),
            created_at: job.created_on,
            started_at: job.started_on,
            time_in_queue: (now - job.created_on).num_seconds().max(0),
            estimated_completion,
            retry_count: job.retry_count,
            error,
        });
    }

    let total = views.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(total);
    let page: Vec<QueueJobView> = views.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + page.len() < total;

    Json(QueueListResponse {
        jobs: page,
        total,
        has_more,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CancelQuery {
    project_id: Option<DealId>,
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<JobId>,
    Query(query): Query<CancelQuery>,
) -> Response {
    if let Err(response) = resolve_tenant(&state, &headers).await {
        return response;
    }

    let job = match state.queue.get(job_id).await {
        Ok(job) => job,
        Err(_) => return api_error(StatusCode::NOT_FOUND, "job not found"),
    };

    if let Some(project_id) = query.project_id {
        let deal_id = job.payload.get("deal_id").and_then(|v| v.as_str()).and_then(|s| DealId::from_str(s).ok());
        if deal_id != Some(project_id) {
            return api_error(StatusCode::FORBIDDEN, "job does not belong to this project");
        }
    }

    match state.queue.cancel(job_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(_) => api_error(StatusCode::BAD_REQUEST, "job is not in a cancellable state"),
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    deal_id: DealId,
    organization_id: OrganizationId,
    #[serde(default)]
    #[allow(dead_code)]
    num_candidates: Option<usize>,
    #[serde(default)]
    #[allow(dead_code)]
    num_results: Option<usize>,
}

async fn search_hybrid(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(request): Json<SearchRequest>) -> Response {
    let (_, organization_id) = match resolve_tenant(&state, &headers).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    if organization_id != request.organization_id {
        return api_error(StatusCode::FORBIDDEN, "organization_id does not match the authenticated tenant");
    }

    let namespace = Namespace::new(request.organization_id, request.deal_id);
    let response = state.retrieval.retrieve_with_fallback(namespace, &request.query).await;
    Json(serde_json::json!({
        "results": response.results.iter().map(|r| serde_json::json!({"text": r.text, "score": r.score})).collect::<Vec<_>>(),
        "sources": response.sources.iter().map(|s| serde_json::json!({
            "kind": format!("{:?}", s.kind).to_lowercase(),
            "text": s.text,
            "confidence": s.confidence,
            "page": s.page,
            "chunk_index": s.chunk_index,
            "title": s.title,
        })).collect::<Vec<_>>(),
        "entities": response.entities,
        "total_latency_ms": response.total_latency_ms,
        "graph_ms": response.graph_ms,
        "rerank_ms": response.rerank_ms,
        "candidate_count": response.candidate_count,
    }))
    .into_response()
}
