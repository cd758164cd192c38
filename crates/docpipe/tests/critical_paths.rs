//! End-to-end tests for the `docpipe` HTTP surface and CLI, exercised
//! against the real (in-memory) storage and queue adapters.
//!
//! ## Test philosophy
//!
//! 1. Test PUBLIC interfaces only (the HTTP router and the compiled binary)
//! 2. Use real adapters, not mocked traits
//! 3. Prefer end-to-end flows over unit-only coverage

use axum::body::Body;
use axum::http::{Request, StatusCode};
use docpipe::http::{router, AppState};
use docpipe::tenant::EnvMembershipResolver;
use docpipe_db::StorageAdapter;
use docpipe_protocol::{DealId, DocumentId, OrganizationId, Stage};
use docpipe_queue::JobQueue;
use docpipe_retry::MAX_TOTAL_RETRY_ATTEMPTS;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

mod cli_support;
use cli_support::{test_state, TestFixture};

/// Must compile and print its help text.
#[cfg(feature = "full")]
#[test]
fn test_binary_runs() {
    let output = std::process::Command::new(cli_support::docpipe_bin())
        .arg("--help")
        .output()
        .expect("run docpipe --help");
    let combined = format!("{}{}", String::from_utf8_lossy(&output.stdout), String::from_utf8_lossy(&output.stderr));
    assert!(combined.contains("Usage") || combined.contains("Commands"), "expected help text, got: {combined}");
}

mod webhooks {
    use super::*;

    /// A document with no prior stage enqueues a parse job.
    #[tokio::test]
    async fn test_document_uploaded_enqueues_parse_job() {
        let fixture = TestFixture::new();
        let app = router(fixture.state.clone());

        let body = serde_json::json!({
            "document_id": fixture.document_id,
            "deal_id": fixture.deal_id,
            "user_id": fixture.user_id,
            "gcs_path": "gs://bucket/doc.pdf",
            "file_type": "application/pdf",
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/document-uploaded")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert!(payload["job_id"].is_string());

        let jobs = fixture.queue.list_active().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, docpipe_protocol::job::kinds::PARSE);
    }

    /// A batch upload with one bad document still processes the rest.
    #[tokio::test]
    async fn test_batch_upload_is_partial_failure_tolerant() {
        let fixture = TestFixture::new();
        let app = router(fixture.state.clone());

        let good = serde_json::json!({
            "document_id": fixture.document_id,
            "deal_id": fixture.deal_id,
            "user_id": fixture.user_id,
            "gcs_path": "gs://bucket/a.pdf",
            "file_type": "application/pdf",
        });
        let also_good = serde_json::json!({
            "document_id": DocumentId::new(),
            "deal_id": fixture.deal_id,
            "user_id": fixture.user_id,
            "gcs_path": "gs://bucket/b.pdf",
            "file_type": "application/pdf",
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/document-uploaded/batch")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::json!([good, also_good]).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        let items = payload.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item["success"] == true));
    }

    /// An API key configured on the server rejects requests without it.
    #[tokio::test]
    async fn test_webhook_rejects_missing_api_key() {
        let fixture = TestFixture::new();
        let state = AppState {
            api_key: Some("secret".to_string()),
            ..Arc::try_unwrap(fixture.state).ok().unwrap()
        };
        let app = router(Arc::new(state));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/document-uploaded")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "document_id": DocumentId::new(),
                            "deal_id": DealId::new(),
                            "user_id": docpipe_protocol::UserId::new(),
                            "gcs_path": "gs://bucket/doc.pdf",
                            "file_type": "application/pdf",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

mod retry {
    use super::*;

    /// Retrying a document past its lifetime attempt cap returns exactly
    /// the user-facing message the retry manager owns.
    #[tokio::test]
    async fn test_retry_denied_past_attempt_cap() {
        let fixture = TestFixture::new();
        let mut document = fixture.storage.get_document(fixture.document_id).await.unwrap();
        for attempt in 1..=MAX_TOTAL_RETRY_ATTEMPTS {
            let classified = docpipe_protocol::classify("connection refused");
            document
                .retry_history
                .push(docpipe_protocol::RetryHistoryEntry::new(attempt, Stage::Parsed.as_str(), &classified));
        }
        fixture.storage.seed_document(document);

        let app = router(fixture.state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhooks/retry/{}?gcs_path=gs://bucket/doc.pdf", fixture.document_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Maximum retry attempts (5) reached.");
    }

    /// Retrying the parse stage without `gcs_path` is rejected; supplying
    /// it enqueues the retry job.
    #[tokio::test]
    async fn test_retry_parse_stage_requires_gcs_path() {
        let fixture = TestFixture::new();
        let app = router(fixture.state.clone());

        let missing = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhooks/retry/{}", fixture.document_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let with_path = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhooks/retry/{}?gcs_path=gs://bucket/doc.pdf", fixture.document_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(with_path.status(), StatusCode::OK);
    }
}

mod tenancy {
    use super::*;

    /// A request with no `x-organization-id` header is rejected with 400,
    /// distinct from the 403 a non-member gets.
    #[tokio::test]
    async fn test_missing_org_header_is_bad_request() {
        let fixture = TestFixture::new();
        let app = router(fixture.state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/processing/queue")
                    .header("authorization", format!("Bearer {}", fixture.user_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// A search request for a different organization than the
    /// authenticated tenant is rejected, never silently re-scoped.
    #[tokio::test]
    async fn test_cross_tenant_search_is_forbidden() {
        let fixture = TestFixture::new();
        let app = router(fixture.state.clone());

        let other_org = OrganizationId::new();
        let body = serde_json::json!({
            "query": "revenue guidance",
            "deal_id": fixture.deal_id,
            "organization_id": other_org,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/search/hybrid")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", fixture.user_id))
                    .header("x-organization-id", fixture.organization_id.to_string())
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    /// A denied organization (superadmin-bypass env var in reverse) is
    /// rejected even with a well-formed bearer token and org header.
    #[tokio::test]
    async fn test_denied_organization_is_forbidden() {
        let fixture = TestFixture::new();
        std::env::set_var("DOCPIPE_DENIED_ORGANIZATIONS", fixture.organization_id.to_string());
        let membership = Arc::new(EnvMembershipResolver::from_env());
        std::env::remove_var("DOCPIPE_DENIED_ORGANIZATIONS");

        let state = Arc::new(AppState {
            membership,
            ..test_state(&fixture)
        });
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/processing/queue")
                    .header("authorization", format!("Bearer {}", fixture.user_id))
                    .header("x-organization-id", fixture.organization_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

mod queue_introspection {
    use super::*;

    /// A failed job shows up in `/api/processing/queue` with a `failed`
    /// status label, not just in-flight ones.
    #[tokio::test]
    async fn test_failed_jobs_are_visible_in_queue_listing() {
        let fixture = TestFixture::new();
        let job_id = fixture
            .queue
            .enqueue(
                docpipe_protocol::job::kinds::PARSE,
                serde_json::json!({"document_id": fixture.document_id, "deal_id": fixture.deal_id}),
                docpipe_protocol::EnqueueOptions::default(),
            )
            .await
            .unwrap();
        fixture.queue.dequeue(docpipe_protocol::job::kinds::PARSE, 1).await.unwrap();
        fixture.queue.fail(job_id, "parse error").await.unwrap();

        let app = router(fixture.state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/processing/queue")
                    .header("authorization", format!("Bearer {}", fixture.user_id))
                    .header("x-organization-id", fixture.organization_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        let jobs = payload["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["status"], "failed");
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
