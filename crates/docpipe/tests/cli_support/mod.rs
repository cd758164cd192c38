#![allow(dead_code)]

use docpipe::http::AppState;
use docpipe::providers::{IdentityRerankProvider, UnconfiguredGraphEngine};
use docpipe::tenant::EnvMembershipResolver;
use docpipe_db::{Deal, InMemoryStorageAdapter};
use docpipe_protocol::{DealId, Document, DocumentId, OrganizationId, UserId};
use docpipe_queue::InMemoryJobQueue;
use docpipe_retrieval::HybridRetrievalService;
use docpipe_retry::RetryManager;
use std::path::PathBuf;
use std::sync::Arc;

pub fn docpipe_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docpipe"))
}

/// A seeded document/deal plus a ready-to-route `AppState`, wired with
/// in-memory adapters so tests never touch the filesystem.
pub struct TestFixture {
    pub state: Arc<AppState>,
    pub storage: Arc<InMemoryStorageAdapter>,
    pub queue: Arc<InMemoryJobQueue>,
    pub organization_id: OrganizationId,
    pub deal_id: DealId,
    pub document_id: DocumentId,
    pub user_id: UserId,
}

impl TestFixture {
    pub fn new() -> Self {
        let organization_id = OrganizationId::new();
        let deal_id = DealId::new();
        let document_id = DocumentId::new();
        let user_id = UserId::new();

        let storage = Arc::new(InMemoryStorageAdapter::new());
        storage.seed_deal(Deal {
            id: deal_id,
            organization_id,
            name: "Project Atlas".to_string(),
        });
        storage.seed_document(Document::new(document_id, organization_id, deal_id, "term_sheet.pdf", "application/pdf"));

        let queue = Arc::new(InMemoryJobQueue::new());
        let retry = Arc::new(RetryManager::with_queue(storage.clone(), queue.clone()));
        let graph = Arc::new(UnconfiguredGraphEngine);
        let reranker = Arc::new(IdentityRerankProvider);
        let retrieval = Arc::new(HybridRetrievalService::new(graph, reranker));
        let membership = Arc::new(EnvMembershipResolver::from_env());

        let state = Arc::new(AppState {
            storage: storage.clone(),
            queue: queue.clone(),
            retry,
            retrieval,
            membership,
            api_key: None,
        });

        Self {
            state,
            storage,
            queue,
            organization_id,
            deal_id,
            document_id,
            user_id,
        }
    }
}

/// Builds a fresh `AppState` sharing the fixture's storage/queue/retry, for
/// tests that need to swap one field (e.g. `membership`) without
/// reconstructing everything.
pub fn test_state(fixture: &TestFixture) -> AppState {
    AppState {
        storage: fixture.storage.clone(),
        queue: fixture.queue.clone(),
        retry: Arc::new(RetryManager::with_queue(fixture.storage.clone(), fixture.queue.clone())),
        retrieval: Arc::new(HybridRetrievalService::new(Arc::new(UnconfiguredGraphEngine), Arc::new(IdentityRerankProvider))),
        membership: Arc::new(EnvMembershipResolver::from_env()),
        api_key: None,
    }
}
