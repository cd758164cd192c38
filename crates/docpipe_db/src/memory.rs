//! An in-memory [`StorageAdapter`], used by handler and retry-manager tests.

use crate::adapter::{Deal, StorageAdapter};
use crate::error::StorageError;
use async_trait::async_trait;
use docpipe_protocol::{
    Chunk, ClassifiedError, DealId, Document, DocumentId, DocumentStatus, FinancialMetric,
    Formula, RetryHistoryEntry, Stage, Table,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    documents: HashMap<DocumentId, Document>,
    deals: HashMap<DealId, Deal>,
    chunks: HashMap<DocumentId, Vec<Chunk>>,
    tables: HashMap<DocumentId, Vec<Table>>,
    formulas: HashMap<DocumentId, Vec<Formula>>,
    financial_metrics: HashMap<DocumentId, Vec<FinancialMetric>>,
}

pub struct InMemoryStorageAdapter {
    state: Mutex<State>,
}

impl Default for InMemoryStorageAdapter {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl InMemoryStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_document(&self, document: Document) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(document.id, document);
    }

    pub fn seed_deal(&self, deal: Deal) {
        self.state.lock().unwrap().deals.insert(deal.id, deal);
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorageAdapter {
    async fn get_document(&self, id: DocumentId) -> Result<Document, StorageError> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(&id)
            .cloned()
            .ok_or(StorageError::DocumentNotFound(id))
    }

    async fn get_deal(&self, id: DealId) -> Result<Deal, StorageError> {
        self.state
            .lock()
            .unwrap()
            .deals
            .get(&id)
            .cloned()
            .ok_or(StorageError::DealNotFound(id.as_uuid()))
    }

    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error: Option<ClassifiedError>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?;
        doc.status = status;
        if error.is_some() {
            doc.processing_error = error;
        }
        Ok(())
    }

    async fn update_document_stage(
        &self,
        id: DocumentId,
        last_completed_stage: Stage,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?;
        doc.last_completed_stage = Some(last_completed_stage);
        Ok(())
    }

    async fn store_chunks_and_update_status(
        &self,
        id: DocumentId,
        chunks: Vec<Chunk>,
        tables: Vec<Table>,
        formulas: Vec<Formula>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .status = new_status;
        state.chunks.insert(id, chunks);
        state.tables.insert(id, tables);
        state.formulas.insert(id, formulas);
        Ok(())
    }

    async fn get_chunks_by_document(&self, id: DocumentId) -> Result<Vec<Chunk>, StorageError> {
        let mut chunks = self
            .state
            .lock()
            .unwrap()
            .chunks
            .get(&id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn update_embeddings_and_status(
        &self,
        id: DocumentId,
        chunk_ids: Vec<uuid::Uuid>,
        vectors: Vec<Vec<f32>>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError> {
        if chunk_ids.len() != vectors.len() {
            return Err(StorageError::EmbeddingLengthMismatch {
                vectors: vectors.len(),
                chunk_ids: chunk_ids.len(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if let Some(chunks) = state.chunks.get_mut(&id) {
            for (chunk_id, vector) in chunk_ids.iter().zip(vectors.into_iter()) {
                if let Some(chunk) = chunks.iter_mut().find(|c| &c.id == chunk_id) {
                    chunk.embedding = Some(vector);
                }
            }
        }
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .status = new_status;
        Ok(())
    }

    async fn store_financial_metrics_and_update_status(
        &self,
        id: DocumentId,
        metrics: Vec<FinancialMetric>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.financial_metrics.insert(id, metrics);
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .status = new_status;
        Ok(())
    }

    async fn delete_financial_metrics(&self, id: DocumentId) -> Result<(), StorageError> {
        self.state.lock().unwrap().financial_metrics.remove(&id);
        Ok(())
    }

    async fn clear_processing_error(&self, id: DocumentId) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .processing_error = None;
        Ok(())
    }

    async fn update_processing_error(
        &self,
        id: DocumentId,
        classified: ClassifiedError,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .processing_error = Some(classified);
        Ok(())
    }

    async fn append_retry_history(
        &self,
        id: DocumentId,
        entry: RetryHistoryEntry,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .retry_history
            .push(entry);
        Ok(())
    }

    async fn get_retry_history(
        &self,
        id: DocumentId,
    ) -> Result<Vec<RetryHistoryEntry>, StorageError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .get(&id)
            .ok_or(StorageError::DocumentNotFound(id))?
            .retry_history
            .clone())
    }

    async fn clear_stage_data(&self, id: DocumentId, stage: Stage) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        match stage {
            Stage::Parsed => {
                state.chunks.remove(&id);
                state.tables.remove(&id);
                state.formulas.remove(&id);
            }
            Stage::Embedded => {
                if let Some(chunks) = state.chunks.get_mut(&id) {
                    for chunk in chunks.iter_mut() {
                        chunk.embedding = None;
                    }
                }
            }
            Stage::GraphitiIngested | Stage::Analyzed => {}
            Stage::ExtractedFinancials => {
                state.financial_metrics.remove(&id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_protocol::{DealId, DocumentId, OrganizationId};

    fn seeded() -> (InMemoryStorageAdapter, DocumentId) {
        let adapter = InMemoryStorageAdapter::new();
        let doc = Document::new(
            DocumentId::new(),
            OrganizationId::new(),
            DealId::new(),
            "report.pdf",
            "application/pdf",
        );
        let id = doc.id;
        adapter.seed_document(doc);
        (adapter, id)
    }

    #[tokio::test]
    async fn store_chunks_is_visible_in_index_order() {
        let (adapter, id) = seeded();
        let chunks = vec![
            Chunk::new(id, 1, docpipe_protocol::ChunkKind::Text, "b", 1),
            Chunk::new(id, 0, docpipe_protocol::ChunkKind::Text, "a", 1),
        ];
        adapter
            .store_chunks_and_update_status(id, chunks, vec![], vec![], DocumentStatus::Parsed)
            .await
            .unwrap();
        let fetched = adapter.get_chunks_by_document(id).await.unwrap();
        assert_eq!(fetched[0].content, "a");
        assert_eq!(fetched[1].content, "b");
    }

    #[tokio::test]
    async fn embedding_length_mismatch_is_fatal() {
        let (adapter, id) = seeded();
        let err = adapter
            .update_embeddings_and_status(
                id,
                vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()],
                vec![vec![0.0]],
                DocumentStatus::Embedded,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::EmbeddingLengthMismatch { .. }));
    }

    #[tokio::test]
    async fn clear_stage_data_for_embedded_keeps_chunks_but_drops_vectors() {
        let (adapter, id) = seeded();
        let mut chunk = Chunk::new(id, 0, docpipe_protocol::ChunkKind::Text, "a", 1);
        chunk.embedding = Some(vec![0.1, 0.2]);
        adapter
            .store_chunks_and_update_status(
                id,
                vec![chunk],
                vec![],
                vec![],
                DocumentStatus::Embedded,
            )
            .await
            .unwrap();
        adapter.clear_stage_data(id, Stage::Embedded).await.unwrap();
        let fetched = adapter.get_chunks_by_document(id).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(fetched[0].embedding.is_none());
    }
}
