//! The [`StorageAdapter`] trait: a typed facade over the relational store (§4.D).

use crate::error::StorageError;
use async_trait::async_trait;
use docpipe_protocol::{
    Chunk, ClassifiedError, DealId, Document, DocumentId, DocumentStatus, FinancialMetric,
    Formula, RetryHistoryEntry, Stage, Table,
};

/// A deal record, as far as the pipeline needs to know about it.
#[derive(Debug, Clone)]
pub struct Deal {
    pub id: DealId,
    pub organization_id: docpipe_protocol::OrganizationId,
    pub name: String,
}

/// Presents a typed facade over the relational store (§4.D).
///
/// Invariant: no handler may mutate document state through more than one
/// call per transaction boundary; stage advancement and the data writes
/// for that stage happen in the same transaction wherever feasible.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_document(&self, id: DocumentId) -> Result<Document, StorageError>;
    async fn get_deal(&self, id: DealId) -> Result<Deal, StorageError>;

    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error: Option<ClassifiedError>,
    ) -> Result<(), StorageError>;

    async fn update_document_stage(
        &self,
        id: DocumentId,
        last_completed_stage: Stage,
    ) -> Result<(), StorageError>;

    /// Inside one transaction: delete existing chunks for the document,
    /// insert the new ones in index order, insert table/formula rows, and
    /// set the document's status. Must be atomic.
    async fn store_chunks_and_update_status(
        &self,
        id: DocumentId,
        chunks: Vec<Chunk>,
        tables: Vec<Table>,
        formulas: Vec<Formula>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError>;

    /// Returns chunks for a document in index order.
    async fn get_chunks_by_document(&self, id: DocumentId) -> Result<Vec<Chunk>, StorageError>;

    /// Writes vectors back to chunks by id. Mismatched lengths are a fatal error.
    async fn update_embeddings_and_status(
        &self,
        id: DocumentId,
        chunk_ids: Vec<uuid::Uuid>,
        vectors: Vec<Vec<f32>>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError>;

    async fn store_financial_metrics_and_update_status(
        &self,
        id: DocumentId,
        metrics: Vec<FinancialMetric>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError>;

    /// Used by retry of the extraction stage.
    async fn delete_financial_metrics(&self, id: DocumentId) -> Result<(), StorageError>;

    async fn clear_processing_error(&self, id: DocumentId) -> Result<(), StorageError>;

    async fn update_processing_error(
        &self,
        id: DocumentId,
        classified: ClassifiedError,
    ) -> Result<(), StorageError>;

    async fn append_retry_history(
        &self,
        id: DocumentId,
        entry: RetryHistoryEntry,
    ) -> Result<(), StorageError>;

    async fn get_retry_history(
        &self,
        id: DocumentId,
    ) -> Result<Vec<RetryHistoryEntry>, StorageError>;

    /// Per-stage scrubber: removes embeddings, findings, metrics, etc. that
    /// belong to a stage being retried.
    async fn clear_stage_data(&self, id: DocumentId, stage: Stage) -> Result<(), StorageError>;
}
