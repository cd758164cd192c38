//! DuckDB-backed [`StorageAdapter`] (§4.D).
//!
//! DuckDB enforces a single-writer model at the file level; the `Mutex`
//! around the connection serializes in-process access on top of that so
//! concurrent handler tasks never race a shared connection handle.

use crate::adapter::{Deal, StorageAdapter};
use crate::error::StorageError;
use async_trait::async_trait;
use docpipe_protocol::{
    Chunk, ChunkKind, ChunkMetadata, ClassifiedError, DealId, Document, DocumentId,
    DocumentStatus, ErrorKind, FinancialMetric, Formula, MetricCategory, OrganizationId,
    PeriodType, RetryHistoryEntry, Stage, Table,
};
use duckdb::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub struct DuckDbStorageAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStorageAdapter {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("duckdb connection mutex poisoned");
            f(&guard)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS deals (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL,
            name VARCHAR NOT NULL
        );
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL,
            deal_id UUID NOT NULL,
            name VARCHAR NOT NULL,
            content_type VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            last_completed_stage VARCHAR,
            error_kind VARCHAR,
            error_message VARCHAR,
            error_retryable BOOLEAN,
            retry_history_json VARCHAR NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS chunks (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL,
            idx INTEGER NOT NULL,
            kind VARCHAR NOT NULL,
            content VARCHAR NOT NULL,
            token_count INTEGER NOT NULL,
            metadata_json VARCHAR NOT NULL,
            embedding_json VARCHAR
        );
        CREATE TABLE IF NOT EXISTS document_tables (
            document_id UUID NOT NULL,
            chunk_index INTEGER NOT NULL,
            sheet_name VARCHAR,
            headers_json VARCHAR NOT NULL,
            rows_json VARCHAR NOT NULL
        );
        CREATE TABLE IF NOT EXISTS document_formulas (
            document_id UUID NOT NULL,
            chunk_index INTEGER NOT NULL,
            cell_reference VARCHAR NOT NULL,
            formula VARCHAR NOT NULL,
            result VARCHAR
        );
        CREATE TABLE IF NOT EXISTS financial_metrics (
            id UUID PRIMARY KEY,
            deal_id UUID NOT NULL,
            document_id UUID NOT NULL,
            name VARCHAR NOT NULL,
            category VARCHAR NOT NULL,
            value VARCHAR NOT NULL,
            period_type VARCHAR,
            is_actual BOOLEAN NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn row_to_document(row: &duckdb::Row) -> duckdb::Result<Document> {
    let id: String = row.get("id")?;
    let organization_id: String = row.get("organization_id")?;
    let deal_id: String = row.get("deal_id")?;
    let name: String = row.get("name")?;
    let content_type: String = row.get("content_type")?;
    let status: String = row.get("status")?;
    let last_completed_stage: Option<String> = row.get("last_completed_stage")?;
    let error_kind: Option<String> = row.get("error_kind")?;
    let error_message: Option<String> = row.get("error_message")?;
    let error_retryable: Option<bool> = row.get("error_retryable")?;
    let retry_history_json: String = row.get("retry_history_json")?;

    let processing_error = error_kind.map(|kind_str| {
        let kind = parse_error_kind(&kind_str);
        ClassifiedError {
            kind,
            raw_message: error_message.unwrap_or_default(),
            retryable: error_retryable.unwrap_or(kind.is_retryable()),
        }
    });

    Ok(Document {
        id: DocumentId::from_str(&id).expect("stored document id is a valid uuid"),
        organization_id: OrganizationId::from_str(&organization_id)
            .expect("stored organization id is a valid uuid"),
        deal_id: DealId::from_str(&deal_id).expect("stored deal id is a valid uuid"),
        name,
        content_type,
        status: parse_document_status(&status),
        last_completed_stage: last_completed_stage.map(|s| parse_stage(&s)),
        processing_error,
        retry_history: serde_json::from_str(&retry_history_json).unwrap_or_default(),
    })
}

fn parse_document_status(s: &str) -> DocumentStatus {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .expect("stored document status is one of the closed enum variants")
}

fn parse_stage(s: &str) -> Stage {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .expect("stored stage is one of the closed enum variants")
}

fn parse_error_kind(s: &str) -> ErrorKind {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .expect("stored error kind is one of the closed enum variants")
}

#[async_trait]
impl StorageAdapter for DuckDbStorageAdapter {
    async fn get_document(&self, id: DocumentId) -> Result<Document, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM documents WHERE id = ?",
                params![id.to_string()],
                row_to_document,
            )
            .map_err(|_| StorageError::DocumentNotFound(id))
        })
        .await
    }

    async fn get_deal(&self, id: DealId) -> Result<Deal, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, organization_id, name FROM deals WHERE id = ?",
                params![id.to_string()],
                |row| {
                    let deal_id: String = row.get(0)?;
                    let org_id: String = row.get(1)?;
                    let name: String = row.get(2)?;
                    Ok(Deal {
                        id: DealId::from_str(&deal_id).unwrap(),
                        organization_id: OrganizationId::from_str(&org_id).unwrap(),
                        name,
                    })
                },
            )
            .map_err(|_| StorageError::DealNotFound(id.as_uuid()))
        })
        .await
    }

    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error: Option<ClassifiedError>,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            match &error {
                Some(classified) => conn.execute(
                    "UPDATE documents SET status = ?, error_kind = ?, error_message = ?, error_retryable = ? WHERE id = ?",
                    params![
                        status.as_str(),
                        classified.kind.as_str(),
                        classified.raw_message,
                        classified.retryable,
                        id.to_string()
                    ],
                )?,
                None => conn.execute(
                    "UPDATE documents SET status = ? WHERE id = ?",
                    params![status.as_str(), id.to_string()],
                )?,
            };
            Ok(())
        })
        .await
    }

    async fn update_document_stage(
        &self,
        id: DocumentId,
        last_completed_stage: Stage,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE documents SET last_completed_stage = ? WHERE id = ?",
                params![last_completed_stage.as_str(), id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn store_chunks_and_update_status(
        &self,
        id: DocumentId,
        chunks: Vec<Chunk>,
        tables: Vec<Table>,
        formulas: Vec<Formula>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM chunks WHERE document_id = ?",
                params![id.to_string()],
            )?;
            tx.execute(
                "DELETE FROM document_tables WHERE document_id = ?",
                params![id.to_string()],
            )?;
            tx.execute(
                "DELETE FROM document_formulas WHERE document_id = ?",
                params![id.to_string()],
            )?;
            for chunk in &chunks {
                tx.execute(
                    "INSERT INTO chunks (id, document_id, idx, kind, content, token_count, metadata_json, embedding_json)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        chunk.id.to_string(),
                        id.to_string(),
                        chunk.index,
                        chunk.kind.as_str(),
                        chunk.content,
                        chunk.token_count,
                        serde_json::to_string(&chunk.metadata)?,
                        chunk.embedding.as_ref().map(serde_json::to_string).transpose()?,
                    ],
                )?;
            }
            for table in &tables {
                tx.execute(
                    "INSERT INTO document_tables (document_id, chunk_index, sheet_name, headers_json, rows_json)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        id.to_string(),
                        table.chunk_index,
                        table.sheet_name,
                        serde_json::to_string(&table.headers)?,
                        serde_json::to_string(&table.rows)?,
                    ],
                )?;
            }
            for formula in &formulas {
                tx.execute(
                    "INSERT INTO document_formulas (document_id, chunk_index, cell_reference, formula, result)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        id.to_string(),
                        formula.chunk_index,
                        formula.cell_reference,
                        formula.formula,
                        formula.result,
                    ],
                )?;
            }
            tx.execute(
                "UPDATE documents SET status = ? WHERE id = ?",
                params![new_status.as_str(), id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_chunks_by_document(&self, id: DocumentId) -> Result<Vec<Chunk>, StorageError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, idx, kind, content, token_count, metadata_json, embedding_json
                 FROM chunks WHERE document_id = ? ORDER BY idx ASC",
            )?;
            let rows = stmt.query_map(params![id.to_string()], |row| {
                let chunk_id: String = row.get(0)?;
                let idx: u32 = row.get(1)?;
                let kind: String = row.get(2)?;
                let content: String = row.get(3)?;
                let token_count: u32 = row.get(4)?;
                let metadata_json: String = row.get(5)?;
                let embedding_json: Option<String> = row.get(6)?;
                Ok((chunk_id, idx, kind, content, token_count, metadata_json, embedding_json))
            })?;

            let mut chunks = Vec::new();
            for row in rows {
                let (chunk_id, idx, kind, content, token_count, metadata_json, embedding_json) = row?;
                let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;
                let embedding = embedding_json
                    .map(|s| serde_json::from_str::<Vec<f32>>(&s))
                    .transpose()?;
                chunks.push(Chunk {
                    id: uuid::Uuid::parse_str(&chunk_id).expect("stored chunk id is a valid uuid"),
                    document_id: id,
                    index: idx,
                    kind: parse_chunk_kind(&kind),
                    content,
                    token_count,
                    metadata,
                    embedding,
                });
            }
            Ok(chunks)
        })
        .await
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
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for (chunk_id, vector) in chunk_ids.iter().zip(vectors.iter()) {
                tx.execute(
                    "UPDATE chunks SET embedding_json = ? WHERE id = ?",
                    params![serde_json::to_string(vector)?, chunk_id.to_string()],
                )?;
            }
            tx.execute(
                "UPDATE documents SET status = ? WHERE id = ?",
                params![new_status.as_str(), id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn store_financial_metrics_and_update_status(
        &self,
        id: DocumentId,
        metrics: Vec<FinancialMetric>,
        new_status: DocumentStatus,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for metric in &metrics {
                tx.execute(
                    "INSERT INTO financial_metrics (id, deal_id, document_id, name, category, value, period_type, is_actual)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        metric.id.to_string(),
                        metric.deal_id.to_string(),
                        id.to_string(),
                        metric.name,
                        metric.category.as_str(),
                        metric.value.to_string(),
                        metric.period_type.map(period_type_str),
                        metric.is_actual,
                    ],
                )?;
            }
            tx.execute(
                "UPDATE documents SET status = ? WHERE id = ?",
                params![new_status.as_str(), id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_financial_metrics(&self, id: DocumentId) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM financial_metrics WHERE document_id = ?",
                params![id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_processing_error(&self, id: DocumentId) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE documents SET error_kind = NULL, error_message = NULL, error_retryable = NULL WHERE id = ?",
                params![id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_processing_error(
        &self,
        id: DocumentId,
        classified: ClassifiedError,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE documents SET error_kind = ?, error_message = ?, error_retryable = ? WHERE id = ?",
                params![
                    classified.kind.as_str(),
                    classified.raw_message,
                    classified.retryable,
                    id.to_string()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_retry_history(
        &self,
        id: DocumentId,
        entry: RetryHistoryEntry,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let existing: String = conn.query_row(
                "SELECT retry_history_json FROM documents WHERE id = ?",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            let mut history: Vec<RetryHistoryEntry> = serde_json::from_str(&existing)?;
            history.push(entry);
            conn.execute(
                "UPDATE documents SET retry_history_json = ? WHERE id = ?",
                params![serde_json::to_string(&history)?, id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_retry_history(
        &self,
        id: DocumentId,
    ) -> Result<Vec<RetryHistoryEntry>, StorageError> {
        self.with_conn(move |conn| {
            let existing: String = conn.query_row(
                "SELECT retry_history_json FROM documents WHERE id = ?",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            Ok(serde_json::from_str(&existing)?)
        })
        .await
    }

    async fn clear_stage_data(&self, id: DocumentId, stage: Stage) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            match stage {
                Stage::Parsed => {
                    tx.execute("DELETE FROM chunks WHERE document_id = ?", params![id.to_string()])?;
                    tx.execute(
                        "DELETE FROM document_tables WHERE document_id = ?",
                        params![id.to_string()],
                    )?;
                    tx.execute(
                        "DELETE FROM document_formulas WHERE document_id = ?",
                        params![id.to_string()],
                    )?;
                }
                Stage::Embedded => {
                    tx.execute(
                        "UPDATE chunks SET embedding_json = NULL WHERE document_id = ?",
                        params![id.to_string()],
                    )?;
                }
                Stage::GraphitiIngested | Stage::Analyzed => {
                    // Findings and graph episodes live outside this relational store;
                    // nothing to clear here.
                }
                Stage::ExtractedFinancials => {
                    tx.execute(
                        "DELETE FROM financial_metrics WHERE document_id = ?",
                        params![id.to_string()],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

fn parse_chunk_kind(s: &str) -> ChunkKind {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .expect("stored chunk kind is one of the closed enum variants")
}

fn period_type_str(p: PeriodType) -> &'static str {
    match p {
        PeriodType::Annual => "annual",
        PeriodType::Quarterly => "quarterly",
        PeriodType::Monthly => "monthly",
        PeriodType::Ytd => "ytd",
    }
}

#[allow(dead_code)]
fn metric_category_str(c: MetricCategory) -> &'static str {
    c.as_str()
}
