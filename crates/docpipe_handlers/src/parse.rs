//! Parse handler (§4.E): downloads a document, dispatches to a
//! format-specific parser, and stores the resulting chunks.

use crate::providers::ObjectStore;
use async_trait::async_trait;
use docpipe_protocol::{Chunk, ChunkKind, ChunkMetadata, DocumentId, DocumentStatus, Formula, Job, Table};
use docpipe_queue::JobQueue;
use docpipe_retry::RetryManager;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, serde::Deserialize)]
struct ParsePayload {
    document_id: DocumentId,
    gcs_path: String,
    file_type: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    is_retry: bool,
}

/// The shape every format-specific parser returns (§4.E).
pub struct ParseResult {
    pub chunks: Vec<Chunk>,
    pub tables: Vec<Table>,
    pub formulas: Vec<Formula>,
    pub page_count: Option<u32>,
    pub sheet_count: Option<u32>,
    pub parse_time_ms: u64,
    pub warnings: Vec<String>,
}

/// Non-retryable parse failures, classified before the retry manager sees
/// the raw message (§4.E): file-not-found, unsupported-type, corrupted,
/// too-large.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error("password protected")]
    PasswordProtected,
    #[error("file appears corrupted")]
    Corrupted,
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file too large")]
    TooLarge,
}

const MAX_BYTES: usize = 100 * 1024 * 1024;

/// Dispatch to a format-specific parser by MIME-ish `file_type` (§4.E, §6).
fn parse_bytes(bytes: &[u8], file_type: &str, document_id: DocumentId) -> Result<ParseResult, ParseFailure> {
    let start = Instant::now();
    if bytes.len() > MAX_BYTES {
        return Err(ParseFailure::TooLarge);
    }
    if bytes.starts_with(b"%PDF") && looks_encrypted(bytes) {
        return Err(ParseFailure::PasswordProtected);
    }

    let mut warnings = Vec::new();
    let (chunks, tables, formulas, page_count, sheet_count) = match classify_file_type(file_type) {
        FileKind::Text => {
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| ParseFailure::Corrupted)?;
            (text_chunks(&text, document_id), Vec::new(), Vec::new(), None, None)
        }
        FileKind::Spreadsheet => {
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| ParseFailure::Corrupted)?;
            let (table_chunks, tables, formulas, sheet_count) = spreadsheet_chunks(&text, document_id);
            (table_chunks, tables, formulas, None, Some(sheet_count))
        }
        FileKind::Word => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            warnings.push("word document parsed as plain text".to_string());
            (text_chunks(&text, document_id), Vec::new(), Vec::new(), None, None)
        }
        FileKind::Image => {
            warnings.push("image content not OCR'd; stored as a single placeholder chunk".to_string());
            let chunk = Chunk::new(document_id, 0, ChunkKind::Image, "[image content]", 0);
            (vec![chunk], Vec::new(), Vec::new(), Some(1), None)
        }
        FileKind::Unsupported => return Err(ParseFailure::UnsupportedType(file_type.to_string())),
    };

    Ok(ParseResult {
        chunks,
        tables,
        formulas,
        page_count,
        sheet_count,
        parse_time_ms: start.elapsed().as_millis() as u64,
        warnings,
    })
}

enum FileKind {
    Text,
    Spreadsheet,
    Word,
    Image,
    Unsupported,
}

/// Whether `file_type` (a document's `content_type`) is a spreadsheet kind,
/// the gate the analyze handler uses to decide whether to run
/// extract-financials after analysis (§4.H).
pub fn is_spreadsheet_content_type(file_type: &str) -> bool {
    matches!(classify_file_type(file_type), FileKind::Spreadsheet)
}

fn classify_file_type(file_type: &str) -> FileKind {
    let lower = file_type.to_lowercase();
    if lower.contains("pdf") || lower.contains("text") || lower.contains("markdown") || lower.contains("csv") {
        FileKind::Text
    } else if lower.contains("spreadsheet") || lower.contains("excel") || lower.contains("xlsx") || lower.contains("xls") {
        FileKind::Spreadsheet
    } else if lower.contains("word") || lower.contains("doc") {
        FileKind::Word
    } else if lower.contains("image") || lower.contains("png") || lower.contains("jpeg") || lower.contains("jpg") {
        FileKind::Image
    } else {
        FileKind::Unsupported
    }
}

fn looks_encrypted(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(4096)];
    window
        .windows(8)
        .any(|w| w == b"/Encrypt")
}

/// Splits plain text into paragraph-bounded chunks, capped near
/// [`docpipe_protocol::chunk::CHUNK_MAX_TOKENS`] words per chunk.
fn text_chunks(text: &str, document_id: DocumentId) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index = 0u32;
    let mut buffer = String::new();
    let mut word_count = 0u32;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let words = paragraph.split_whitespace().count() as u32;
        if word_count + words > docpipe_protocol::chunk::CHUNK_MAX_TOKENS && !buffer.is_empty() {
            chunks.push(Chunk::new(document_id, index, ChunkKind::Text, buffer.clone(), word_count));
            index += 1;
            buffer.clear();
            word_count = 0;
        }
        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(paragraph);
        word_count += words;
    }
    if !buffer.is_empty() {
        chunks.push(Chunk::new(document_id, index, ChunkKind::Text, buffer, word_count));
    }
    if chunks.is_empty() {
        chunks.push(Chunk::new(document_id, 0, ChunkKind::Text, "", 0));
    }
    chunks
}

/// Parses a CSV/TSV-like spreadsheet export into one table chunk per sheet
/// (a single sheet, since the text form carries no sheet boundaries).
fn spreadsheet_chunks(text: &str, document_id: DocumentId) -> (Vec<Chunk>, Vec<Table>, Vec<Formula>, u32) {
    let delimiter = if text.contains('\t') { '\t' } else { ',' };
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<String> = lines
        .next()
        .map(|l| l.split(delimiter).map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<String>> = lines
        .map(|l| l.split(delimiter).map(|s| s.trim().to_string()).collect())
        .collect();

    let mut chunk_content = headers.join(&delimiter.to_string());
    for row in &rows {
        chunk_content.push('\n');
        chunk_content.push_str(&row.join(&delimiter.to_string()));
    }
    let token_count = chunk_content.split_whitespace().count() as u32;
    let mut chunk = Chunk::new(document_id, 0, ChunkKind::Table, chunk_content, token_count);
    chunk.metadata = ChunkMetadata {
        sheet_name: Some("Sheet1".to_string()),
        ..Default::default()
    };

    let table = Table {
        document_id,
        chunk_index: 0,
        sheet_name: Some("Sheet1".to_string()),
        headers,
        rows,
    };

    (vec![chunk], vec![table], Vec::new(), 1)
}

pub struct ParseHandler {
    storage: Arc<dyn docpipe_db::StorageAdapter>,
    queue: Arc<dyn JobQueue>,
    retry: Arc<RetryManager>,
    object_store: Arc<dyn ObjectStore>,
}

impl ParseHandler {
    pub fn new(
        storage: Arc<dyn docpipe_db::StorageAdapter>,
        queue: Arc<dyn JobQueue>,
        retry: Arc<RetryManager>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            storage,
            queue,
            retry,
            object_store,
        }
    }
}

#[async_trait]
impl docpipe_worker::StageHandler for ParseHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let payload: ParsePayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| format!("invalid parse payload: {e}"))?;

        if payload.is_retry {
            self.retry
                .prepare_stage_retry(payload.document_id, docpipe_protocol::Stage::Parsed)
                .await
                .map_err(|e| e.to_string())?;
        } else {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::Parsing, None)
                .await
                .map_err(|e| e.to_string())?;
        }
        self.storage
            .clear_processing_error(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        let bytes = self.object_store.download(&payload.gcs_path).await?;

        let result = parse_bytes(&bytes, &payload.file_type, payload.document_id).map_err(|e| e.to_string())?;
        let chunk_count = result.chunks.len();

        self.storage
            .store_chunks_and_update_status(
                payload.document_id,
                result.chunks,
                result.tables,
                result.formulas,
                DocumentStatus::Parsed,
            )
            .await
            .map_err(|e| e.to_string())?;

        self.retry
            .mark_stage_complete(payload.document_id, docpipe_protocol::Stage::Parsed)
            .await
            .map_err(|e| e.to_string())?;

        let mut envelope = job.payload.clone();
        if let serde_json::Value::Object(map) = &mut envelope {
            map.insert("is_retry".to_string(), serde_json::Value::Bool(false));
        }
        self.queue
            .enqueue(
                docpipe_protocol::job::kinds::EMBED,
                envelope,
                docpipe_protocol::EnqueueOptions::default(),
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "document_id": payload.document_id,
            "chunk_count": chunk_count,
            "page_count": result.page_count,
            "sheet_count": result.sheet_count,
            "parse_time_ms": result.parse_time_ms,
            "warnings": result.warnings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_text_into_paragraph_chunks() {
        let doc_id = DocumentId::new();
        let text = "Paragraph one.\n\nParagraph two.\n\nParagraph three.";
        let chunks = text_chunks(text, doc_id);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Paragraph one."));
    }

    #[test]
    fn detects_password_protected_pdf() {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.extend_from_slice(b"/Encrypt 5 0 R\n");
        let result = parse_bytes(&bytes, "application/pdf", DocumentId::new());
        assert!(matches!(result, Err(ParseFailure::PasswordProtected)));
    }

    #[test]
    fn rejects_files_over_the_size_limit() {
        let bytes = vec![0u8; MAX_BYTES + 1];
        let result = parse_bytes(&bytes, "text/plain", DocumentId::new());
        assert!(matches!(result, Err(ParseFailure::TooLarge)));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let result = parse_bytes(b"hi", "application/x-unknown", DocumentId::new());
        assert!(matches!(result, Err(ParseFailure::UnsupportedType(_))));
    }

    #[test]
    fn spreadsheet_csv_yields_one_table() {
        let doc_id = DocumentId::new();
        let (chunks, tables, _, sheet_count) = spreadsheet_chunks("a,b\n1,2\n3,4", doc_id);
        assert_eq!(chunks.len(), 1);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["a", "b"]);
        assert_eq!(sheet_count, 1);
    }
}
