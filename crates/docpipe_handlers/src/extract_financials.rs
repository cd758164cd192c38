//! Extract-financials handler (§4.H): pattern-based detection and
//! normalization of spreadsheet-derived metrics.

use async_trait::async_trait;
use docpipe_db::StorageAdapter;
use docpipe_protocol::financial::{is_projection, normalize_metric_name, DETECTION_CONFIDENCE_THRESHOLD};
use docpipe_protocol::{Chunk, ChunkKind, DealId, DocumentId, DocumentStatus, FinancialMetric, Job, PeriodType, Stage};
use docpipe_queue::JobQueue;
use docpipe_retry::RetryManager;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

const FINANCIAL_KEYWORDS: &[&str] = &[
    "revenue", "sales", "ebitda", "income", "profit", "loss", "assets", "equity", "liabilities", "cash flow",
    "margin", "umsatz", "eigenkapital", "bilanzsumme",
];

#[derive(Debug, serde::Deserialize)]
struct ExtractFinancialsPayload {
    document_id: DocumentId,
    deal_id: DealId,
    #[serde(default)]
    is_retry: bool,
}

/// Detection confidence from keyword coverage, with boosts for numeric
/// density and formula presence (§4.H). Returns a 0-100 score.
fn detection_confidence(chunks: &[Chunk]) -> u32 {
    let mut keyword_hits = 0u32;
    let mut numeric_cells = 0u32;
    let mut total_cells = 0u32;
    let mut has_formula = false;

    for chunk in chunks {
        let lower = chunk.content.to_lowercase();
        keyword_hits += FINANCIAL_KEYWORDS.iter().filter(|k| lower.contains(*k)).count() as u32;
        if chunk.kind == ChunkKind::Formula {
            has_formula = true;
        }
        for cell in chunk.content.split(|c: char| c == ',' || c == '\t' || c.is_whitespace()) {
            if cell.is_empty() {
                continue;
            }
            total_cells += 1;
            if cell.chars().any(|c| c.is_ascii_digit()) {
                numeric_cells += 1;
            }
        }
    }

    let keyword_score = (keyword_hits * 10).min(60);
    let numeric_ratio_boost = if total_cells > 0 {
        ((numeric_cells as f64 / total_cells as f64) * 30.0) as u32
    } else {
        0
    };
    let formula_boost = if has_formula { 10 } else { 0 };

    (keyword_score + numeric_ratio_boost + formula_boost).min(100)
}

/// Extracts `(label, value)` pairs from table-kind chunk rows, taking the
/// first numeric-looking cell per row as that row's value.
fn extract_label_value_pairs(chunks: &[Chunk]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for chunk in chunks.iter().filter(|c| c.kind == ChunkKind::Table) {
        for line in chunk.content.lines() {
            let cells: Vec<&str> = line.split(|c: char| c == ',' || c == '\t').map(str::trim).collect();
            if cells.len() < 2 {
                continue;
            }
            let label = cells[0];
            if label.is_empty() {
                continue;
            }
            if let Some(value_cell) = cells[1..].iter().find(|c| looks_numeric(c)) {
                pairs.push((label.to_string(), value_cell.to_string()));
            }
        }
    }
    pairs
}

fn looks_numeric(cell: &str) -> bool {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, '$' | '€' | ',' | '%' | ' ')).collect();
    !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | '€' | ',' | '%' | ' ')).collect();
    let cleaned = cleaned.trim_end_matches(|c: char| c.is_alphabetic());
    Decimal::from_str(cleaned).ok()
}

pub struct ExtractFinancialsHandler {
    storage: Arc<dyn StorageAdapter>,
    retry: Arc<RetryManager>,
}

impl ExtractFinancialsHandler {
    pub fn new(storage: Arc<dyn StorageAdapter>, retry: Arc<RetryManager>) -> Self {
        Self { storage, retry }
    }
}

#[async_trait]
impl docpipe_worker::StageHandler for ExtractFinancialsHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let payload: ExtractFinancialsPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| format!("invalid extract-financials payload: {e}"))?;

        if payload.is_retry {
            self.retry
                .prepare_stage_retry(payload.document_id, Stage::ExtractedFinancials)
                .await
                .map_err(|e| e.to_string())?;
            self.storage
                .delete_financial_metrics(payload.document_id)
                .await
                .map_err(|e| e.to_string())?;
        } else {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::ExtractingFinancials, None)
                .await
                .map_err(|e| e.to_string())?;
        }

        let chunks = self
            .storage
            .get_chunks_by_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        let confidence = detection_confidence(&chunks);
        if confidence < DETECTION_CONFIDENCE_THRESHOLD {
            self.storage
                .store_financial_metrics_and_update_status(payload.document_id, Vec::new(), DocumentStatus::Complete)
                .await
                .map_err(|e| e.to_string())?;
            self.retry
                .mark_stage_complete(payload.document_id, Stage::ExtractedFinancials)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(serde_json::json!({
                "document_id": payload.document_id,
                "is_financial": false,
                "detection_confidence": confidence,
                "metrics": 0,
            }));
        }

        let pairs = extract_label_value_pairs(&chunks);
        let mut metrics = Vec::with_capacity(pairs.len());
        for (label, raw_value) in pairs {
            let Some(value) = parse_decimal(&raw_value) else {
                continue;
            };
            let (name, category) = normalize_metric_name(&label);
            metrics.push(FinancialMetric {
                id: uuid::Uuid::new_v4(),
                deal_id: payload.deal_id,
                document_id: payload.document_id,
                name,
                category,
                value,
                period_type: Some(PeriodType::Annual),
                is_actual: !is_projection(&label) && !is_projection(&raw_value),
            });
        }

        let metric_count = metrics.len();
        self.storage
            .store_financial_metrics_and_update_status(payload.document_id, metrics, DocumentStatus::Complete)
            .await
            .map_err(|e| e.to_string())?;

        self.retry
            .mark_stage_complete(payload.document_id, Stage::ExtractedFinancials)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "document_id": payload.document_id,
            "is_financial": true,
            "detection_confidence": confidence,
            "metrics": metric_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_chunk(document_id: DocumentId, content: &str) -> Chunk {
        let mut chunk = Chunk::new(document_id, 0, ChunkKind::Table, content, 10);
        chunk.kind = ChunkKind::Table;
        chunk
    }

    #[test]
    fn detects_financial_documents_above_threshold() {
        let document_id = DocumentId::new();
        let chunks = vec![table_chunk(document_id, "Revenue,1000000\nEBITDA,200000\nNet Income,150000")];
        assert!(detection_confidence(&chunks) >= DETECTION_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn non_financial_text_scores_below_threshold() {
        let document_id = DocumentId::new();
        let chunk = Chunk::new(document_id, 0, ChunkKind::Text, "Meeting notes about the office move.", 8);
        assert!(detection_confidence(&[chunk]) < DETECTION_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn extracts_label_value_pairs_from_table_rows() {
        let document_id = DocumentId::new();
        let chunk = table_chunk(document_id, "Revenue,1000000\nUmsatz,2000000");
        let pairs = extract_label_value_pairs(&[chunk]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "Revenue");
    }

    #[test]
    fn projection_marker_flips_is_actual() {
        assert!(is_projection("FY25E"));
        let parsed = parse_decimal("1,200,000").unwrap();
        assert_eq!(parsed, Decimal::from(1_200_000));
    }
}
