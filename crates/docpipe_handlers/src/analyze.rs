//! Analyze handler (§4.H): LLM-backed finding extraction with a permissive
//! structured-output parser.

use crate::providers::LlmClient;
use async_trait::async_trait;
use docpipe_config::ModelRegistry;
use docpipe_db::StorageAdapter;
use docpipe_protocol::{DealId, Domain, DocumentId, DocumentStatus, Finding, FindingType, Job, Stage, UsageRow};
use docpipe_queue::JobQueue;
use docpipe_retry::RetryManager;
use std::sync::Arc;
use std::time::Instant;

const AGENT_NAME: &str = "analysis";

#[derive(Debug, serde::Deserialize)]
struct AnalyzePayload {
    document_id: DocumentId,
    deal_id: DealId,
    #[serde(default)]
    is_retry: bool,
}

#[derive(Debug, serde::Deserialize)]
struct RawFinding {
    content: Option<String>,
    finding_type: Option<String>,
    domain: Option<String>,
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    source_reference: Option<String>,
}

fn parse_finding_type(raw: Option<&str>) -> FindingType {
    match raw.map(|s| s.to_lowercase()) {
        Some(s) if s == "metric" => FindingType::Metric,
        Some(s) if s == "risk" => FindingType::Risk,
        Some(s) if s == "opportunity" => FindingType::Opportunity,
        Some(s) if s == "contradiction" => FindingType::Contradiction,
        _ => FindingType::Fact,
    }
}

fn parse_domain(raw: Option<&str>) -> Domain {
    match raw.map(|s| s.to_lowercase()) {
        Some(s) if s == "financial" => Domain::Financial,
        Some(s) if s == "market" => Domain::Market,
        Some(s) if s == "legal" => Domain::Legal,
        Some(s) if s == "technical" => Domain::Technical,
        _ => Domain::Operational,
    }
}

fn parse_confidence(raw: Option<&serde_json::Value>) -> u8 {
    match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|f| f.clamp(0.0, 100.0) as u8).unwrap_or(70),
        Some(serde_json::Value::String(s)) => s.parse::<f64>().map(|f| f.clamp(0.0, 100.0) as u8).unwrap_or(70),
        _ => 70,
    }
}

/// Extracts the first JSON array or object embedded in prose or a
/// code-block fence, as §9 requires of all structured-output parsing.
fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }
    let array_start = trimmed.find('[');
    let object_start = trimmed.find('{');
    let start = match (array_start, object_start) {
        (Some(a), Some(o)) => a.min(o),
        (Some(a), None) => a,
        (None, Some(o)) => o,
        (None, None) => return None,
    };
    let open = trimmed.as_bytes()[start] as char;
    let close = if open == '[' { ']' } else { '}' };
    let end = trimmed.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// Parses an LLM's findings response, substituting defaults for any field
/// that fails validation rather than rejecting the whole response (§4.H).
fn parse_findings(text: &str, deal_id: DealId, document_id: DocumentId) -> Vec<Finding> {
    let Some(json_block) = extract_json_block(text) else {
        return Vec::new();
    };
    let raw: Vec<RawFinding> = match serde_json::from_str::<Vec<RawFinding>>(json_block) {
        Ok(v) => v,
        Err(_) => match serde_json::from_str::<RawFinding>(json_block) {
            Ok(single) => vec![single],
            Err(_) => return Vec::new(),
        },
    };

    raw.into_iter()
        .filter_map(|f| {
            let content = f.content?;
            Some(Finding::new(
                deal_id,
                document_id,
                parse_finding_type(f.finding_type.as_deref()),
                parse_domain(f.domain.as_deref()),
                content,
                parse_confidence(f.confidence.as_ref()),
            ))
        })
        .collect()
}

pub struct AnalyzeHandler {
    storage: Arc<dyn StorageAdapter>,
    queue: Arc<dyn JobQueue>,
    retry: Arc<RetryManager>,
    llm: Arc<dyn LlmClient>,
    models: Arc<ModelRegistry>,
}

impl AnalyzeHandler {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        queue: Arc<dyn JobQueue>,
        retry: Arc<RetryManager>,
        llm: Arc<dyn LlmClient>,
        models: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            storage,
            queue,
            retry,
            llm,
            models,
        }
    }
}

#[async_trait]
impl docpipe_worker::StageHandler for AnalyzeHandler {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let payload: AnalyzePayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| format!("invalid analyze payload: {e}"))?;

        if payload.is_retry {
            self.retry
                .prepare_stage_retry(payload.document_id, Stage::Analyzed)
                .await
                .map_err(|e| e.to_string())?;
        } else {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::Analyzing, None)
                .await
                .map_err(|e| e.to_string())?;
        }

        let chunks = self
            .storage
            .get_chunks_by_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;
        let combined = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n---\n\n");

        let model = self
            .models
            .resolve_primary(AGENT_NAME)
            .ok_or_else(|| format!("no model configured for agent '{AGENT_NAME}'"))?;
        let system = "Extract findings as a JSON array of {content, finding_type, domain, confidence, source_reference}.";

        let started = Instant::now();
        let response = self
            .llm
            .complete(model.as_str(), system, &combined)
            .await
            .map_err(|e| e.to_string())?;
        let latency = started.elapsed();

        let findings = parse_findings(&response.content, payload.deal_id, payload.document_id);

        docpipe_observability::log_usage_row(&UsageRow::Llm {
            provider: model.provider().to_string(),
            model: model.as_str().to_string(),
            feature: "analyze".to_string(),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost_usd: 0.0,
            latency,
            namespace: None,
        });

        self.storage
            .update_document_status(payload.document_id, DocumentStatus::Analyzed, None)
            .await
            .map_err(|e| e.to_string())?;
        self.retry
            .mark_stage_complete(payload.document_id, Stage::Analyzed)
            .await
            .map_err(|e| e.to_string())?;

        let finding_count = findings.len();

        let document = self
            .storage
            .get_document(payload.document_id)
            .await
            .map_err(|e| e.to_string())?;

        if crate::is_spreadsheet_content_type(&document.content_type) {
            let mut envelope = job.payload.clone();
            if let serde_json::Value::Object(map) = &mut envelope {
                map.insert("is_retry".to_string(), serde_json::Value::Bool(false));
            }
            self.queue
                .enqueue(
                    docpipe_protocol::job::kinds::EXTRACT_FINANCIALS,
                    envelope,
                    docpipe_protocol::EnqueueOptions::default(),
                )
                .await
                .map_err(|e| e.to_string())?;
        } else {
            self.storage
                .update_document_status(payload.document_id, DocumentStatus::Complete, None)
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(serde_json::json!({
            "document_id": payload.document_id,
            "findings": finding_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_worker::StageHandler as _;

    #[test]
    fn extracts_json_from_code_fence() {
        let text = "Here are the findings:\n```json\n[{\"content\": \"x\"}]\n```\nDone.";
        let json = extract_json_block(text).unwrap();
        assert!(json.starts_with('['));
    }

    #[test]
    fn extracts_bare_json_array() {
        let text = "prose before [{\"content\": \"x\"}] prose after";
        let json = extract_json_block(text).unwrap();
        assert_eq!(json, "[{\"content\": \"x\"}]");
    }

    #[test]
    fn invalid_enum_values_fall_back_to_defaults() {
        let deal_id = DealId::new();
        let document_id = DocumentId::new();
        let findings = parse_findings(
            r#"[{"content": "interesting", "finding_type": "nonsense", "domain": "nonsense", "confidence": 999}]"#,
            deal_id,
            document_id,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type, FindingType::Fact);
        assert_eq!(findings[0].domain, Domain::Operational);
        assert_eq!(findings[0].confidence, 100);
    }

    #[test]
    fn missing_confidence_defaults_to_70() {
        assert_eq!(parse_confidence(None), 70);
    }

    struct StubLlmClient;

    #[async_trait]
    impl crate::providers::LlmClient for StubLlmClient {
        async fn complete(
            &self,
            _model: &str,
            _system: &str,
            _prompt: &str,
        ) -> Result<crate::providers::LlmResponse, String> {
            Ok(crate::providers::LlmResponse {
                content: r#"[{"content": "revenue grew", "finding_type": "metric", "domain": "financial", "confidence": 80}]"#.to_string(),
                input_tokens: 10,
                output_tokens: 10,
            })
        }
    }

    fn model_registry() -> Arc<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        registry.register(
            AGENT_NAME,
            docpipe_config::AgentModelConfig {
                primary: docpipe_config::ModelString::parse("openai:gpt-4o").unwrap(),
                fallback: None,
            },
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn spreadsheet_documents_enqueue_extract_financials_and_stay_at_analyzed() {
        let storage = Arc::new(docpipe_db::InMemoryStorageAdapter::new());
        let deal_id = DealId::new();
        let document_id = DocumentId::new();
        storage.seed_document(docpipe_protocol::Document::new(
            document_id,
            docpipe_protocol::OrganizationId::new(),
            deal_id,
            "model.xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ));
        let queue: Arc<dyn JobQueue> = Arc::new(docpipe_queue::InMemoryJobQueue::new());
        let retry = Arc::new(RetryManager::with_queue(storage.clone(), queue.clone()));
        let handler = AnalyzeHandler::new(storage.clone(), queue.clone(), retry, Arc::new(StubLlmClient), model_registry());

        queue
            .enqueue(
                "analyze",
                serde_json::json!({"document_id": document_id, "deal_id": deal_id}),
                docpipe_protocol::EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let job = queue.dequeue("analyze", 1).await.unwrap().into_iter().next().unwrap();
        handler.handle(&job).await.unwrap();

        let document = storage.get_document(document_id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Analyzed);
        assert_eq!(document.last_completed_stage, Some(Stage::Analyzed));

        let extract_jobs = queue.dequeue(docpipe_protocol::job::kinds::EXTRACT_FINANCIALS, 10).await.unwrap();
        assert_eq!(extract_jobs.len(), 1);
    }

    #[tokio::test]
    async fn non_spreadsheet_documents_skip_extract_financials_and_complete() {
        let storage = Arc::new(docpipe_db::InMemoryStorageAdapter::new());
        let deal_id = DealId::new();
        let document_id = DocumentId::new();
        storage.seed_document(docpipe_protocol::Document::new(
            document_id,
            docpipe_protocol::OrganizationId::new(),
            deal_id,
            "term_sheet.pdf",
            "application/pdf",
        ));
        let queue: Arc<dyn JobQueue> = Arc::new(docpipe_queue::InMemoryJobQueue::new());
        let retry = Arc::new(RetryManager::with_queue(storage.clone(), queue.clone()));
        let handler = AnalyzeHandler::new(storage.clone(), queue.clone(), retry, Arc::new(StubLlmClient), model_registry());

        queue
            .enqueue(
                "analyze",
                serde_json::json!({"document_id": document_id, "deal_id": deal_id}),
                docpipe_protocol::EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let job = queue.dequeue("analyze", 1).await.unwrap().into_iter().next().unwrap();
        handler.handle(&job).await.unwrap();

        let document = storage.get_document(document_id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Complete);
        assert_eq!(document.last_completed_stage, Some(Stage::Analyzed));

        let extract_jobs = queue.dequeue(docpipe_protocol::job::kinds::EXTRACT_FINANCIALS, 10).await.unwrap();
        assert!(extract_jobs.is_empty());
    }
}
