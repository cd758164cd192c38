//! Document and pipeline-stage data model (§3).

use crate::errors::ClassifiedError;
use crate::ids::{DealId, DocumentId, OrganizationId};
use serde::{Deserialize, Serialize};

/// Current lifecycle status of a document as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Parsing,
    Parsed,
    Embedding,
    Embedded,
    GraphitiIngesting,
    GraphitiIngested,
    Analyzing,
    Analyzed,
    ExtractingFinancials,
    Complete,
    Failed,
    EmbeddingFailed,
    AnalysisFailed,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::Parsed => "parsed",
            Self::Embedding => "embedding",
            Self::Embedded => "embedded",
            Self::GraphitiIngesting => "graphiti_ingesting",
            Self::GraphitiIngested => "graphiti_ingested",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::ExtractingFinancials => "extracting_financials",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::EmbeddingFailed => "embedding_failed",
            Self::AnalysisFailed => "analysis_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The granular checkpoint used by the retry manager to resume a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsed,
    Embedded,
    GraphitiIngested,
    Analyzed,
    ExtractedFinancials,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Embedded => "embedded",
            Self::GraphitiIngested => "graphiti_ingested",
            Self::Analyzed => "analyzed",
            Self::ExtractedFinancials => "extracted_financials",
        }
    }

    /// The stage graph walk from §4.C: `pending -> parsing -> parsed ->
    /// embedding -> embedded -> analyzing -> analyzed -> complete`,
    /// expressed here as a "what comes after this completed stage" step.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Parsed => Some(Stage::Embedded),
            Stage::Embedded => Some(Stage::GraphitiIngested),
            Stage::GraphitiIngested => Some(Stage::Analyzed),
            Stage::Analyzed => Some(Stage::ExtractedFinancials),
            Stage::ExtractedFinancials => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A retry-history entry (§3); appended, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryHistoryEntry {
    pub attempt: u32,
    pub stage: String,
    pub error_kind: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl RetryHistoryEntry {
    const MAX_MESSAGE_LEN: usize = 500;

    pub fn new(attempt: u32, stage: impl Into<String>, classified: &ClassifiedError) -> Self {
        let mut message = classified.raw_message.clone();
        message.truncate(Self::MAX_MESSAGE_LEN);
        Self {
            attempt,
            stage: stage.into(),
            error_kind: classified.kind.as_str().to_string(),
            message,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A document record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub organization_id: OrganizationId,
    pub deal_id: DealId,
    pub name: String,
    pub content_type: String,
    pub status: DocumentStatus,
    pub last_completed_stage: Option<Stage>,
    pub processing_error: Option<ClassifiedError>,
    pub retry_history: Vec<RetryHistoryEntry>,
}

impl Document {
    pub fn new(
        id: DocumentId,
        organization_id: OrganizationId,
        deal_id: DealId,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            organization_id,
            deal_id,
            name: name.into(),
            content_type: content_type.into(),
            status: DocumentStatus::Pending,
            last_completed_stage: None,
            processing_error: None,
            retry_history: Vec::new(),
        }
    }
}
