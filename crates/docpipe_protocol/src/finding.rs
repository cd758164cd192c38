//! Analysis findings surfaced during the `analyze` stage (§4.H).

use crate::ids::{DealId, DocumentId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Metric,
    Fact,
    Risk,
    Opportunity,
    Contradiction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Financial,
    Operational,
    Market,
    Legal,
    Technical,
}

/// A single extracted finding, confidence-scored 0-100 (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: uuid::Uuid,
    pub deal_id: DealId,
    pub document_id: DocumentId,
    pub finding_type: FindingType,
    pub domain: Domain,
    pub summary: String,
    pub confidence: u8,
}

impl Finding {
    pub fn new(
        deal_id: DealId,
        document_id: DocumentId,
        finding_type: FindingType,
        domain: Domain,
        summary: impl Into<String>,
        confidence: u8,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            deal_id,
            document_id,
            finding_type,
            domain,
            summary: summary.into(),
            confidence: confidence.min(100),
        }
    }
}
