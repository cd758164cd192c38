//! Knowledge-graph episodes and facts (§3, §4.G).

use serde::{Deserialize, Serialize};

/// Typed entity/edge schema hint injected into the graph engine's extractor (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaHint {
    pub entity_types: Vec<String>,
    pub edge_types: Vec<String>,
    /// Which edges may connect which (source entity type, target entity type) pairs.
    pub edge_type_map: Vec<(String, String, String)>,
}

impl SchemaHint {
    /// The fixed document-ingest schema from §4.G: five entity types, nine edge types.
    pub fn document_ingest() -> Self {
        Self {
            entity_types: vec![
                "Company".into(),
                "Person".into(),
                "FinancialMetric".into(),
                "Finding".into(),
                "Risk".into(),
            ],
            edge_types: vec![
                "WorksFor".into(),
                "Supersedes".into(),
                "Contradicts".into(),
                "Supports".into(),
                "ExtractedFrom".into(),
                "CompetesWith".into(),
                "InvestsIn".into(),
                "Mentions".into(),
                "Supplies".into(),
            ],
            edge_type_map: Vec::new(),
        }
    }
}

/// A named, temporally scoped piece of evidence ingested into the graph (§3).
///
/// Never updated in place: superseded by a newer episode with the same
/// subject rather than mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub name: String,
    pub namespace: String,
    pub content: String,
    pub source_description: String,
    pub reference_time: chrono::DateTime<chrono::Utc>,
    pub schema_hint: SchemaHint,
}

impl Episode {
    /// Episode name for a document chunk, per §4.G: `{document_name}#chunk-{index}`.
    pub fn chunk_episode_name(document_name: &str, chunk_index: u32) -> String {
        format!("{document_name}#chunk-{chunk_index}")
    }
}

/// Default confidence by fact source, per §3: the highest-confidence
/// source can supersede lower ones.
pub mod confidence {
    pub const DOCUMENT_SOURCED: f32 = 0.85;
    pub const CHAT_FACT: f32 = 0.90;
    pub const QA_ANSWER: f32 = 0.95;
}

/// A relation between two entities within one namespace (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: uuid::Uuid,
    pub namespace: String,
    pub assertion: String,
    pub source_entity: String,
    pub target_entity: String,
    pub confidence: f32,
    pub valid_at: chrono::DateTime<chrono::Utc>,
    pub invalid_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Fact {
    /// A fact is superseded iff `invalid_at` is set (§3); superseded
    /// facts are excluded from retrieval.
    pub fn is_superseded(&self) -> bool {
        self.invalid_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_episode_name_matches_format() {
        assert_eq!(
            Episode::chunk_episode_name("Q3-report.pdf", 4),
            "Q3-report.pdf#chunk-4"
        );
    }

    #[test]
    fn fact_without_invalid_at_is_not_superseded() {
        let fact = Fact {
            id: uuid::Uuid::new_v4(),
            namespace: "org:deal".into(),
            assertion: "Revenue was $4.8M".into(),
            source_entity: "Acme".into(),
            target_entity: "Revenue".into(),
            confidence: confidence::DOCUMENT_SOURCED,
            valid_at: chrono::Utc::now(),
            invalid_at: None,
        };
        assert!(!fact.is_superseded());
    }

    #[test]
    fn fact_with_invalid_at_is_superseded() {
        let mut fact = Fact {
            id: uuid::Uuid::new_v4(),
            namespace: "org:deal".into(),
            assertion: "Revenue was $4.8M".into(),
            source_entity: "Acme".into(),
            target_entity: "Revenue".into(),
            confidence: confidence::DOCUMENT_SOURCED,
            valid_at: chrono::Utc::now(),
            invalid_at: None,
        };
        fact.invalid_at = Some(chrono::Utc::now());
        assert!(fact.is_superseded());
    }
}
