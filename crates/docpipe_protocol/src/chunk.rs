//! Chunk, table, and formula records (§3).

use crate::ids::DocumentId;
use serde::{Deserialize, Serialize};

/// Default maximum token count for a chunk (exceeded only by single-sentence overflow).
pub const CHUNK_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    Table,
    Formula,
    Image,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Formula => "formula",
            Self::Image => "image",
        }
    }
}

/// Per-kind metadata carried alongside a chunk's content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page: Option<u32>,
    pub sheet_name: Option<String>,
    pub cell_reference: Option<String>,
    pub source_formula: Option<String>,
}

/// An atomic unit of text ready for embedding (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: uuid::Uuid,
    pub document_id: DocumentId,
    /// 0-based, dense, contiguous within the document.
    pub index: u32,
    pub kind: ChunkKind,
    pub content: String,
    pub token_count: u32,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(
        document_id: DocumentId,
        index: u32,
        kind: ChunkKind,
        content: impl Into<String>,
        token_count: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            document_id,
            index,
            kind,
            content: content.into(),
            token_count,
            metadata: ChunkMetadata::default(),
            embedding: None,
        }
    }
}

/// Verify a chunk set satisfies the dense, 0-based, contiguous index invariant (§8).
pub fn chunk_indices_are_contiguous(chunks: &[Chunk]) -> bool {
    let mut indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
    indices.sort_unstable();
    indices.iter().enumerate().all(|(i, &idx)| i as u32 == idx)
}

/// A table reconstructible from a document's table-kind chunks (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub sheet_name: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A formula reconstructible from a document's formula-kind chunks (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub cell_reference: String,
    pub formula: String,
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(idx: u32) -> Chunk {
        Chunk::new(DocumentId::new(), idx, ChunkKind::Text, "x", 1)
    }

    #[test]
    fn detects_contiguous_indices() {
        let chunks = vec![chunk(0), chunk(1), chunk(2)];
        assert!(chunk_indices_are_contiguous(&chunks));
    }

    #[test]
    fn detects_gap() {
        let chunks = vec![chunk(0), chunk(2)];
        assert!(!chunk_indices_are_contiguous(&chunks));
    }

    #[test]
    fn empty_set_is_contiguous() {
        assert!(chunk_indices_are_contiguous(&[]));
    }
}
