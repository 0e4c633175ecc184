//! Data types shared by the splitter, the chunk table, and the pipeline stages.

use serde::{Deserialize, Serialize};

/// Provenance stored with every chunk, serialized as JSON in the chunk table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Full path of the document the chunk came from.
    pub source: String,
    /// 1-based position of the chunk within its document.
    pub chunk_index: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Page number for paginated formats, starting at 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// `text` or `table` for markdown chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// One chunk produced by the splitter, before it is staged.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A staged chunk still waiting for its embedding.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk_id: i64,
    pub text: String,
}

/// A staged chunk that has an embedding but is not yet in the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk_id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub source: Option<String>,
    pub page: Option<u32>,
}
