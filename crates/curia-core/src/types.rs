//! Domain types shared by the store, the summary hierarchy and retrieval.

use serde::{Deserialize, Serialize};

pub type DocumentId = String;
pub type ChunkId = String;
pub type NodeId = String;

/// Stable chunk identifier: `<document id>:<ordinal>`.
pub fn chunk_id(document_id: &str, ordinal: usize) -> ChunkId {
    format!("{document_id}:{ordinal}")
}

/// A source document as produced by ingestion.
///
/// - `id`: stable document identity (path relative to the data directory)
/// - `source_path`: original path to the source file
/// - `chunks`: ordered by `Chunk::ordinal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_path: String,
    pub chunks: Vec<Chunk>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, source_path: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self { id: id.into(), source_path: source_path.into(), chunks }
    }
}

/// Smallest retrievable unit of a document and the leaf of its summary
/// hierarchy. `embedding` is empty until one is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub text: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(document_id: &str, ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            id: chunk_id(document_id, ordinal),
            document_id: document_id.to_string(),
            ordinal,
            text: text.into(),
            embedding: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A node of a document's summary hierarchy.
///
/// Level 0 nodes stand in for chunks: they carry `chunk_id` and an empty
/// `text`, the chunk text stays in the document store. Coarser levels carry
/// summary text derived only from their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub id: NodeId,
    pub level: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub children: Vec<NodeId>,
    pub document_id: DocumentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,
}

impl SummaryNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Ranked result of a nearest-neighbour lookup over chunk embeddings.
/// Higher `score` is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f32,
}
