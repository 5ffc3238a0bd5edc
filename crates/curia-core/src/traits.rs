use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkHit, Document, DocumentId};

/// Text to vector. Implementations return L2-normalised vectors of `dim()`
/// floats and report failures as `Error::ModelUnavailable`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::ModelUnavailable("embedder returned no vector".to_string()))
    }
}

/// External language model used for summarization and answer synthesis.
pub trait LanguageModel: Send + Sync {
    /// Generate text for `prompt` grounded in `context`.
    /// Fails with `Error::ModelUnavailable`, timeouts included.
    fn generate(&self, prompt: &str, context: &str) -> Result<String>;
}

/// Chunk persistence and nearest-neighbour lookup.
pub trait DocumentStore: Send + Sync {
    /// Replace every chunk of `document_id` with `chunks`.
    fn store_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Chunks of the document ordered by ordinal; empty if unknown.
    fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Attach an embedding to an existing chunk. `Error::NotFound` if absent.
    fn store_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()>;

    /// Up to `k` embedded chunks ranked by similarity to `vector`.
    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>>;

    /// Store a whole document, replacing any previous version.
    fn store_document(&self, document: &Document) -> Result<()>;

    /// `Error::NotFound` if the document has no chunks.
    fn get_document(&self, document_id: &str) -> Result<Document>;

    fn list_documents(&self) -> Result<Vec<DocumentId>>;

    fn delete_document(&self, document_id: &str) -> Result<()>;
}
