//! In-process `DocumentStore`, used by tests and by callers that keep the
//! corpus in memory.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::similarity::cosine;
use crate::traits::DocumentStore;
use crate::types::{Chunk, ChunkHit, Document, DocumentId};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentId, StoredDocument>>,
}

#[derive(Debug, Default, Clone)]
struct StoredDocument {
    source_path: String,
    chunks: Vec<Chunk>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<DocumentId, StoredDocument>>> {
        self.documents.read().map_err(|_| Error::Store("document map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<DocumentId, StoredDocument>>> {
        self.documents.write().map_err(|_| Error::Store("document map lock poisoned".to_string()))
    }
}

/// Validate that every chunk belongs to `document_id`; returns them in ordinal order.
pub fn check_ownership(document_id: &str, chunks: &[Chunk]) -> Result<Vec<Chunk>> {
    if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
        return Err(Error::InvalidInput(format!(
            "chunk '{}' belongs to '{}', not '{}'",
            stray.id, stray.document_id, document_id
        )));
    }
    let mut ordered = chunks.to_vec();
    ordered.sort_by_key(|c| c.ordinal);
    Ok(ordered)
}

impl DocumentStore for InMemoryDocumentStore {
    fn store_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let ordered = check_ownership(document_id, chunks)?;
        let mut docs = self.write()?;
        let entry = docs.entry(document_id.to_string()).or_default();
        entry.chunks = ordered;
        Ok(())
    }

    fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        Ok(self.read()?.get(document_id).map(|d| d.chunks.clone()).unwrap_or_default())
    }

    fn store_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let mut docs = self.write()?;
        let chunk = docs
            .values_mut()
            .flat_map(|d| d.chunks.iter_mut())
            .find(|c| c.id == chunk_id)
            .ok_or_else(|| Error::NotFound(format!("chunk '{chunk_id}'")))?;
        chunk.embedding = vector.to_vec();
        Ok(())
    }

    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
        let docs = self.read()?;
        let mut hits = Vec::new();
        for chunk in docs.values().flat_map(|d| d.chunks.iter()).filter(|c| c.has_embedding()) {
            hits.push(ChunkHit {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                score: cosine(vector, &chunk.embedding)?,
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        hits.truncate(k);
        Ok(hits)
    }

    fn store_document(&self, document: &Document) -> Result<()> {
        let ordered = check_ownership(&document.id, &document.chunks)?;
        self.write()?.insert(
            document.id.clone(),
            StoredDocument { source_path: document.source_path.clone(), chunks: ordered },
        );
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> Result<Document> {
        let docs = self.read()?;
        let stored = docs
            .get(document_id)
            .filter(|d| !d.chunks.is_empty())
            .ok_or_else(|| Error::NotFound(format!("document '{document_id}'")))?;
        Ok(Document::new(document_id, stored.source_path.clone(), stored.chunks.clone()))
    }

    fn list_documents(&self) -> Result<Vec<DocumentId>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        self.write()?.remove(document_id);
        Ok(())
    }
}
