use std::future::Future;
use std::path::Path;

use lancedb::{Connection, Table};
use tokio::runtime::Runtime;
use tracing::info;

use curia_core::store::check_ownership;
use curia_core::traits::DocumentStore;
use curia_core::types::{Chunk, ChunkHit, Document, DocumentId};
use curia_core::{Error, Result};

use crate::search::{distinct_doc_ids, nearest, scan_rows};
use crate::table::{ensure_chunk_table, open_db, open_table, sql_literal};
use crate::writer::{replace_document_rows, upsert_row};

fn store_err(e: anyhow::Error) -> Error {
    Error::Store(format!("{e:#}"))
}

/// `DocumentStore` over a LanceDB table.
///
/// The trait is synchronous; calls are driven on a private runtime, so the
/// store must not be used from inside another tokio runtime.
pub struct LanceDocumentStore {
    rt: Runtime,
    db: Connection,
    table_name: String,
    dim: i32,
}

impl LanceDocumentStore {
    pub fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dim {dim} too large")))?;
        let rt = Runtime::new()?;
        let uri = db_path.to_string_lossy().to_string();
        let db = rt
            .block_on(async {
                let db = open_db(&uri).await?;
                ensure_chunk_table(&db, table_name, dim).await?;
                Ok::<_, anyhow::Error>(db)
            })
            .map_err(store_err)?;
        info!(uri = %uri, table = table_name, dim, "opened chunk table");
        Ok(Self { rt, db, table_name: table_name.to_string(), dim })
    }

    fn run<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Table) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.rt
            .block_on(async {
                let table = open_table(&self.db, &self.table_name).await?;
                f(table).await
            })
            .map_err(store_err)
    }

    fn existing_path(&self, document_id: &str) -> Result<String> {
        let filter = format!("doc_id = {}", sql_literal(document_id));
        let rows = self.run(|t| async move { scan_rows(&t, &filter).await })?;
        Ok(rows.into_iter().next().map(|r| r.doc_path).unwrap_or_default())
    }
}

impl DocumentStore for LanceDocumentStore {
    fn store_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let ordered = check_ownership(document_id, chunks)?;
        let doc_path = self.existing_path(document_id)?;
        let dim = self.dim;
        self.run(|t| async move { replace_document_rows(&t, document_id, &doc_path, &ordered, dim).await })
    }

    fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let filter = format!("doc_id = {}", sql_literal(document_id));
        let rows = self.run(|t| async move { scan_rows(&t, &filter).await })?;
        Ok(rows.into_iter().map(|r| r.chunk).collect())
    }

    fn store_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        if i32::try_from(vector.len()).ok() != Some(self.dim) {
            return Err(Error::InvalidInput(format!(
                "embedding has {} dims, store expects {}",
                vector.len(),
                self.dim
            )));
        }
        let filter = format!("id = {}", sql_literal(chunk_id));
        let row = self
            .run(|t| async move { scan_rows(&t, &filter).await })?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("chunk '{chunk_id}'")))?;
        let chunk = row.chunk.with_embedding(vector.to_vec());
        let dim = self.dim;
        self.run(|t| async move { upsert_row(&t, &chunk, &row.doc_path, dim).await })
    }

    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
        if i32::try_from(vector.len()).ok() != Some(self.dim) {
            return Err(Error::InvalidInput(format!(
                "query has {} dims, store expects {}",
                vector.len(),
                self.dim
            )));
        }
        self.run(|t| async move { nearest(&t, vector, k).await })
    }

    fn store_document(&self, document: &Document) -> Result<()> {
        let ordered = check_ownership(&document.id, &document.chunks)?;
        let dim = self.dim;
        self.run(|t| async move {
            replace_document_rows(&t, &document.id, &document.source_path, &ordered, dim).await
        })
    }

    fn get_document(&self, document_id: &str) -> Result<Document> {
        let filter = format!("doc_id = {}", sql_literal(document_id));
        let rows = self.run(|t| async move { scan_rows(&t, &filter).await })?;
        let source_path = rows
            .first()
            .map(|r| r.doc_path.clone())
            .ok_or_else(|| Error::NotFound(format!("document '{document_id}'")))?;
        Ok(Document::new(document_id, source_path, rows.into_iter().map(|r| r.chunk).collect()))
    }

    fn list_documents(&self) -> Result<Vec<DocumentId>> {
        self.run(|t| async move { distinct_doc_ids(&t).await })
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        let filter = format!("doc_id = {}", sql_literal(document_id));
        self.run(|t| async move {
            t.delete(&filter).await?;
            Ok(())
        })
    }
}
