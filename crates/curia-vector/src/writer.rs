//! Row conversion and writes for the chunk table.
use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use std::sync::Arc;
use tracing::debug;

use curia_core::types::Chunk;

use crate::schema::build_chunk_schema;
use crate::table::sql_literal;

pub fn chunks_to_record_batch(chunks: &[Chunk], doc_path: &str, dim: i32) -> Result<RecordBatch> {
    let schema = build_chunk_schema(dim);
    let mut ids = Vec::with_capacity(chunks.len());
    let mut doc_ids = Vec::with_capacity(chunks.len());
    let mut doc_paths = Vec::with_capacity(chunks.len());
    let mut ordinals = Vec::with_capacity(chunks.len());
    let mut contents = Vec::with_capacity(chunks.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.has_embedding() && chunk.embedding.len() != usize::try_from(dim)? {
            return Err(anyhow!(
                "chunk '{}' has a {}-dim embedding, table expects {dim}",
                chunk.id,
                chunk.embedding.len()
            ));
        }
        ids.push(chunk.id.clone());
        doc_ids.push(chunk.document_id.clone());
        doc_paths.push(doc_path.to_string());
        ordinals.push(i32::try_from(chunk.ordinal)?);
        contents.push(chunk.text.clone());
        vectors.push(chunk.has_embedding().then(|| chunk.embedding.iter().map(|&x| Some(x)).collect()));
    }
    let record_batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(doc_paths)),
            Arc::new(Int32Array::from(ordinals)),
            Arc::new(StringArray::from(contents)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors.into_iter(),
                dim,
            )),
        ],
    )?;
    Ok(record_batch)
}

/// Delete every row of `doc_id`, then append `chunks`.
pub async fn replace_document_rows(table: &Table, doc_id: &str, doc_path: &str, chunks: &[Chunk], dim: i32) -> Result<()> {
    table.delete(&format!("doc_id = {}", sql_literal(doc_id))).await?;
    if chunks.is_empty() {
        return Ok(());
    }
    let batch = chunks_to_record_batch(chunks, doc_path, dim)?;
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    table.add(reader).execute().await?;
    debug!(doc_id, rows = chunks.len(), "replaced document rows");
    Ok(())
}

/// Upsert a single row keyed on `id`.
pub async fn upsert_row(table: &Table, chunk: &Chunk, doc_path: &str, dim: i32) -> Result<()> {
    let batch = chunks_to_record_batch(std::slice::from_ref(chunk), doc_path, dim)?;
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    let mut mi = table.merge_insert(&["id"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await?;
    Ok(())
}
