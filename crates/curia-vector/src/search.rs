//! Reads from the chunk table: filtered scans and cosine nearest neighbours.
use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use std::collections::BTreeSet;

use curia_core::types::{Chunk, ChunkHit};

/// A chunk row together with the path of its source document.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub chunk: Chunk,
    pub doc_path: String,
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<ChunkRow>> {
    let ids = string_col(batch, "id")?;
    let doc_ids = string_col(batch, "doc_id")?;
    let doc_paths = string_col(batch, "doc_path")?;
    let contents = string_col(batch, "content")?;
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("ordinal column missing"))?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("vector column missing"))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let embedding = if vectors.is_null(i) {
            Vec::new()
        } else {
            let list = vectors.value(i);
            list.as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow!("vector items are not f32"))?
                .values()
                .to_vec()
        };
        rows.push(ChunkRow {
            chunk: Chunk {
                id: ids.value(i).to_string(),
                document_id: doc_ids.value(i).to_string(),
                ordinal: usize::try_from(ordinals.value(i))?,
                text: contents.value(i).to_string(),
                embedding,
            },
            doc_path: doc_paths.value(i).to_string(),
        });
    }
    Ok(rows)
}

/// Rows matching `filter`, ordered by ordinal.
pub async fn scan_rows(table: &Table, filter: &str) -> Result<Vec<ChunkRow>> {
    let mut stream = table.query().only_if(filter).execute().await?;
    let mut rows = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        rows.extend(rows_from_batch(&batch)?);
    }
    rows.sort_by_key(|r| r.chunk.ordinal);
    Ok(rows)
}

pub async fn distinct_doc_ids(table: &Table) -> Result<Vec<String>> {
    let mut stream = table.query().select(Select::columns(&["doc_id"])).execute().await?;
    let mut ids = BTreeSet::new();
    while let Some(batch) = stream.try_next().await? {
        let col = string_col(&batch, "doc_id")?;
        for i in 0..batch.num_rows() {
            ids.insert(col.value(i).to_string());
        }
    }
    Ok(ids.into_iter().collect())
}

/// Up to `k` embedded chunks by cosine similarity; score is `1 - distance`.
pub async fn nearest(table: &Table, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
    if k == 0 || table.count_rows(Some("vector IS NOT NULL".to_string())).await? == 0 {
        return Ok(Vec::new());
    }
    let mut stream = table
        .vector_search(vector.to_vec())?
        .distance_type(DistanceType::Cosine)
        .only_if("vector IS NOT NULL")
        .limit(k)
        .execute()
        .await?;
    let mut hits = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        let ids = string_col(&batch, "id")?;
        let doc_ids = string_col(&batch, "doc_id")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow!("_distance column missing"))?;
        for i in 0..batch.num_rows() {
            hits.push(ChunkHit {
                chunk_id: ids.value(i).to_string(),
                document_id: doc_ids.value(i).to_string(),
                score: 1.0 - distances.value(i),
            });
        }
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    hits.truncate(k);
    Ok(hits)
}
