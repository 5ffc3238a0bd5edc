//! LanceDB connection and table housekeeping.
use anyhow::{bail, Result};
use arrow_array::RecordBatchIterator;
use arrow_schema::DataType;
use lancedb::{connect, Connection, Table};

use crate::schema::build_chunk_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// Create the chunk table if absent. An existing table must store vectors
/// of `dim` floats.
pub async fn ensure_chunk_table(conn: &Connection, name: &str, dim: i32) -> Result<()> {
    if !conn.table_names().execute().await?.iter().any(|n| n == name) {
        let schema = build_chunk_schema(dim);
        let empty = RecordBatchIterator::new(vec![].into_iter(), schema);
        conn.create_table(name, Box::new(empty)).execute().await?;
        return Ok(());
    }
    let schema = open_table(conn, name).await?.schema().await?;
    match schema.field_with_name("vector")?.data_type() {
        DataType::FixedSizeList(_, stored) if *stored == dim => Ok(()),
        DataType::FixedSizeList(_, stored) => bail!("table '{name}' stores {stored}-dim vectors, expected {dim}"),
        other => bail!("table '{name}' has an unexpected vector column type {other:?}"),
    }
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    Ok(conn.open_table(name).execute().await?)
}

/// Quote a value for use inside a SQL filter string literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
