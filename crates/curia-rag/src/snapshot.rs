//! JSON snapshot of a `SummaryIndex`, written next to the chunk database.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use curia_core::{Error, Result};

use crate::index::{DocumentTree, SummaryIndex};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    next_generation: u64,
    trees: Vec<&'a DocumentTree>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    next_generation: u64,
    trees: Vec<DocumentTree>,
}

impl SummaryIndex {
    /// Write every committed tree to `path` (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let (next_generation, trees) = self.snapshot();
        let out = SnapshotOut { version: SNAPSHOT_VERSION, next_generation, trees: trees.iter().map(Arc::as_ref).collect() };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&out)?)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), documents = trees.len(), "saved summary index");
        Ok(())
    }

    /// Read a snapshot; a missing file is an empty index. Every tree is
    /// validated as it is read.
    pub fn load(path: &Path) -> Result<Self> {
        let index = Self::new();
        if !path.exists() {
            return Ok(index);
        }
        let snapshot: SnapshotIn = serde_json::from_slice(&fs::read(path)?)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::InvalidInput(format!(
                "summary index snapshot version {} is not supported",
                snapshot.version
            )));
        }
        let count = snapshot.trees.len();
        for tree in snapshot.trees {
            index.restore(tree)?;
        }
        index.reserve_generations(snapshot.next_generation);
        info!(path = %path.display(), documents = count, "loaded summary index");
        Ok(index)
    }
}
