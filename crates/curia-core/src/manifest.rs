//! Processed-files record for incremental ingestion.
//!
//! A file is re-ingested only when it is new, or when its modification time
//! moved and its BLAKE3 content hash differs from the recorded one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::Result;
use crate::types::DocumentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub modified_ms: i64,
    pub content_hash: String,
}

impl FileFingerprint {
    pub fn of(path: &Path) -> Result<Self> {
        let modified = fs::metadata(path)?.modified()?;
        let modified_ms = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let content_hash = blake3::hash(&fs::read(path)?).to_hex().to_string();
        Ok(Self { modified_ms, content_hash })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub fingerprint: FileFingerprint,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestManifest {
    files: BTreeMap<String, FileRecord>,
}

impl IngestManifest {
    /// A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// The file's current fingerprint when it must be (re-)ingested.
    pub fn pending(&self, path: &Path) -> Result<Option<FileFingerprint>> {
        let current = FileFingerprint::of(path)?;
        match self.files.get(&key(path)) {
            None => Ok(Some(current)),
            Some(record) if record.fingerprint.modified_ms == current.modified_ms => Ok(None),
            Some(record) if record.fingerprint.content_hash == current.content_hash => Ok(None),
            Some(_) => Ok(Some(current)),
        }
    }

    pub fn record(&mut self, path: &Path, document_id: &str, fingerprint: FileFingerprint) {
        self.files.insert(
            key(path),
            FileRecord { document_id: document_id.to_string(), fingerprint, ingested_at: Utc::now() },
        );
    }

    /// Drop records of files that no longer exist; returns their documents.
    pub fn forget_missing(&mut self, existing: &[PathBuf]) -> Vec<DocumentId> {
        let live: std::collections::HashSet<String> = existing.iter().map(|p| key(p)).collect();
        let gone: Vec<String> = self.files.keys().filter(|k| !live.contains(*k)).cloned().collect();
        gone.into_iter()
            .filter_map(|k| self.files.remove(&k))
            .map(|r| r.document_id)
            .collect()
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(&key(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
