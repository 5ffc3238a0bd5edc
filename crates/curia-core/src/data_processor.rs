use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

const SOURCE_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Turns a directory of extracted judgment texts into chunked documents.
#[derive(Default)]
pub struct DataProcessor {
    chunking: ChunkingSettings,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking: ChunkingSettings) -> Result<Self> {
        chunking.validate()?;
        Ok(Self { chunking })
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        let files = self.list_source_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no source files found");
            return Ok(vec![]);
        }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, total = files.len(), "processing file");
            documents.push(self.process_file(file_path, data_dir)?);
        }
        let chunk_count: usize = documents.iter().map(|d| d.chunks.len()).sum();
        info!(files = files.len(), chunks = chunk_count, "processed directory");
        Ok(documents)
    }

    pub fn process_file(&self, file_path: &Path, data_dir: &Path) -> Result<Document> {
        let content = self.read_file_content(file_path)?;
        let doc_id = document_id_for(file_path, data_dir)?;
        let chunks = self
            .chunk_text(&content)
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk::new(&doc_id, ordinal, text))
            .collect();
        Ok(Document::new(doc_id, file_path.to_string_lossy(), chunks))
    }

    /// Split `text` into windows of `chunk_size` words, consecutive windows
    /// sharing `overlap` words. Text shorter than one window yields one chunk.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.chunking.chunk_size - self.chunking.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunking.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() { break; }
            start += step;
        }
        chunks
    }

    pub fn list_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext)))
            .collect();
        files.sort();
        files
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }
}

/// Document identity: path relative to the data directory, extension
/// dropped, `/`-separated.
pub fn document_id_for(file_path: &Path, data_dir: &Path) -> Result<String> {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    let stem = relative.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(Error::InvalidInput(format!("cannot derive a document id from {}", file_path.display())));
    }
    Ok(parts.join("/"))
}
