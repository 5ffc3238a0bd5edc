//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `CURIA_*` env vars (`__` separates sections, e.g.
//! `CURIA_RETRIEVAL__STOP_THRESHOLD=0.7`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    settings: Settings,
}

impl Config {
    /// Load from the current directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Merge defaults, `config.toml`, `config.<env>.toml` and `CURIA_*`
    /// variables, in that order. `RUST_ENV` selects the env file.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("CURIA_").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(Self { figment, settings })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub models: ModelSettings,
    pub hierarchy: HierarchySettings,
    pub retrieval: RetrievalSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.models.validate()?;
        self.hierarchy.validate()?;
        self.retrieval.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub data_path: String,
    pub db_path: String,
    pub collection_name: String,
    /// Summary index snapshot, relative to `db_path`.
    pub index_file: String,
    /// Processed-files record, relative to `db_path`.
    pub manifest_file: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_path: "data/raw".to_string(),
            db_path: "data/databases".to_string(),
            collection_name: "curia_docs".to_string(),
            index_file: "summary_index.json".to_string(),
            manifest_file: "processed.json".to_string(),
        }
    }
}

impl DataSettings {
    pub fn data_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.data_path)
    }

    pub fn db_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.db_path)
    }

    pub fn index_path(&self, base: &Path) -> PathBuf {
        self.db_dir(base).join(&self.index_file)
    }

    pub fn manifest_path(&self, base: &Path) -> PathBuf {
        self.db_dir(base).join(&self.manifest_file)
    }
}

/// Word-window chunking; windows advance by `chunk_size - overlap` words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 512, overlap: 64 }
    }
}

impl ChunkingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be positive".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderKind {
    /// Ollama `/api/embed`.
    Ollama,
    /// Local BGE-M3 weights through candle.
    BgeM3,
    /// Deterministic token hashing; no model required.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub endpoint: String,
    pub llm_name: String,
    pub embed_model_name: String,
    pub embedder: EmbedderKind,
    pub embedding_dim: usize,
    pub model_dir: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub embed_batch_size: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            llm_name: "initium/law_model".to_string(),
            embed_model_name: "all-minilm:l6-v2".to_string(),
            embedder: EmbedderKind::Ollama,
            embedding_dim: 384,
            model_dir: None,
            request_timeout_secs: 120,
            temperature: 0.1,
            max_output_tokens: 512,
            embed_batch_size: 32,
        }
    }
}

impl ModelSettings {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig("models.request_timeout_secs must be positive".to_string()));
        }
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("models.embedding_dim must be positive".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("models.embed_batch_size must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::InvalidConfig(format!(
                "models.temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySettings {
    /// Nodes summarized together into one parent.
    pub group_size: usize,
    /// Total levels including the chunk level; the root sits at most at
    /// level `max_depth - 1`.
    pub max_depth: u32,
    pub max_summary_chars: usize,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self { group_size: 5, max_depth: 3, max_summary_chars: 2000 }
    }
}

impl HierarchySettings {
    pub fn validate(&self) -> Result<()> {
        if self.group_size < 2 {
            return Err(Error::InvalidConfig("hierarchy.group_size must be at least 2".to_string()));
        }
        if self.max_depth < 2 {
            return Err(Error::InvalidConfig("hierarchy.max_depth must be at least 2".to_string()));
        }
        if self.max_summary_chars == 0 {
            return Err(Error::InvalidConfig("hierarchy.max_summary_chars must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// A node scoring at or above this is evidence on its own.
    pub stop_threshold: f32,
    /// Children scoring below this are pruned.
    pub descend_threshold: f32,
    pub documents_per_query: usize,
    /// Chunks requested from the store when selecting documents.
    pub candidate_chunks: usize,
    /// Opt-in cap on evidence items per document; unset keeps every one.
    pub max_evidence: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            stop_threshold: 0.80,
            descend_threshold: 0.35,
            documents_per_query: 3,
            candidate_chunks: 20,
            max_evidence: None,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("stop_threshold", self.stop_threshold), ("descend_threshold", self.descend_threshold)] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!("retrieval.{name} must be within [-1, 1], got {value}")));
            }
        }
        if self.documents_per_query == 0 || self.candidate_chunks == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.documents_per_query and retrieval.candidate_chunks must be positive".to_string(),
            ));
        }
        if self.max_evidence == Some(0) {
            return Err(Error::InvalidConfig("retrieval.max_evidence must be positive when set".to_string()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
