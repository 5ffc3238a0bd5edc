//! Local embedders: BGE-M3 through candle and a model-free hashing embedder.

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::{pad_row, tokenize_batch_on_device};

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use curia_core::config::{resolve_with_base, ModelSettings};
use curia_core::similarity::l2_normalize;
use curia_core::traits::Embedder;
use curia_core::{Error, Result};

const BGE_M3_MAX_LEN: usize = 256;

fn unavailable(e: impl std::fmt::Display) -> Error {
    Error::ModelUnavailable(e.to_string())
}

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    batch_size: usize,
}

impl BgeM3Embedder {
    /// Load `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, batch_size: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            unavailable(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))
        })?;

        let config_text = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_text)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_text)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| unavailable("config.json has no hidden_size"))?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path).map_err(unavailable)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(unavailable)?;
        info!(dim, "BGE-M3 loaded");

        Ok(Self { model, tokenizer, device, dim, max_len: BGE_M3_MAX_LEN, batch_size: batch_size.max(1) })
    }

    pub fn from_settings(settings: &ModelSettings, base: &Path) -> Result<Self> {
        let dir = resolve_model_dir(settings, base)?;
        let embedder = Self::load(&dir, settings.embed_batch_size)?;
        if embedder.dim != settings.embedding_dim {
            return Err(Error::InvalidConfig(format!(
                "models.embedding_dim is {} but the model at {} produces {}",
                settings.embedding_dim,
                dir.display(),
                embedder.dim
            )));
        }
        Ok(embedder)
    }

    fn embed_rows(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) =
            tokenize_batch_on_device(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((texts.len(), self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_vec2()?)
    }
}

impl Embedder for BgeM3Embedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_rows(batch).map_err(unavailable)?);
        }
        debug!(n = texts.len(), ms = start.elapsed().as_millis(), "embedded batch");
        Ok(out)
    }
}

/// Feature hashing of lower-cased word tokens into `dim` buckets.
///
/// Deterministic and model-free: texts sharing words land close together,
/// which is enough for offline runs and tests. Text without any word token
/// maps to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// `models.model_dir` when set, else the first of `models/bge-m3` and
/// `../models/bge-m3` under `base` that exists.
pub fn resolve_model_dir(settings: &ModelSettings, base: &Path) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = resolve_with_base(base, dir);
        if p.exists() {
            return Ok(p);
        }
        warn!(dir = %p.display(), "configured model_dir does not exist");
    }
    ["models/bge-m3", "../models/bge-m3"]
        .iter()
        .map(|rel| base.join(rel))
        .find(|p| p.exists())
        .ok_or_else(|| Error::InvalidConfig("could not locate a BGE-M3 model directory".to_string()))
}
