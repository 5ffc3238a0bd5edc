use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use curia_core::config::ModelSettings;
use curia_core::similarity::l2_normalize;
use curia_core::traits::Embedder;
use curia_core::{Error, Result};

use crate::client::build_client;
use crate::parsing::{api_url, parse_embeddings};

/// `Embedder` over Ollama `/api/embed`, batched by `models.embed_batch_size`.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dim: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.request_timeout_secs)?,
            endpoint: api_url(&settings.endpoint, "api/embed")?,
            model: settings.embed_model_name.clone(),
            dim: settings.embedding_dim,
            batch_size: settings.embed_batch_size.max(1),
        })
    }

    fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({ "model": self.model, "input": texts });
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .map_err(|err| Error::ModelUnavailable(format!("embed request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::ModelUnavailable(format!("embed non-success status: {status}")));
        }
        let value = response
            .json::<Value>()
            .map_err(|err| Error::ModelUnavailable(format!("invalid embed response: {err}")))?;
        parse_embeddings(&value, texts.len(), self.dim)
    }
}

impl Embedder for OllamaEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        // Ollama truncates server-side.
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut vectors = self.embed_request(batch)?;
            for v in &mut vectors {
                l2_normalize(v);
            }
            out.extend(vectors);
        }
        debug!(model = %self.model, n = texts.len(), "embedded batch");
        Ok(out)
    }
}
