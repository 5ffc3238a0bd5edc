use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use curia_core::config::ModelSettings;
use curia_core::traits::LanguageModel;
use curia_core::{Error, Result};

use crate::parsing::{api_url, extract_llm_content};

const SYSTEM_PROMPT: &str = "You are a careful legal research assistant. \
Work only from the context you are given and do not invent facts, parties or citations.";

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|err| Error::ModelUnavailable(format!("client build failed: {err}")))
}

/// `LanguageModel` over Ollama `/api/chat`. Every call carries the
/// configured timeout; a timeout is reported like any other failure.
pub struct OllamaClient {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OllamaClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.request_timeout_secs)?,
            endpoint: api_url(&settings.endpoint, "api/chat")?,
            model: settings.llm_name.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send(&self, user_prompt: &str) -> Result<Value> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_output_tokens
            }
        });
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .map_err(|err| Error::ModelUnavailable(format!("request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::ModelUnavailable(format!("non-success status: {status}")));
        }
        response
            .json::<Value>()
            .map_err(|err| Error::ModelUnavailable(format!("invalid json response: {err}")))
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str, context: &str) -> Result<String> {
        let start = Instant::now();
        let user_prompt = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("Context:\n{context}\n\n{prompt}")
        };
        let value = self.send(&user_prompt)?;
        let text = extract_llm_content(&value)
            .ok_or_else(|| Error::ModelUnavailable("response carries no message content".to_string()))?;
        debug!(model = %self.model, ms = start.elapsed().as_millis(), chars = text.len(), "generated");
        Ok(text)
    }
}
