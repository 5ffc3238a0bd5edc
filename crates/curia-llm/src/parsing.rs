use reqwest::Url;
use serde_json::Value;

use curia_core::{Error, Result};

/// `{endpoint}/{path}`, rejecting anything that is not plain http(s).
pub(crate) fn api_url(endpoint: &str, path: &str) -> Result<Url> {
    let raw = format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'));
    let url = Url::parse(&raw).map_err(|err| Error::InvalidConfig(format!("invalid model endpoint '{endpoint}': {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidConfig(format!("unsupported model endpoint scheme: {other}"))),
    }
}

/// Text of a chat completion. Accepts Ollama chat, OpenAI-style `choices`
/// and Ollama `/api/generate` shapes.
pub fn extract_llm_content(value: &Value) -> Option<String> {
    if let Some(content) = value
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    if let Some(content) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    value.get("response").and_then(Value::as_str).map(str::to_string)
}

/// Vectors of an `/api/embed` response; each must have `dim` entries.
pub fn parse_embeddings(value: &Value, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let rows = value
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ModelUnavailable("embed response has no 'embeddings' array".to_string()))?;
    if rows.len() != expected {
        return Err(Error::ModelUnavailable(format!(
            "embedder returned {} vectors for {expected} inputs",
            rows.len()
        )));
    }
    rows.iter()
        .map(|row| {
            let values = row
                .as_array()
                .ok_or_else(|| Error::ModelUnavailable("embedding is not an array".to_string()))?;
            if values.len() != dim {
                return Err(Error::ModelUnavailable(format!(
                    "embedding has {} dims, expected {dim}",
                    values.len()
                )));
            }
            values
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| Error::ModelUnavailable("embedding value is not a number".to_string()))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_llm_content_reads_known_shapes() {
        assert_eq!(
            extract_llm_content(&json!({"message": {"role": "assistant", "content": "chat"}})).as_deref(),
            Some("chat")
        );
        assert_eq!(
            extract_llm_content(&json!({"choices": [{"message": {"content": "openai"}}]})).as_deref(),
            Some("openai")
        );
        assert_eq!(extract_llm_content(&json!({"response": "generate"})).as_deref(), Some("generate"));
        assert_eq!(extract_llm_content(&json!({"done": true})), None);
    }

    #[test]
    fn parse_embeddings_checks_count_and_dim() {
        let value = json!({"embeddings": [[0.5, 0.5], [1.0, 0.0]]});
        assert_eq!(parse_embeddings(&value, 2, 2).unwrap(), vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
        assert_eq!(parse_embeddings(&value, 3, 2).unwrap_err().code(), "MODEL_UNAVAILABLE");
        assert_eq!(parse_embeddings(&value, 2, 3).unwrap_err().code(), "MODEL_UNAVAILABLE");
        assert!(parse_embeddings(&json!({"embedding": [0.1]}), 1, 1).is_err());
        assert!(parse_embeddings(&json!({"embeddings": [["x"]]}), 1, 1).is_err());
    }

    #[test]
    fn api_url_joins_and_validates() {
        assert_eq!(api_url("http://127.0.0.1:11434/", "/api/chat").unwrap().as_str(), "http://127.0.0.1:11434/api/chat");
        assert_eq!(api_url("ftp://host", "api/chat").unwrap_err().code(), "INVALID_CONFIG");
        assert_eq!(api_url("not a url", "api/chat").unwrap_err().code(), "INVALID_CONFIG");
    }
}
