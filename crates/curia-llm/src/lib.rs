//! HTTP clients for a local Ollama-compatible model server.

mod client;
mod embed;
mod parsing;

pub use client::OllamaClient;
pub use embed::OllamaEmbedder;
pub use parsing::{extract_llm_content, parse_embeddings};
