#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use curia_core::config::Settings;
use curia_core::similarity::l2_normalize;
use curia_core::traits::{Embedder, LanguageModel};
use curia_core::types::{Chunk, Document};
use curia_core::{Error, Result};

pub const VOCAB: [&str; 8] = ["goods", "tax", "workers", "competition", "asylum", "fishing", "customs", "pension"];

/// One dimension per `VOCAB` word, counting occurrences.
pub struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize {
        VOCAB.len()
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0f32; VOCAB.len()];
                for word in text.split(|c: char| !c.is_alphanumeric()).map(str::to_lowercase) {
                    if let Some(i) = VOCAB.iter().position(|k| *k == word) {
                        v[i] += 1.0;
                    }
                }
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Same vector for every text.
pub struct FixedEmbedder(pub Vec<f32>);

impl Embedder for FixedEmbedder {
    fn dim(&self) -> usize {
        self.0.len()
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.0.clone()).collect())
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize {
        VOCAB.len()
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::ModelUnavailable("embedder offline".to_string()))
    }
}

type Reply = Box<dyn Fn(usize, &str, &str) -> Result<String> + Send + Sync>;

/// Language model double: counts calls, records contexts, replies by script.
pub struct ScriptedModel {
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
    reply: Reply,
}

impl ScriptedModel {
    pub fn new(reply: impl Fn(usize, &str, &str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self { calls: AtomicUsize::new(0), contexts: Mutex::new(Vec::new()), reply: Box::new(reply) }
    }

    /// Replies with the context's words, passage markers removed.
    pub fn echo() -> Self {
        Self::new(|_, _, context| Ok(echo_words(context)))
    }

    /// Echoes, except call number `n` (0-based) fails.
    pub fn failing_on(n: usize) -> Self {
        Self::new(move |call, _, context| {
            if call == n {
                Err(Error::ModelUnavailable("request timed out".to_string()))
            } else {
                Ok(echo_words(context))
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, prompt: &str, context: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        (self.reply)(call, prompt, context)
    }
}

pub fn echo_words(context: &str) -> String {
    context
        .split_whitespace()
        .filter(|w| !(w.starts_with('[') || w.starts_with('(')))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Document `id` with one chunk per text, without embeddings.
pub fn document(id: &str, texts: &[&str]) -> Document {
    let chunks = texts.iter().enumerate().map(|(i, t)| Chunk::new(id, i, *t)).collect();
    Document::new(id, format!("/data/raw/{id}.txt"), chunks)
}

/// `n` chunk texts cycling over the vocabulary.
pub fn numbered_texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("passage {i} about {}", VOCAB[i % VOCAB.len()])).collect()
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.models.embedding_dim = VOCAB.len();
    settings
}
