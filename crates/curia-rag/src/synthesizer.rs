use std::sync::Arc;

use tracing::{debug, warn};

use curia_core::traits::LanguageModel;
use curia_core::{Error, Result};

use crate::evidence::EvidenceSet;
use crate::prompt::{answer_prompt, normalize_answer, numbered_context};

/// Turns evidence into a final answer through the language model.
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn synthesize(&self, query: &str, evidence: &EvidenceSet) -> Result<String> {
        self.synthesize_all(query, std::slice::from_ref(evidence))
    }

    /// Answer from several documents' evidence, numbered in the given order.
    /// `Error::InvalidInput` without any evidence item; model failures and
    /// empty answers are `Error::SynthesisUnavailable`.
    pub fn synthesize_all(&self, query: &str, sets: &[EvidenceSet]) -> Result<String> {
        let passages: Vec<String> = sets
            .iter()
            .flat_map(|set| {
                set.items()
                    .iter()
                    .map(move |item| format!("({}, level {}) {}", set.document_id(), item.level, item.text))
            })
            .collect();
        if passages.is_empty() {
            return Err(Error::InvalidInput("no evidence to synthesize an answer from".to_string()));
        }
        let context = numbered_context(passages.iter().map(String::as_str));
        let raw = self.model.generate(&answer_prompt(query), &context).map_err(|e| {
            warn!(error = %e, "answer synthesis failed");
            Error::SynthesisUnavailable(e.to_string())
        })?;
        let answer = normalize_answer(&raw);
        if answer.is_empty() {
            return Err(Error::SynthesisUnavailable("model returned an empty answer".to_string()));
        }
        debug!(passages = passages.len(), chars = answer.len(), "synthesized answer");
        Ok(answer)
    }
}
