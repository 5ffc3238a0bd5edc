//! Tiered summarization and progressive retrieval.
//!
//! - `index`: per-document summary trees, swapped in atomically
//! - `summarizer`: builds a tree bottom-up with the language model
//! - `policy`: descends a tree from the root until evidence is specific enough
//! - `synthesizer`: turns evidence into an answer
//! - `engine`: the `Curia` façade wiring them to a document store

pub mod cancel;
pub mod engine;
pub mod evidence;
pub mod index;
pub mod policy;
pub mod prompt;
mod snapshot;
pub mod summarizer;
pub mod synthesizer;

pub use cancel::CancelToken;
pub use engine::{Curia, IngestReport, Status, SummarizeReport};
pub use evidence::{Answer, EvidenceItem, EvidenceSet, ResolutionStats};
pub use index::{DocumentTree, RebuildGuard, SummaryIndex};
pub use policy::RetrievalPolicy;
pub use summarizer::Summarizer;
pub use synthesizer::AnswerSynthesizer;
