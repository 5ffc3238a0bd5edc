//! The `Curia` façade: ingestion, summarization and question answering over
//! one document store and one summary index.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use curia_core::config::Settings;
use curia_core::data_processor::DataProcessor;
use curia_core::manifest::IngestManifest;
use curia_core::traits::{DocumentStore, Embedder, LanguageModel};
use curia_core::types::{Chunk, Document, DocumentId, SummaryNode};
use curia_core::{Error, Result};

use crate::cancel::CancelToken;
use crate::evidence::{Answer, EvidenceSet};
use crate::index::SummaryIndex;
use crate::policy::RetrievalPolicy;
use crate::summarizer::Summarizer;
use crate::synthesizer::AnswerSynthesizer;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub ingested: Vec<DocumentId>,
    pub chunks: usize,
    /// Files unchanged since the last run.
    pub skipped: usize,
    /// Documents whose source file disappeared.
    pub removed: Vec<DocumentId>,
}

#[derive(Debug, Default)]
pub struct SummarizeReport {
    pub built: Vec<DocumentId>,
    pub failed: Vec<(DocumentId, Error)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub documents: Vec<DocumentId>,
    pub summarized: Vec<DocumentId>,
}

impl Status {
    /// Stored documents without a hierarchy.
    pub fn pending(&self) -> Vec<DocumentId> {
        let done: HashSet<&DocumentId> = self.summarized.iter().collect();
        self.documents.iter().filter(|d| !done.contains(d)).cloned().collect()
    }
}

pub struct Curia {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<SummaryIndex>,
    processor: DataProcessor,
    summarizer: Summarizer,
    policy: RetrievalPolicy,
    synthesizer: AnswerSynthesizer,
}

impl Curia {
    pub fn new(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        index: Arc<SummaryIndex>,
    ) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != settings.models.embedding_dim {
            return Err(Error::InvalidConfig(format!(
                "embedder produces {} dims, models.embedding_dim is {}",
                embedder.dim(),
                settings.models.embedding_dim
            )));
        }
        let processor = DataProcessor::with_chunking(settings.chunking.clone())?;
        let summarizer = Summarizer::new(
            Arc::clone(&model),
            Arc::clone(&embedder),
            Arc::clone(&index),
            settings.hierarchy.clone(),
        )?;
        let policy = RetrievalPolicy::new(
            Arc::clone(&index),
            Arc::clone(&store),
            Arc::clone(&embedder),
            settings.retrieval.clone(),
        )?;
        let synthesizer = AnswerSynthesizer::new(model);
        Ok(Self { settings, store, embedder, index, processor, summarizer, policy, synthesizer })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<SummaryIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Embed chunks that lack an embedding, store each document and drop
    /// the now stale hierarchy. Returns the number of chunks stored.
    ///
    /// Each document is replaced under its rebuild guard, so a summarization
    /// of it in progress fails the ingest with `Error::Conflict` instead of
    /// committing a tree of the old chunks afterwards.
    pub fn ingest(&self, documents: Vec<Document>) -> Result<usize> {
        let mut documents = documents;
        self.embed_missing(documents.iter_mut().flat_map(|d| d.chunks.iter_mut()).collect())?;

        let mut stored = 0;
        for document in &documents {
            let _rebuild = self.index.begin_rebuild(&document.id)?;
            self.index.remove(&document.id);
            if document.chunks.is_empty() {
                warn!(document_id = %document.id, "document has no text, removing it");
                self.store.delete_document(&document.id)?;
                continue;
            }
            self.store.store_document(document)?;
            stored += document.chunks.len();
        }
        info!(documents = documents.len(), chunks = stored, "ingested documents");
        Ok(stored)
    }

    /// Ingest new and changed `.txt`/`.md` files under `dir`, recording them
    /// in `manifest`. With `restart` the store, the index and the manifest
    /// are cleared first. `on_file` sees each file about to be ingested.
    pub fn ingest_directory(
        &self,
        dir: &Path,
        manifest: &mut IngestManifest,
        restart: bool,
        mut on_file: impl FnMut(&Path),
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        if restart {
            for document_id in self.store.list_documents()? {
                self.store.delete_document(&document_id)?;
            }
            self.index.clear();
            *manifest = IngestManifest::default();
            info!("restart requested, cleared store and summary index");
        }

        let files = self.processor.list_source_files(dir);
        for document_id in manifest.forget_missing(&files) {
            let _rebuild = self.index.begin_rebuild(&document_id)?;
            self.index.remove(&document_id);
            self.store.delete_document(&document_id)?;
            report.removed.push(document_id);
        }

        for file in &files {
            let Some(fingerprint) = manifest.pending(file)? else {
                report.skipped += 1;
                continue;
            };
            on_file(file);
            let document = self.processor.process_file(file, dir)?;
            let document_id = document.id.clone();
            report.chunks += self.ingest(vec![document])?;
            manifest.record(file, &document_id, fingerprint);
            report.ingested.push(document_id);
        }
        info!(
            dir = %dir.display(),
            ingested = report.ingested.len(),
            skipped = report.skipped,
            removed = report.removed.len(),
            "directory ingestion finished"
        );
        Ok(report)
    }

    /// Attach any missing chunk embeddings, then build and commit the
    /// document's hierarchy. Returns its root.
    pub fn summarize(&self, document_id: &str, cancel: &CancelToken) -> Result<SummaryNode> {
        let mut document = self.store.get_document(document_id)?;
        let missing: Vec<&mut Chunk> = document.chunks.iter_mut().filter(|c| !c.has_embedding()).collect();
        if !missing.is_empty() {
            let ids: Vec<String> = missing.iter().map(|c| c.id.clone()).collect();
            self.embed_missing(missing)
                .map_err(|e| Error::build_failed(document_id, format!("embedding chunks: {e}")))?;
            for chunk in document.chunks.iter().filter(|c| ids.contains(&c.id)) {
                self.store.store_embedding(&chunk.id, &chunk.embedding)?;
            }
        }
        self.summarizer.build_hierarchy(&document, cancel)
    }

    /// Summarize stored documents, all of them with `force`, otherwise only
    /// those without a hierarchy. Per-document failures are collected;
    /// cancellation stops the run.
    pub fn summarize_pending(
        &self,
        force: bool,
        cancel: &CancelToken,
        mut on_done: impl FnMut(&str, &Result<SummaryNode>),
    ) -> Result<SummarizeReport> {
        let mut report = SummarizeReport::default();
        for document_id in self.store.list_documents()? {
            if !force && self.index.contains(&document_id) {
                continue;
            }
            cancel.check("summarization")?;
            let outcome = self.summarize(&document_id, cancel);
            on_done(&document_id, &outcome);
            match outcome {
                Ok(_) => report.built.push(document_id),
                Err(e @ Error::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "summarization failed");
                    report.failed.push((document_id, e));
                }
            }
        }
        Ok(report)
    }

    /// Distinct documents of the nearest chunks, best first, at most
    /// `retrieval.documents_per_query`.
    pub fn select_documents(&self, query_vector: &[f32]) -> Result<Vec<DocumentId>> {
        let hits = self.store.nearest(query_vector, self.settings.retrieval.candidate_chunks)?;
        let mut seen = HashSet::new();
        Ok(hits
            .into_iter()
            .filter(|h| seen.insert(h.document_id.clone()))
            .map(|h| h.document_id)
            .take(self.settings.retrieval.documents_per_query)
            .collect())
    }

    /// Answer `query` from the most relevant summarized documents.
    ///
    /// `Error::NotFound` when no document matches; `Error::IndexUnavailable`
    /// when matching documents exist but none has been summarized.
    pub fn ask(&self, query: &str) -> Result<Answer> {
        let query_vector = self.embedder.embed(query)?;
        let candidates = self.select_documents(&query_vector)?;
        let Some(first) = candidates.first().cloned() else {
            return Err(Error::NotFound("no stored document matches the query".to_string()));
        };
        let selected: Vec<DocumentId> = candidates.into_iter().filter(|d| self.index.contains(d)).collect();
        if selected.is_empty() {
            return Err(Error::IndexUnavailable(first));
        }
        let evidence = selected
            .iter()
            .map(|document_id| self.policy.resolve_embedded(query, &query_vector, document_id))
            .collect::<Result<Vec<EvidenceSet>>>()?;
        let text = self.synthesizer.synthesize_all(query, &evidence)?;
        Ok(Answer { text, evidence })
    }

    /// Answer `query` from a single document.
    pub fn ask_document(&self, query: &str, document_id: &str) -> Result<Answer> {
        let evidence = self.policy.resolve(query, document_id)?;
        let text = self.synthesizer.synthesize(query, &evidence)?;
        Ok(Answer { text, evidence: vec![evidence] })
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status { documents: self.store.list_documents()?, summarized: self.index.documents() })
    }

    pub fn save_index(&self, path: &Path) -> Result<()> {
        self.index.save(path)
    }

    /// Fill in embeddings of `chunks`, `models.embed_batch_size` at a time.
    fn embed_missing(&self, chunks: Vec<&mut Chunk>) -> Result<()> {
        let mut chunks: Vec<&mut Chunk> = chunks.into_iter().filter(|c| !c.has_embedding()).collect();
        for batch in chunks.chunks_mut(self.settings.models.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(Error::ModelUnavailable(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                if vector.len() != self.settings.models.embedding_dim {
                    return Err(Error::ModelUnavailable(format!(
                        "embedding of '{}' has {} dims, expected {}",
                        chunk.id,
                        vector.len(),
                        self.settings.models.embedding_dim
                    )));
                }
                chunk.embedding = vector;
            }
        }
        Ok(())
    }
}
