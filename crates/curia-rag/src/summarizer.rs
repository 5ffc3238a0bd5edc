//! Bottom-up construction of a document's summary hierarchy.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use curia_core::config::HierarchySettings;
use curia_core::traits::{Embedder, LanguageModel};
use curia_core::types::{Chunk, Document, NodeId, SummaryNode};
use curia_core::{Error, Result};

use crate::cancel::CancelToken;
use crate::index::{node_id, DocumentTree, SummaryIndex};
use crate::prompt::{extractive_summary, normalize_summary, numbered_context, summary_prompt};

/// A node of the level being built together with the text its parent
/// summarizes: chunk text for leaves, summary text above.
struct Pending {
    node: SummaryNode,
    text: String,
}

pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<SummaryIndex>,
    settings: HierarchySettings,
}

impl Summarizer {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<SummaryIndex>,
        settings: HierarchySettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self { model, embedder, index, settings })
    }

    /// Build and commit the hierarchy of `document`; returns its root.
    ///
    /// Nothing is committed unless the whole build succeeds, so a failed or
    /// cancelled build leaves the previous tree of the document in place.
    /// `Error::Conflict` if the document is already being rebuilt.
    pub fn build_hierarchy(&self, document: &Document, cancel: &CancelToken) -> Result<SummaryNode> {
        let guard = self.index.begin_rebuild(&document.id)?;
        let start = Instant::now();
        let tree = self.build_tree(document, guard.generation(), cancel)?;
        let tree = guard.commit(tree)?;
        info!(
            document_id = %document.id,
            nodes = tree.len(),
            depth = tree.depth(),
            ms = start.elapsed().as_millis(),
            "built summary hierarchy"
        );
        Ok(tree.root().clone())
    }

    /// Build a tree for `generation` without publishing it.
    pub fn build_tree(&self, document: &Document, generation: u64, cancel: &CancelToken) -> Result<DocumentTree> {
        if document.chunks.is_empty() {
            return Err(Error::InvalidInput(format!("document '{}' has no chunks", document.id)));
        }
        let mut chunks: Vec<&Chunk> = document.chunks.iter().collect();
        chunks.sort_by_key(|c| c.ordinal);
        if let Some(stray) = chunks.iter().find(|c| c.document_id != document.id) {
            return Err(Error::InvalidInput(format!("chunk '{}' does not belong to '{}'", stray.id, document.id)));
        }

        let embeddings = self.leaf_embeddings(&document.id, &chunks)?;
        let mut all_nodes: Vec<SummaryNode> = Vec::new();
        let mut current: Vec<Pending> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(n, (chunk, embedding))| Pending {
                node: SummaryNode {
                    id: node_id(&document.id, generation, 0, n),
                    level: 0,
                    text: String::new(),
                    embedding,
                    children: Vec::new(),
                    document_id: document.id.clone(),
                    chunk_id: Some(chunk.id.clone()),
                },
                text: chunk.text.clone(),
            })
            .collect();

        let top_level = self.settings.max_depth - 1;
        let mut level = 0u32;
        while current.len() > 1 {
            level += 1;
            let group_size = if level >= top_level { current.len() } else { self.settings.group_size };
            let groups: Vec<&[Pending]> = current.chunks(group_size).collect();
            let is_root = groups.len() == 1;
            debug!(document_id = %document.id, level, groups = groups.len(), "summarizing level");

            let mut next = Vec::with_capacity(groups.len());
            for (n, group) in groups.iter().enumerate() {
                cancel.check(&format!("summarization of '{}'", document.id))?;
                let text = self.summarize_group(&document.id, level, n, group, is_root)?;
                let embedding = self
                    .embedder
                    .embed(&text)
                    .map_err(|e| Error::build_failed(&document.id, format!("embedding level {level} group {n}: {e}")))?;
                next.push(Pending {
                    node: SummaryNode {
                        id: node_id(&document.id, generation, level, n),
                        level,
                        text: text.clone(),
                        embedding,
                        children: group.iter().map(|p| p.node.id.clone()).collect::<Vec<NodeId>>(),
                        document_id: document.id.clone(),
                        chunk_id: None,
                    },
                    text,
                });
            }
            all_nodes.extend(current.into_iter().map(|p| p.node));
            current = next;
        }

        let root = current
            .pop()
            .map(|p| p.node)
            .ok_or_else(|| Error::build_failed(&document.id, "no root produced"))?;
        let root_id = root.id.clone();
        all_nodes.push(root);
        DocumentTree::new(&document.id, generation, root_id, all_nodes)
    }

    /// Chunk embeddings, computing the missing ones in one batch.
    fn leaf_embeddings(&self, document_id: &str, chunks: &[&Chunk]) -> Result<Vec<Vec<f32>>> {
        let missing: Vec<String> = chunks.iter().filter(|c| !c.has_embedding()).map(|c| c.text.clone()).collect();
        if missing.is_empty() {
            return Ok(chunks.iter().map(|c| c.embedding.clone()).collect());
        }
        let mut computed = self
            .embedder
            .embed_batch(&missing)
            .map_err(|e| Error::build_failed(document_id, format!("embedding chunks: {e}")))?
            .into_iter();
        chunks
            .iter()
            .map(|c| {
                if c.has_embedding() {
                    Ok(c.embedding.clone())
                } else {
                    computed
                        .next()
                        .ok_or_else(|| Error::build_failed(document_id, "embedder returned too few vectors"))
                }
            })
            .collect()
    }

    fn summarize_group(&self, document_id: &str, level: u32, n: usize, group: &[Pending], is_root: bool) -> Result<String> {
        let context = numbered_context(group.iter().map(|p| p.text.as_str()));
        let raw = self
            .model
            .generate(&summary_prompt(level, is_root), &context)
            .map_err(|e| Error::build_failed(document_id, format!("summarizing level {level} group {n}: {e}")))?;
        let text = normalize_summary(&raw, self.settings.max_summary_chars);
        if !text.is_empty() {
            return Ok(text);
        }
        warn!(document_id, level, group = n, "model returned an empty summary, using an extractive one");
        let fallback = extractive_summary(group.iter().map(|p| p.text.as_str()), self.settings.max_summary_chars);
        if fallback.is_empty() {
            return Err(Error::build_failed(document_id, format!("level {level} group {n} has no text to summarize")));
        }
        Ok(fallback)
    }
}
