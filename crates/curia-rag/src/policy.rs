//! Progressive retrieval over a summary hierarchy.
//!
//! Starting at the root, a node that is similar enough to the query (or is a
//! leaf) becomes evidence; otherwise its children are scored, those below the
//! descend threshold are pruned and the rest are evaluated recursively. A
//! node whose children are all pruned is kept as evidence itself, so a
//! reached branch always contributes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use curia_core::config::RetrievalSettings;
use curia_core::similarity::cosine;
use curia_core::traits::{DocumentStore, Embedder};
use curia_core::types::SummaryNode;
use curia_core::{Error, Result};

use crate::evidence::{EvidenceItem, EvidenceSet, ResolutionStats};
use crate::index::{DocumentTree, SummaryIndex};

/// A node that ended a branch, with its score.
#[derive(Debug, Clone)]
struct Hit<'t> {
    node: &'t SummaryNode,
    score: f32,
}

#[derive(Debug, Default)]
struct Branch<'t> {
    hits: Vec<Hit<'t>>,
    stats: ResolutionStats,
}

impl<'t> Branch<'t> {
    fn done(node: &'t SummaryNode, score: f32) -> Self {
        Self { hits: vec![Hit { node, score }], stats: ResolutionStats::default() }
    }

    fn merge(mut self, other: Self) -> Self {
        self.hits.extend(other.hits);
        self.stats.nodes_scored += other.stats.nodes_scored;
        self.stats.pruned += other.stats.pruned;
        self.stats.fallbacks += other.stats.fallbacks;
        self
    }
}

/// Score descending, then finer level first, then node id.
fn evidence_order(a: &Hit<'_>, b: &Hit<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.node.level.cmp(&b.node.level))
        .then_with(|| a.node.id.cmp(&b.node.id))
}

pub struct RetrievalPolicy {
    index: Arc<SummaryIndex>,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    settings: RetrievalSettings,
}

impl RetrievalPolicy {
    pub fn new(
        index: Arc<SummaryIndex>,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self { index, store, embedder, settings })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Evidence for `query` from `document_id`'s hierarchy.
    /// `Error::IndexUnavailable` when the document has no hierarchy.
    pub fn resolve(&self, query: &str, document_id: &str) -> Result<EvidenceSet> {
        // fail before paying for the query embedding
        self.index.tree(document_id)?;
        let query_vector = self.embedder.embed(query)?;
        self.resolve_embedded(query, &query_vector, document_id)
    }

    /// Like `resolve` with a precomputed query embedding.
    pub fn resolve_embedded(&self, query: &str, query_vector: &[f32], document_id: &str) -> Result<EvidenceSet> {
        let tree = self.index.tree(document_id)?;
        let root = tree.root();
        let root_score = cosine(query_vector, &root.embedding)?;
        let mut branch = self.evaluate(&tree, root, root_score, query_vector)?;
        branch.stats.nodes_scored += 1;

        branch.hits.sort_by(evidence_order);
        if let Some(max) = self.settings.max_evidence {
            branch.hits.truncate(max.max(1));
        }

        let chunk_text = self.leaf_texts(document_id, &branch.hits)?;
        let mut evidence = EvidenceSet::new(query, document_id);
        for hit in &branch.hits {
            let text = match &hit.node.chunk_id {
                Some(chunk_id) => chunk_text
                    .get(chunk_id.as_str())
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("chunk '{chunk_id}' of '{document_id}'")))?,
                None => hit.node.text.clone(),
            };
            evidence.push(EvidenceItem { node_id: hit.node.id.clone(), level: hit.node.level, text, score: hit.score });
        }
        evidence.set_stats(branch.stats);
        debug!(
            document_id,
            items = evidence.len(),
            scored = branch.stats.nodes_scored,
            pruned = branch.stats.pruned,
            fallbacks = branch.stats.fallbacks,
            "resolved evidence"
        );
        Ok(evidence)
    }

    fn evaluate<'t>(&self, tree: &'t DocumentTree, node: &'t SummaryNode, score: f32, query_vector: &[f32]) -> Result<Branch<'t>> {
        if score >= self.settings.stop_threshold || node.is_leaf() {
            debug!(node = %node.id, level = node.level, score, "evidence");
            return Ok(Branch::done(node, score));
        }

        let scored: Vec<Hit<'t>> = tree
            .children(node)
            .into_par_iter()
            .map(|child| Ok(Hit { node: child, score: cosine(query_vector, &child.embedding)? }))
            .collect::<Result<_>>()?;
        let (kept, pruned): (Vec<Hit<'t>>, Vec<Hit<'t>>) =
            scored.into_iter().partition(|h| h.score >= self.settings.descend_threshold);

        let mut branch = Branch {
            hits: Vec::new(),
            stats: ResolutionStats { nodes_scored: kept.len() + pruned.len(), pruned: pruned.len(), fallbacks: 0 },
        };
        if kept.is_empty() {
            debug!(node = %node.id, level = node.level, score, "all children pruned, keeping parent");
            branch.hits.push(Hit { node, score });
            branch.stats.fallbacks += 1;
            return Ok(branch);
        }

        let children = kept
            .into_par_iter()
            .map(|hit| self.evaluate(tree, hit.node, hit.score, query_vector))
            .collect::<Result<Vec<_>>>()?;
        Ok(children.into_iter().fold(branch, Branch::merge))
    }

    /// Chunk text for the leaf hits, read once from the store.
    fn leaf_texts(&self, document_id: &str, hits: &[Hit<'_>]) -> Result<HashMap<String, String>> {
        if hits.iter().all(|h| h.node.chunk_id.is_none()) {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .get_chunks(document_id)?
            .into_iter()
            .map(|c| (c.id, c.text))
            .collect())
    }
}
