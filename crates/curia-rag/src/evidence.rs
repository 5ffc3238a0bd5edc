use serde::Serialize;

use curia_core::types::{DocumentId, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub node_id: NodeId,
    pub level: u32,
    pub text: String,
    pub score: f32,
}

/// Counters of one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    /// Nodes whose similarity to the query was computed.
    pub nodes_scored: usize,
    /// Children dropped below the descend threshold.
    pub pruned: usize,
    /// Parents kept as evidence because no child qualified.
    pub fallbacks: usize,
}

/// Passages gathered for one query over one document, in final order.
/// Items can be appended but never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSet {
    query: String,
    document_id: DocumentId,
    items: Vec<EvidenceItem>,
    stats: ResolutionStats,
}

impl EvidenceSet {
    pub fn new(query: impl Into<String>, document_id: impl Into<DocumentId>) -> Self {
        Self { query: query.into(), document_id: document_id.into(), items: Vec::new(), stats: ResolutionStats::default() }
    }

    pub fn push(&mut self, item: EvidenceItem) {
        self.items.push(item);
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn stats(&self) -> ResolutionStats {
        self.stats
    }

    pub(crate) fn set_stats(&mut self, stats: ResolutionStats) {
        self.stats = stats;
    }
}

/// A synthesized answer and the evidence it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub evidence: Vec<EvidenceSet>,
}
