//! Per-document summary hierarchies.
//!
//! A tree is built off to the side and published with one swap of an
//! `Arc<DocumentTree>`; readers clone the `Arc` and never see a partial
//! tree. At most one rebuild per document runs at a time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use curia_core::types::{DocumentId, NodeId, SummaryNode};
use curia_core::{Error, Result};

/// Node identifier for the `n`-th node of `level` in build `generation`.
pub fn node_id(document_id: &str, generation: u64, level: u32, n: usize) -> NodeId {
    format!("{document_id}#g{generation}/l{level}/{n}")
}

/// One committed hierarchy: a root and every node reachable from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct DocumentTree {
    document_id: DocumentId,
    generation: u64,
    root: NodeId,
    nodes: BTreeMap<NodeId, SummaryNode>,
}

#[derive(Deserialize)]
struct RawTree {
    document_id: DocumentId,
    generation: u64,
    root: NodeId,
    nodes: BTreeMap<NodeId, SummaryNode>,
}

impl TryFrom<RawTree> for DocumentTree {
    type Error = Error;

    fn try_from(raw: RawTree) -> Result<Self> {
        Self::new(raw.document_id, raw.generation, raw.root, raw.nodes.into_values())
    }
}

impl DocumentTree {
    pub fn new(
        document_id: impl Into<DocumentId>,
        generation: u64,
        root: impl Into<NodeId>,
        nodes: impl IntoIterator<Item = SummaryNode>,
    ) -> Result<Self> {
        let tree = Self {
            document_id: document_id.into(),
            generation,
            root: root.into(),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn root(&self) -> &SummaryNode {
        // validate() guarantees the root is present
        &self.nodes[&self.root]
    }

    pub fn node(&self, node_id: &str) -> Option<&SummaryNode> {
        self.nodes.get(node_id)
    }

    /// Children in stored order. Every reference resolves in a validated tree.
    pub fn children(&self, node: &SummaryNode) -> Vec<&SummaryNode> {
        node.children.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SummaryNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Levels in the tree, leaves included.
    pub fn depth(&self) -> u32 {
        self.root().level + 1
    }

    pub fn leaves(&self) -> impl Iterator<Item = &SummaryNode> {
        self.nodes.values().filter(|n| n.is_leaf())
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidInput(format!("invalid summary tree for '{}': {reason}", self.document_id))
    }

    /// One root; children resolve and sit exactly one level down; every
    /// node reachable from the root; every node owned by the document;
    /// leaves and only leaves reference a chunk.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .nodes
            .get(&self.root)
            .ok_or_else(|| self.invalid(format!("root '{}' is not among the nodes", self.root)))?;
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.document_id != self.document_id {
                return Err(self.invalid(format!("node '{}' belongs to '{}'", node.id, node.document_id)));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(self.invalid(format!("node '{}' is reachable twice", node.id)));
            }
            if node.is_leaf() != node.chunk_id.is_some() || (node.is_leaf() && node.level != 0) {
                return Err(self.invalid(format!("node '{}' mixes leaf and summary fields", node.id)));
            }
            for child_id in &node.children {
                let child = self
                    .nodes
                    .get(child_id)
                    .ok_or_else(|| self.invalid(format!("child '{child_id}' of '{}' is missing", node.id)))?;
                if child.level + 1 != node.level {
                    return Err(self.invalid(format!(
                        "child '{}' is at level {}, parent '{}' at {}",
                        child.id, child.level, node.id, node.level
                    )));
                }
                stack.push(child);
            }
        }
        if seen.len() != self.nodes.len() {
            return Err(self.invalid(format!(
                "{} node(s) are unreachable from the root",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IndexState {
    trees: HashMap<DocumentId, Arc<DocumentTree>>,
    owners: HashMap<NodeId, DocumentId>,
    building: HashSet<DocumentId>,
    next_generation: u64,
}

impl IndexState {
    fn install(&mut self, tree: Arc<DocumentTree>) {
        self.uninstall(&tree.document_id);
        for id in tree.nodes.keys() {
            self.owners.insert(id.clone(), tree.document_id.clone());
        }
        self.next_generation = self.next_generation.max(tree.generation + 1);
        self.trees.insert(tree.document_id.clone(), tree);
    }

    fn uninstall(&mut self, document_id: &str) -> bool {
        match self.trees.remove(document_id) {
            Some(old) => {
                for id in old.nodes.keys() {
                    self.owners.remove(id);
                }
                true
            }
            None => false,
        }
    }
}

/// Summary hierarchies of every summarized document.
#[derive(Debug, Default)]
pub struct SummaryIndex {
    state: RwLock<IndexState>,
}

impl SummaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: every mutation completes under a single guard.
    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a document's whole tree.
    pub fn tree(&self, document_id: &str) -> Result<Arc<DocumentTree>> {
        self.read()
            .trees
            .get(document_id)
            .cloned()
            .ok_or_else(|| Error::IndexUnavailable(document_id.to_string()))
    }

    pub fn get_root(&self, document_id: &str) -> Result<SummaryNode> {
        Ok(self.tree(document_id)?.root().clone())
    }

    pub fn get_node(&self, node_id: &str) -> Result<SummaryNode> {
        let state = self.read();
        state
            .owners
            .get(node_id)
            .and_then(|doc| state.trees.get(doc))
            .and_then(|tree| tree.node(node_id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("summary node '{node_id}'")))
    }

    pub fn get_children(&self, node_id: &str) -> Result<Vec<SummaryNode>> {
        let state = self.read();
        let tree = state
            .owners
            .get(node_id)
            .and_then(|doc| state.trees.get(doc))
            .ok_or_else(|| Error::NotFound(format!("summary node '{node_id}'")))?;
        let node = tree
            .node(node_id)
            .ok_or_else(|| Error::NotFound(format!("summary node '{node_id}'")))?;
        Ok(tree.children(node).into_iter().cloned().collect())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.read().trees.contains_key(document_id)
    }

    /// Documents with a committed hierarchy, sorted.
    pub fn documents(&self) -> Vec<DocumentId> {
        let mut docs: Vec<DocumentId> = self.read().trees.keys().cloned().collect();
        docs.sort();
        docs
    }

    pub fn len(&self) -> usize {
        self.read().trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().trees.is_empty()
    }

    /// Drop a document's hierarchy; true if there was one.
    pub fn remove(&self, document_id: &str) -> bool {
        let removed = self.write().uninstall(document_id);
        if removed {
            debug!(document_id, "dropped summary tree");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.trees.clear();
        state.owners.clear();
    }

    /// Claim the exclusive right to rebuild `document_id`.
    /// `Error::Conflict` while another rebuild of it is in progress.
    pub fn begin_rebuild(&self, document_id: &str) -> Result<RebuildGuard<'_>> {
        let mut state = self.write();
        if !state.building.insert(document_id.to_string()) {
            return Err(Error::Conflict(format!("document '{document_id}' is already being summarized")));
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        Ok(RebuildGuard { index: self, document_id: document_id.to_string(), generation })
    }

    /// Install a tree read from a snapshot, replacing any current one.
    pub(crate) fn restore(&self, tree: DocumentTree) -> Result<()> {
        tree.validate()?;
        self.write().install(Arc::new(tree));
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> (u64, Vec<Arc<DocumentTree>>) {
        let state = self.read();
        let mut trees: Vec<Arc<DocumentTree>> = state.trees.values().cloned().collect();
        trees.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        (state.next_generation, trees)
    }

    pub(crate) fn reserve_generations(&self, next: u64) {
        let mut state = self.write();
        state.next_generation = state.next_generation.max(next);
    }
}

/// Exclusive rebuild of one document. Dropping it without `commit`
/// leaves the previously committed tree, if any, in place.
#[derive(Debug)]
pub struct RebuildGuard<'a> {
    index: &'a SummaryIndex,
    document_id: DocumentId,
    generation: u64,
}

impl RebuildGuard<'_> {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Generation reserved for this build; embed it in node identifiers.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Publish `tree`, replacing the document's previous hierarchy.
    pub fn commit(self, tree: DocumentTree) -> Result<Arc<DocumentTree>> {
        if tree.document_id != self.document_id || tree.generation != self.generation {
            return Err(Error::InvalidInput(format!(
                "tree for '{}' generation {} does not match rebuild of '{}' generation {}",
                tree.document_id, tree.generation, self.document_id, self.generation
            )));
        }
        tree.validate()?;
        let tree = Arc::new(tree);
        self.index.write().install(Arc::clone(&tree));
        info!(document_id = %self.document_id, generation = self.generation, nodes = tree.len(), "committed summary tree");
        Ok(tree)
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.index.write().building.remove(&self.document_id);
    }
}
