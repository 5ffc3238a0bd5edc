use std::sync::Arc;
use std::thread;

use curia_core::types::SummaryNode;
use curia_core::Error;
use curia_rag::index::node_id;
use curia_rag::{DocumentTree, SummaryIndex};
use tempfile::TempDir;

fn leaf(doc: &str, generation: u64, n: usize) -> SummaryNode {
    SummaryNode {
        id: node_id(doc, generation, 0, n),
        level: 0,
        text: String::new(),
        embedding: vec![1.0, 0.0],
        children: vec![],
        document_id: doc.to_string(),
        chunk_id: Some(format!("{doc}:{n}")),
    }
}

fn parent(doc: &str, generation: u64, level: u32, n: usize, children: &[&SummaryNode]) -> SummaryNode {
    SummaryNode {
        id: node_id(doc, generation, level, n),
        level,
        text: format!("summary {level}/{n}"),
        embedding: vec![0.0, 1.0],
        children: children.iter().map(|c| c.id.clone()).collect(),
        document_id: doc.to_string(),
        chunk_id: None,
    }
}

/// root -> two leaves
fn small_tree(doc: &str, generation: u64) -> DocumentTree {
    let a = leaf(doc, generation, 0);
    let b = leaf(doc, generation, 1);
    let root = parent(doc, generation, 1, 0, &[&a, &b]);
    DocumentTree::new(doc, generation, root.id.clone(), vec![a, b, root]).unwrap()
}

fn commit_small(index: &SummaryIndex, doc: &str) -> Arc<DocumentTree> {
    let guard = index.begin_rebuild(doc).unwrap();
    let tree = small_tree(doc, guard.generation());
    guard.commit(tree).unwrap()
}

#[test]
fn lookups_fail_before_any_commit() {
    let index = SummaryIndex::new();
    assert!(matches!(index.get_root("d1"), Err(Error::IndexUnavailable(ref d)) if d == "d1"));
    assert!(matches!(index.get_node("d1#g0/l0/0"), Err(Error::NotFound(_))));
    assert!(matches!(index.get_children("d1#g0/l0/0"), Err(Error::NotFound(_))));
    assert!(index.is_empty());
}

#[test]
fn committed_tree_is_navigable() {
    let index = SummaryIndex::new();
    commit_small(&index, "d1");

    let root = index.get_root("d1").unwrap();
    assert_eq!(root.level, 1);
    let children = index.get_children(&root.id).unwrap();
    assert_eq!(children.iter().map(|c| c.chunk_id.clone().unwrap()).collect::<Vec<_>>(), vec!["d1:0", "d1:1"]);
    assert_eq!(index.get_node(&children[1].id).unwrap(), children[1]);
    assert!(index.get_children(&children[0].id).unwrap().is_empty());
    assert_eq!(index.documents(), vec!["d1".to_string()]);
}

#[test]
fn tree_validation_rejects_malformed_trees() {
    let a = leaf("d1", 0, 0);
    let b = leaf("d1", 0, 1);
    let root = parent("d1", 0, 1, 0, &[&a]);

    // b is a second root
    let err = DocumentTree::new("d1", 0, root.id.clone(), vec![a.clone(), b.clone(), root.clone()]).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    // missing child
    assert!(DocumentTree::new("d1", 0, root.id.clone(), vec![root.clone()]).is_err());

    // child two levels down
    let skip = parent("d1", 0, 2, 0, &[&a]);
    assert!(DocumentTree::new("d1", 0, skip.id.clone(), vec![a.clone(), skip]).is_err());

    // node of another document
    let foreign = leaf("d2", 0, 0);
    let mixed = parent("d1", 0, 1, 0, &[&foreign]);
    assert!(DocumentTree::new("d1", 0, mixed.id.clone(), vec![foreign, mixed]).is_err());

    // root not among nodes
    assert!(DocumentTree::new("d1", 0, "nowhere", vec![a]).is_err());
}

#[test]
fn commit_checks_document_and_generation() {
    let index = SummaryIndex::new();
    let guard = index.begin_rebuild("d1").unwrap();
    let wrong = small_tree("d1", guard.generation() + 7);
    assert_eq!(guard.commit(wrong).unwrap_err().code(), "INVALID_INPUT");
    assert!(!index.contains("d1"));

    let guard = index.begin_rebuild("d1").unwrap();
    let other = small_tree("d2", guard.generation());
    assert!(guard.commit(other).is_err());
}

#[test]
fn one_rebuild_per_document_at_a_time() {
    let index = SummaryIndex::new();
    let guard = index.begin_rebuild("d1").unwrap();
    assert!(matches!(index.begin_rebuild("d1"), Err(Error::Conflict(_))));
    let other = index.begin_rebuild("d2").unwrap();
    assert_ne!(guard.generation(), other.generation());
    drop(guard);
    assert!(index.begin_rebuild("d1").is_ok());
}

#[test]
fn remove_drops_tree_and_nodes() {
    let index = SummaryIndex::new();
    let tree = commit_small(&index, "d1");
    let leaf_id = tree.leaves().next().unwrap().id.clone();
    assert!(index.remove("d1"));
    assert!(!index.remove("d1"));
    assert!(matches!(index.get_node(&leaf_id), Err(Error::NotFound(_))));
}

#[test]
fn snapshot_round_trip_continues_generations() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db/summary_index.json");
    let index = SummaryIndex::new();
    let d1 = commit_small(&index, "d1");
    commit_small(&index, "ecj/1979/c-120-78");
    index.save(&path).unwrap();

    let loaded = SummaryIndex::load(&path).unwrap();
    assert_eq!(loaded.documents(), index.documents());
    assert_eq!(*loaded.tree("d1").unwrap(), *d1);
    let root = loaded.get_root("ecj/1979/c-120-78").unwrap();
    assert_eq!(loaded.get_children(&root.id).unwrap().len(), 2);

    let guard = loaded.begin_rebuild("d1").unwrap();
    assert!(guard.generation() > d1.generation(), "new builds never reuse loaded node ids");
}

#[test]
fn loading_a_missing_snapshot_gives_an_empty_index() {
    let tmp = TempDir::new().unwrap();
    assert!(SummaryIndex::load(&tmp.path().join("none.json")).unwrap().is_empty());
}

#[test]
fn corrupt_snapshot_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("summary_index.json");
    let mut value = serde_json::json!({
        "version": 1,
        "next_generation": 1,
        "trees": [small_tree("d1", 0)]
    });
    value["trees"][0]["root"] = serde_json::json!("d1#g0/l0/0");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    assert!(SummaryIndex::load(&path).is_err());
}

#[test]
fn readers_always_see_a_complete_tree_during_rebuilds() {
    let index = Arc::new(SummaryIndex::new());
    commit_small(&index, "d1");

    let reader = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for _ in 0..500 {
                let tree = index.tree("d1").unwrap();
                tree.validate().unwrap();
                assert_eq!(tree.len(), 3);
            }
        })
    };
    for _ in 0..100 {
        commit_small(&index, "d1");
    }
    reader.join().unwrap();
}
