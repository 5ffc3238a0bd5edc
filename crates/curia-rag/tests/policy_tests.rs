mod common;

use std::sync::Arc;

use common::{document, FixedEmbedder, KeywordEmbedder, ScriptedModel};
use curia_core::config::{HierarchySettings, RetrievalSettings};
use curia_core::store::InMemoryDocumentStore;
use curia_core::traits::DocumentStore;
use curia_core::types::{Chunk, SummaryNode};
use curia_core::Error;
use curia_rag::index::node_id;
use curia_rag::{AnswerSynthesizer, CancelToken, DocumentTree, EvidenceSet, RetrievalPolicy, Summarizer, SummaryIndex};

const QUERY: [f32; 3] = [1.0, 0.0, 0.0];

fn node(level: u32, n: usize, embedding: [f32; 3], children: &[&SummaryNode]) -> SummaryNode {
    SummaryNode {
        id: node_id("d", 0, level, n),
        level,
        text: if level == 0 { String::new() } else { format!("summary {level}/{n}") },
        embedding: embedding.to_vec(),
        children: children.iter().map(|c| c.id.clone()).collect(),
        document_id: "d".to_string(),
        chunk_id: (level == 0).then(|| format!("d:{n}")),
    }
}

/// Root over two sections of two leaves each. `sections` and `leaves`
/// give the embeddings in order.
fn fixture(root: [f32; 3], sections: [[f32; 3]; 2], leaves: [[f32; 3]; 4]) -> (Arc<SummaryIndex>, Arc<InMemoryDocumentStore>) {
    let l: Vec<SummaryNode> = leaves.iter().enumerate().map(|(i, e)| node(0, i, *e, &[])).collect();
    let s0 = node(1, 0, sections[0], &[&l[0], &l[1]]);
    let s1 = node(1, 1, sections[1], &[&l[2], &l[3]]);
    let r = node(2, 0, root, &[&s0, &s1]);
    let root_id = r.id.clone();
    let mut nodes = l;
    nodes.extend([s0, s1, r]);

    let index = Arc::new(SummaryIndex::new());
    let guard = index.begin_rebuild("d").unwrap();
    assert_eq!(guard.generation(), 0);
    guard.commit(DocumentTree::new("d", 0, root_id, nodes).unwrap()).unwrap();

    let store = Arc::new(InMemoryDocumentStore::new());
    let chunks: Vec<Chunk> = (0..4).map(|i| Chunk::new("d", i, format!("chunk text {i}"))).collect();
    store.store_chunks("d", &chunks).unwrap();
    (index, store)
}

fn policy(index: Arc<SummaryIndex>, store: Arc<InMemoryDocumentStore>, settings: RetrievalSettings) -> RetrievalPolicy {
    RetrievalPolicy::new(index, store, Arc::new(FixedEmbedder(QUERY.to_vec())), settings).unwrap()
}

fn ids(evidence: &EvidenceSet) -> Vec<String> {
    evidence.items().iter().map(|i| i.node_id.clone()).collect()
}

#[test]
fn descends_into_both_sections_instead_of_stopping_at_the_root() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.6, 0.0, 0.8]],
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.0, 0.436], [0.0, 0.0, 1.0]],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve("free movement", "d").unwrap();

    assert_eq!(ids(&evidence), vec!["d#g0/l0/0", "d#g0/l0/2"]);
    assert_eq!(evidence.items()[0].text, "chunk text 0", "leaf text comes from the store");
    assert_eq!(evidence.items()[1].text, "chunk text 2");
    assert!(evidence.items()[0].score > evidence.items()[1].score);
    let stats = evidence.stats();
    assert_eq!(stats.pruned, 2);
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(stats.nodes_scored, 7);
    assert_eq!(evidence.query(), "free movement");
    assert_eq!(evidence.document_id(), "d");
}

#[test]
fn a_section_above_the_stop_threshold_is_evidence_itself() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.9, 0.436, 0.0], [0.0, 1.0, 0.0]],
        [[1.0, 0.0, 0.0]; 4],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve_embedded("q", &QUERY, "d").unwrap();

    assert_eq!(ids(&evidence), vec!["d#g0/l1/0"]);
    assert_eq!(evidence.items()[0].text, "summary 1/0");
    assert_eq!(evidence.items()[0].level, 1);
}

#[test]
fn root_is_the_fallback_when_every_section_is_pruned() {
    let (index, store) = fixture(
        [0.3, 0.954, 0.0],
        [[0.1, 0.995, 0.0], [0.0, 0.0, 1.0]],
        [[1.0, 0.0, 0.0]; 4],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve_embedded("q", &QUERY, "d").unwrap();

    assert_eq!(ids(&evidence), vec!["d#g0/l2/0"]);
    assert_eq!(evidence.stats().fallbacks, 1);
    assert_eq!(evidence.stats().pruned, 2);
}

#[test]
fn section_is_the_fallback_when_its_leaves_are_pruned() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.0, 1.0, 0.0]],
        [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve_embedded("q", &QUERY, "d").unwrap();
    assert_eq!(ids(&evidence), vec!["d#g0/l1/0"]);
    assert_eq!(evidence.stats().fallbacks, 1);
}

#[test]
fn ties_put_finer_levels_first() {
    // section 0 stops at 0.9; leaf 2 under section 1 also scores 0.9
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.9, 0.436, 0.0], [0.6, 0.0, 0.8]],
        [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.9, 0.0, 0.436], [0.0, 0.0, 1.0]],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve_embedded("q", &QUERY, "d").unwrap();
    assert_eq!(ids(&evidence), vec!["d#g0/l0/2", "d#g0/l1/0"]);
    assert_eq!(evidence.items()[0].score, evidence.items()[1].score);
}

#[test]
fn resolution_is_deterministic() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.6, 0.0, 0.8]],
        [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.7, 0.7, 0.0]],
    );
    let p = policy(index, store, RetrievalSettings::default());
    let first = p.resolve("q", "d").unwrap();
    for _ in 0..20 {
        assert_eq!(p.resolve("q", "d").unwrap(), first);
    }
    assert_eq!(ids(&first), vec!["d#g0/l0/0", "d#g0/l0/1", "d#g0/l0/2", "d#g0/l0/3"]);
}

#[test]
fn max_evidence_truncates_after_ordering() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.6, 0.0, 0.8]],
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.0, 0.436], [0.0, 0.0, 1.0]],
    );
    let settings = RetrievalSettings { max_evidence: Some(1), ..RetrievalSettings::default() };
    let evidence = policy(index, store, settings).resolve_embedded("q", &QUERY, "d").unwrap();
    assert_eq!(ids(&evidence), vec!["d#g0/l0/0"]);
}

#[test]
fn single_chunk_document_yields_its_chunk_whatever_the_thresholds() {
    let index = Arc::new(SummaryIndex::new());
    let guard = index.begin_rebuild("d").unwrap();
    let only = node(0, 0, [0.0, 1.0, 0.0], &[]);
    guard.commit(DocumentTree::new("d", 0, only.id.clone(), vec![only]).unwrap()).unwrap();
    let store = Arc::new(InMemoryDocumentStore::new());
    store.store_chunks("d", &[Chunk::new("d", 0, "the only chunk")]).unwrap();

    let settings = RetrievalSettings { stop_threshold: 1.0, descend_threshold: 1.0, ..RetrievalSettings::default() };
    let evidence = policy(index, store, settings).resolve("q", "d").unwrap();
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence.items()[0].node_id, "d#g0/l0/0");
    assert_eq!(evidence.items()[0].text, "the only chunk");
}

#[test]
fn unsummarized_document_is_index_unavailable() {
    let p = policy(Arc::new(SummaryIndex::new()), Arc::new(InMemoryDocumentStore::new()), RetrievalSettings::default());
    assert!(matches!(p.resolve("q", "missing"), Err(Error::IndexUnavailable(_))));
}

#[test]
fn leaf_whose_chunk_vanished_is_not_found() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.0, 1.0, 0.0]],
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
    );
    store.delete_document("d").unwrap();
    let err = policy(index, store, RetrievalSettings::default()).resolve("q", "d").unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn synthesizer_numbers_evidence_and_rejects_empty_input() {
    let (index, store) = fixture(
        [0.5, 0.866, 0.0],
        [[0.6, 0.8, 0.0], [0.6, 0.0, 0.8]],
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.0, 0.436], [0.0, 0.0, 1.0]],
    );
    let evidence = policy(index, store, RetrievalSettings::default()).resolve("q", "d").unwrap();

    let model = Arc::new(ScriptedModel::new(|_, _, _| Ok("  The answer [1].  ".to_string())));
    let synthesizer = AnswerSynthesizer::new(model.clone());
    assert_eq!(synthesizer.synthesize("q", &evidence).unwrap(), "The answer [1].");
    let context = &model.contexts()[0];
    assert!(context.starts_with("[1] (d, level 0) chunk text 0"));
    assert!(context.contains("[2] (d, level 0) chunk text 2"));

    let empty = EvidenceSet::new("q", "d");
    assert_eq!(synthesizer.synthesize("q", &empty).unwrap_err().code(), "INVALID_INPUT");
}

#[test]
fn synthesizer_reports_model_failure_and_empty_answers() {
    let (index, store) = fixture([1.0, 0.0, 0.0], [[1.0, 0.0, 0.0]; 2], [[1.0, 0.0, 0.0]; 4]);
    let evidence = policy(index, store, RetrievalSettings::default()).resolve("q", "d").unwrap();
    assert_eq!(ids(&evidence), vec!["d#g0/l2/0"], "root above the stop threshold");

    let failing = AnswerSynthesizer::new(Arc::new(ScriptedModel::failing_on(0)));
    assert_eq!(failing.synthesize("q", &evidence).unwrap_err().code(), "SYNTHESIS_UNAVAILABLE");

    let silent = AnswerSynthesizer::new(Arc::new(ScriptedModel::new(|_, _, _| Ok("```\n```".to_string()))));
    assert_eq!(silent.synthesize("q", &evidence).unwrap_err().code(), "SYNTHESIS_UNAVAILABLE");
}

/// `goods` chunks followed by as many `tax` chunks, summarized with the
/// echo model into sections of five under one root.
fn summarized(per_topic: usize) -> RetrievalPolicy {
    let texts: Vec<String> = ["goods", "tax"]
        .iter()
        .flat_map(|topic| (0..per_topic).map(move |i| format!("{topic} clause {i}")))
        .collect();
    let doc = document("d", &texts.iter().map(String::as_str).collect::<Vec<_>>());
    let index = Arc::new(SummaryIndex::new());
    let store = Arc::new(InMemoryDocumentStore::new());
    store.store_document(&doc).unwrap();
    Summarizer::new(Arc::new(ScriptedModel::echo()), Arc::new(KeywordEmbedder), index.clone(), HierarchySettings::default())
        .unwrap()
        .build_hierarchy(&doc, &CancelToken::new())
        .unwrap();
    RetrievalPolicy::new(index, store, Arc::new(KeywordEmbedder), RetrievalSettings::default()).unwrap()
}

#[test]
fn built_hierarchy_of_ten_chunks_yields_evidence_from_both_sections() {
    let policy = summarized(5);
    // root scores ~0.71, each section and leaf 0.5
    let evidence = policy.resolve("goods tax workers competition", "d").unwrap();

    assert_eq!(evidence.len(), 10);
    assert!(evidence.items().iter().all(|i| i.level == 0), "never just the root");
    let texts: Vec<&str> = evidence.items().iter().map(|i| i.text.as_str()).collect();
    assert!(texts.contains(&"goods clause 0") && texts.contains(&"tax clause 4"));
    let stats = evidence.stats();
    assert_eq!((stats.nodes_scored, stats.pruned, stats.fallbacks), (13, 0, 0));
}

#[test]
fn default_settings_keep_every_done_leaf() {
    let policy = summarized(10);
    assert_eq!(policy.settings().max_evidence, None);
    let evidence = policy.resolve("goods tax workers competition", "d").unwrap();
    assert_eq!(evidence.len(), 20);
}
