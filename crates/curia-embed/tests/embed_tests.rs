use curia_core::config::ModelSettings;
use curia_core::similarity::cosine;
use curia_core::traits::Embedder;
use curia_embed::{resolve_model_dir, HashEmbedder};

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(384);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn hash_embedder_ranks_shared_words_higher() {
    let embedder = HashEmbedder::new(256);
    let query = embedder.embed("Free movement of goods").unwrap();
    let close = embedder.embed("the free movement of goods within the union").unwrap();
    let far = embedder.embed("taxation of tobacco products").unwrap();
    assert!(cosine(&query, &close).unwrap() > cosine(&query, &far).unwrap());
}

#[test]
fn hash_embedder_is_case_and_punctuation_insensitive() {
    let embedder = HashEmbedder::new(64);
    let a = embedder.embed("Cassis, de Dijon!").unwrap();
    let b = embedder.embed("cassis de dijon").unwrap();
    assert!((cosine(&a, &b).unwrap() - 1.0).abs() < 1e-5);
}

#[test]
fn hash_embedder_empty_text_is_zero_vector() {
    let v = HashEmbedder::new(8).embed("  ...  ").unwrap();
    assert!(v.iter().all(|x| *x == 0.0));
}

#[test]
fn model_dir_falls_back_to_models_folder() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("models/bge-m3")).unwrap();
    let dir = resolve_model_dir(&ModelSettings::default(), tmp.path()).unwrap();
    assert!(dir.ends_with("models/bge-m3"));

    let empty = tempfile::TempDir::new().unwrap();
    let err = resolve_model_dir(&ModelSettings::default(), empty.path()).unwrap_err();
    assert_eq!(err.code(), "INVALID_CONFIG");
}
