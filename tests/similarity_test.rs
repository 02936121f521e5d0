//! Tests for fingerprints and cosine similarity.

use hermod::similarity::cosine_similarity;
use hermod::{Fingerprint, HashingEmbedder, TextEmbedder};

#[test]
fn similarity_is_symmetric_and_bounded() {
    let embedder = HashingEmbedder::default();
    let texts = [
        "My AC is broken",
        "my air conditioner isn't working",
        "What are your opening hours?",
        "",
    ];
    for a in texts {
        for b in texts {
            let fa = embedder.embed(a).unwrap();
            let fb = embedder.embed(b).unwrap();
            let ab = fa.similarity(&fb);
            assert!((0.0..=1.0).contains(&ab), "{a:?} vs {b:?}: {ab}");
            assert!((ab - fb.similarity(&fa)).abs() < 1e-6);
        }
    }
}

#[test]
fn fingerprints_are_reproducible() {
    let a = HashingEmbedder::default().embed("The furnace makes a rattling noise").unwrap();
    let b = HashingEmbedder::default().embed("The furnace makes a rattling noise").unwrap();
    assert_eq!(a.values(), b.values());
}

#[test]
fn lexical_overlap_ranks_above_unrelated() {
    let embedder = HashingEmbedder::default();
    let base = embedder.embed("My AC is broken").unwrap();
    let close = embedder.embed("my AC is broken today").unwrap();
    let far = embedder.embed("What are your opening hours?").unwrap();

    assert!(base.similarity(&close) > 0.85);
    assert!(base.similarity(&close) > base.similarity(&far));
}

#[test]
fn dimensions_are_configurable() {
    let embedder = HashingEmbedder::new(64).unwrap();
    assert_eq!(embedder.dimensions(), 64);
    assert_eq!(embedder.embed("hello").unwrap().dimensions(), 64);
    assert!(HashingEmbedder::new(1).is_err());
}

#[test]
fn mismatched_fingerprints_are_dissimilar() {
    let a = Fingerprint::new(vec![1.0, 0.0]);
    let b = Fingerprint::new(vec![1.0, 0.0, 0.0]);
    assert_eq!(a.similarity(&b), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
}

#[test]
fn opposite_vectors_clamp_to_zero() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
}

#[cfg(feature = "local-inference")]
#[test]
#[ignore = "downloads an embedding model"]
fn neural_embedder_catches_paraphrase() {
    use hermod::{FastEmbedEmbedder, LocalEmbeddingModel};

    let embedder = FastEmbedEmbedder::new(LocalEmbeddingModel::AllMiniLmL6V2).unwrap();
    let a = embedder.embed("My AC is broken").unwrap();
    let b = embedder.embed("My air conditioner isn't working").unwrap();
    let c = embedder.embed("What are your opening hours?").unwrap();
    assert!(a.similarity(&b) > a.similarity(&c));
}
