use pretty_assertions::assert_eq;
use recall_core::config::{VectorBackend, VectorConfig};
use recall_core::traits::VectorIndex;
use recall_core::types::{Candidate, Chunk};
use recall_embed::HashEmbedder;
use recall_vector::{BruteForceIndex, ConfiguredVectorIndex, IvfIndex};

const DIM: usize = 32;

fn corpus(embedder: &HashEmbedder) -> Vec<Chunk> {
    let topics = ["procurement", "security", "leave", "travel", "finance", "privacy"];
    let mut chunks = Vec::new();
    for (t, topic) in topics.iter().enumerate() {
        for i in 0..8 {
            let text = format!("{topic} policy section {i} clause {} rule {}", i * 7 + t, i * 3);
            let embedding = embedder.embed_text(&text);
            chunks.push(Chunk::new(format!("{topic}:{i}"), format!("{topic}.pdf"), text, embedding));
        }
    }
    chunks
}

fn ids(hits: &[Candidate]) -> Vec<String> {
    hits.iter().map(|h| h.chunk_id.clone()).collect()
}

#[test]
fn ivf_with_full_probing_matches_brute_force() {
    let embedder = HashEmbedder::new(DIM).unwrap();
    let chunks = corpus(&embedder);
    let exact = BruteForceIndex::build(&VectorConfig { dim: DIM, ..VectorConfig::default() }, &chunks).unwrap();
    let ivf = IvfIndex::build(&VectorConfig { dim: DIM, nlist: 6, nprobe: 6, ..VectorConfig::default() }, &chunks).unwrap();
    assert_eq!(ivf.nlist(), 6);

    for q in ["procurement threshold", "security vpn", "privacy rule 9", "travel clause"] {
        let query = embedder.embed_text(q);
        assert_eq!(exact.search(&query, 10).unwrap(), ivf.search(&query, 10).unwrap(), "query {q}");
    }
}

#[test]
fn ivf_single_probe_finds_stored_vector_itself() {
    let embedder = HashEmbedder::new(DIM).unwrap();
    let chunks = corpus(&embedder);
    let ivf = IvfIndex::build(&VectorConfig { dim: DIM, nlist: 0, nprobe: 1, ..VectorConfig::default() }, &chunks).unwrap();
    for chunk in &chunks {
        let hits = ivf.search(&chunk.embedding, 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5, "{} scored {}", chunk.id, hits[0].score);
    }
}

#[test]
fn ivf_partial_probe_results_are_exact_scores_subset() {
    let embedder = HashEmbedder::new(DIM).unwrap();
    let chunks = corpus(&embedder);
    let exact = BruteForceIndex::build(&VectorConfig { dim: DIM, ..VectorConfig::default() }, &chunks).unwrap();
    let ivf = IvfIndex::build(&VectorConfig { dim: DIM, nlist: 6, nprobe: 2, ..VectorConfig::default() }, &chunks).unwrap();
    let query = embedder.embed_text("finance policy");
    let all = exact.search(&query, chunks.len()).unwrap();
    for hit in ivf.search(&query, 10).unwrap() {
        let reference = all.iter().find(|c| c.chunk_id == hit.chunk_id).expect("hit exists in corpus");
        assert_eq!(reference.score, hit.score);
    }
}

#[test]
fn configured_backend_dispatches_on_config() {
    let embedder = HashEmbedder::new(DIM).unwrap();
    let chunks = corpus(&embedder);
    let query = embedder.embed_text("leave policy");

    let brute = ConfiguredVectorIndex::build(&VectorConfig { dim: DIM, ..VectorConfig::default() }, &chunks).unwrap();
    assert!(matches!(brute, ConfiguredVectorIndex::BruteForce(_)));
    let ivf = ConfiguredVectorIndex::build(
        &VectorConfig { dim: DIM, backend: VectorBackend::Ivf, nlist: 4, nprobe: 4 },
        &chunks,
    )
    .unwrap();
    assert!(matches!(ivf, ConfiguredVectorIndex::Ivf(_)));

    assert_eq!(brute.len(), chunks.len());
    assert_eq!(ivf.dim(), DIM);
    assert_eq!(ids(&brute.search(&query, 5).unwrap()), ids(&ivf.search(&query, 5).unwrap()));
}
