use recall_core::config::{LexicalBackend, LexicalConfig};
use recall_core::traits::LexicalIndex;
use recall_core::types::Chunk;
use recall_text::{Bm25Index, ConfiguredLexicalIndex, TantivyIndex, TantivyParams};
use tempfile::TempDir;

fn policy_corpus() -> Vec<Chunk> {
    vec![
        Chunk::new("procurement:0", "procurement_policy.pdf", "Purchases above the procurement threshold of fifty thousand require three quotes.", vec![]),
        Chunk::new("procurement:1", "procurement_policy.pdf", "Emergency procurement may bypass the tender process with approval.", vec![]),
        Chunk::new("security:0", "it_security.pdf", "Remote staff must use the VPN with multi-factor authentication.", vec![]),
        Chunk::new("security:1", "it_security.pdf", "Passwords rotate every ninety days; authentication logs are retained.", vec![]),
        Chunk::new("hr:0", "handbook.pdf", "Annual leave requests go through the human resources portal.", vec![]),
    ]
}

fn ids(hits: &[recall_core::types::Candidate]) -> Vec<&str> {
    hits.iter().map(|h| h.chunk_id.as_str()).collect()
}

#[test]
fn bm25_full_flow() {
    let index = Bm25Index::build(&LexicalConfig::default(), &policy_corpus()).expect("build");
    assert_eq!(index.len(), 5);

    for q in ["procurement threshold", "vpn authentication", "leave portal"] {
        let hits = index.search(q, 3).expect("search");
        eprintln!("q='{}' -> {:?}", q, ids(&hits));
        assert!(!hits.is_empty());
        assert!(hits.len() <= 3);
        for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }
    }
    assert_eq!(index.search("procurement threshold", 3).unwrap()[0].chunk_id, "procurement:0");
    assert_eq!(index.search("multi-factor vpn", 3).unwrap()[0].chunk_id, "security:0");
}

#[test]
fn tantivy_in_ram_full_flow() {
    let index = TantivyIndex::build(&TantivyParams::default(), &policy_corpus()).expect("build");
    assert_eq!(index.len(), 5);

    let hits = index.search("procurement threshold", 3).expect("search");
    assert_eq!(hits[0].chunk_id, "procurement:0");
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }

    assert!(index.search("", 3).unwrap().is_empty());
    assert!(index.search("x y z", 3).unwrap().is_empty());
    assert!(index.search("zebra", 3).unwrap().is_empty());
    assert!(index.search("procurement", 0).unwrap().is_empty());
}

#[test]
fn tantivy_on_disk_rebuild_replaces_previous_generation() {
    let tmp = TempDir::new().unwrap();
    let params = TantivyParams { dir: Some(tmp.path().join("tantivy")), ..TantivyParams::default() };

    let first = TantivyIndex::build(&params, &policy_corpus()).expect("first build");
    assert_eq!(first.search("vpn", 5).unwrap().len(), 1);
    drop(first);

    let smaller = vec![Chunk::new("only", "x.pdf", "vpn vpn vpn", vec![])];
    let second = TantivyIndex::build(&params, &smaller).expect("rebuild");
    assert_eq!(second.len(), 1);
    assert_eq!(ids(&second.search("vpn", 5).unwrap()), vec!["only"]);
}

#[test]
fn backends_agree_on_top_hit() {
    let corpus = policy_corpus();
    let bm25 = Bm25Index::build(&LexicalConfig::default(), &corpus).unwrap();
    let tantivy = TantivyIndex::build(&TantivyParams::default(), &corpus).unwrap();
    for q in ["procurement threshold", "vpn", "human resources leave"] {
        assert_eq!(bm25.search(q, 1).unwrap()[0].chunk_id, tantivy.search(q, 1).unwrap()[0].chunk_id, "query {q}");
    }
}

#[test]
fn configured_backend_follows_lexical_config() {
    let corpus = policy_corpus();
    let tantivy_config = LexicalConfig { backend: LexicalBackend::Tantivy, ..LexicalConfig::default() };

    let bm25 = ConfiguredLexicalIndex::build(&LexicalConfig::default(), &corpus).unwrap();
    let tantivy = ConfiguredLexicalIndex::build(&tantivy_config, &corpus).unwrap();
    assert!(matches!(bm25, ConfiguredLexicalIndex::Bm25(_)));
    assert!(matches!(tantivy, ConfiguredLexicalIndex::Tantivy(_)));
    assert_eq!(tantivy.len(), 5);
    assert_eq!(tantivy.search("procurement threshold", 3).unwrap()[0].chunk_id, "procurement:0");
    assert_eq!(bm25.search("procurement threshold", 3).unwrap()[0].chunk_id, "procurement:0");
}
