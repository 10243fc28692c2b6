use std::fs;

use figment::Jail;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use recall_core::config::{expand_path, resolve_with_base, LexicalBackend, RecallConfig, VectorBackend};
use recall_core::ErrorKind;

#[test]
fn load_merges_base_file_env_file_and_env_vars() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "recall.toml",
            r#"
                [cache]
                capacity = 50

                [fusion]
                lexical_weight = 1.0
                vector_weight = 0.0

                [vector]
                dim = 4
                backend = "ivf"
            "#,
        )?;
        jail.create_file("recall.test.toml", "[search]\ndefault_k = 3\n")?;
        jail.set_env("RECALL_ENV", "test");
        jail.set_env("RECALL_CACHE__TTL_SECS", "120");
        jail.set_env("RECALL_CACHE__SCAN_RADIUS", "4");
        jail.set_env("RECALL_LEXICAL__BACKEND", "tantivy");

        let config = RecallConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.ttl_secs, 120);
        assert_eq!(config.search.default_k, 3);
        assert_eq!(config.fusion.lexical_weight, 1.0);
        assert_eq!(config.vector.dim, 4);
        assert_eq!(config.vector.backend, VectorBackend::Ivf);
        assert_eq!(config.lexical.backend, LexicalBackend::Tantivy);
        assert_eq!(config.cache.scan_radius, 4);
        // untouched sections keep their defaults
        assert_eq!(config.lexical.k1, 1.2);
        assert_eq!(config.cache.similarity_threshold, 0.97);
        Ok(())
    });
}

#[test]
fn load_rejects_invalid_values_with_configuration_kind() {
    Jail::expect_with(|jail| {
        jail.create_file("recall.toml", "[cache]\nsimilarity_threshold = 0.0\n")?;
        let err = RecallConfig::load().expect_err("threshold 0 is invalid");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        Ok(())
    });
}

#[test]
fn load_from_explicit_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("custom.toml");
    fs::write(&path, "[lexical]\nk1 = 1.5\nb = 0.5\n").unwrap();

    let config = RecallConfig::load_from(&path).expect("load");
    assert_eq!(config.lexical.k1, 1.5);
    assert_eq!(config.lexical.b, 0.5);

    let missing = RecallConfig::load_from(&tmp.path().join("nope.toml")).expect_err("missing file");
    assert_eq!(missing.kind(), ErrorKind::Configuration);
}

#[test]
fn path_helpers_resolve_relative_paths() {
    let base = std::path::Path::new("/data");
    assert_eq!(resolve_with_base(base, "corpus.jsonl"), base.join("corpus.jsonl"));
    assert_eq!(resolve_with_base(base, "/abs/corpus.jsonl"), std::path::PathBuf::from("/abs/corpus.jsonl"));
    assert_eq!(expand_path("plain/path"), std::path::PathBuf::from("plain/path"));
}
