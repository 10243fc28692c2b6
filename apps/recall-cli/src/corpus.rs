//! JSONL corpus loading: one chunk object per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use recall_core::types::Chunk;
use recall_embed::HashEmbedder;

/// Reads `path`, filling in missing embeddings with `embedder` and missing
/// token counts from the text.
pub fn load(path: &Path, embedder: &HashEmbedder, show_progress: bool) -> Result<Vec<Chunk>> {
    let file = File::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    let bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let pb = if show_progress { ProgressBar::new(bytes) } else { ProgressBar::hidden() };
    pb.set_style(ProgressStyle::with_template("{spinner} [{bar:40}] {bytes}/{total_bytes} {msg}")?.progress_chars("=> "));
    pb.set_message("loading corpus");

    let mut chunks = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}:{}", path.display(), lineno + 1))?;
        pb.inc(line.len() as u64 + 1);
        if line.trim().is_empty() {
            continue;
        }
        let mut chunk: Chunk =
            serde_json::from_str(&line).with_context(|| format!("parsing {}:{}", path.display(), lineno + 1))?;
        if chunk.embedding.is_empty() {
            chunk.embedding = embedder.embed_text(&chunk.text);
        }
        if chunk.token_count == 0 {
            chunk.token_count = chunk.text.split_whitespace().count();
        }
        chunks.push(chunk);
    }
    pb.finish_with_message(format!("{} chunks", chunks.len()));
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fills_missing_embeddings_and_token_counts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","source":"doc.pdf","text":"vpn access needs mfa"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"b","source":"doc.pdf","text":"x","token_count":7,"embedding":[1.0,0.0,0.0,0.0]}}"#).unwrap();

        let embedder = HashEmbedder::new(4).unwrap();
        let chunks = load(file.path(), &embedder, false).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].embedding.len(), 4);
        assert_eq!(chunks[0].token_count, 4);
        assert_eq!(chunks[1].embedding, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(chunks[1].token_count, 7);
    }

    #[test]
    fn reports_the_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","source":"doc.pdf","text":"ok"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let err = load(file.path(), &HashEmbedder::new(4).unwrap(), false).unwrap_err();
        assert!(format!("{err:#}").contains(":2"), "{err:#}");
    }
}
