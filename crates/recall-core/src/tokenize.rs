//! Query/chunk tokenization and query normalization.

use std::collections::HashMap;

/// Tokens shorter than this (in characters) are dropped.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Lowercase, split on non-alphanumeric boundaries, drop 1-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Canonical form of a query used for exact cache matching:
/// lowercased, trimmed, interior whitespace collapsed to single spaces.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Expands common policy-document abbreviations in a query, word by word.
#[derive(Debug, Clone)]
pub struct QueryPreprocessor {
    abbreviations: HashMap<String, String>,
}

impl Default for QueryPreprocessor {
    fn default() -> Self {
        let pairs = [
            ("proc", "procurement"),
            ("std", "standard"),
            ("req", "requirement"),
            ("pol", "policy"),
            ("mgmt", "management"),
            ("info", "information"),
            ("sec", "security"),
            ("hr", "human resources"),
        ];
        Self { abbreviations: pairs.iter().map(|(a, b)| ((*a).to_string(), (*b).to_string())).collect() }
    }
}

impl QueryPreprocessor {
    pub fn with_abbreviations<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { abbreviations: pairs.into_iter().map(|(k, v)| (k.into().to_lowercase(), v.into())).collect() }
    }

    pub fn expand(&self, query: &str) -> String {
        query
            .split_whitespace()
            .map(|word| match self.abbreviations.get(&word.to_lowercase()) {
                Some(full) => full.as_str(),
                None => word,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
