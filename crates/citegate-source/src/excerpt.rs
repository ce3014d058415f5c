//! Query-relevant excerpt extraction.
//!
//! Pure keyword-overlap scoring: no stemming, no embeddings. Paragraphs
//! are ranked by the fraction of query tokens they contain, ties keep
//! their original document order.

use std::collections::HashSet;

pub const DEFAULT_MAX_EXCERPTS: usize = 5;

/// Minimum paragraph length considered worth returning.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Minimum token length after splitting the query.
const MIN_TOKEN_CHARS: usize = 3;

/// Query tokens with no discriminative value.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "this", "that", "with",
    "from", "have", "has", "had", "not", "but", "what", "when", "where",
    "which", "their", "them", "they", "been", "being", "into", "about",
    "how", "why", "who", "does", "can", "will", "would", "should",
];

/// Score paragraphs of `content` against `query` and return the top
/// `max_excerpts`, best first. Returns an empty vec when the query has no
/// usable tokens.
pub fn extract_relevant_excerpts(content: &str, query: &str, max_excerpts: usize) -> Vec<String> {
    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let total = tokens.len() as f64;

    // (original index kept implicitly by stable sort)
    let mut scored: Vec<(f64, &str)> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| p.len() >= MIN_PARAGRAPH_CHARS)
        .filter_map(|p| {
            let lower = p.to_lowercase();
            let hits = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
            if hits == 0 {
                None
            } else {
                Some((hits as f64 / total, p))
            }
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(max_excerpts)
        .map(|(_, p)| p.to_string())
        .collect()
}

/// Tokenize a query: split on non-word characters, lowercase, drop short
/// tokens and stopwords, dedupe.
fn query_tokens(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= MIN_TOKEN_CHARS)
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}
