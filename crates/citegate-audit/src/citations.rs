//! Footnote citation extraction.
//!
//! Documents use markdown footnotes: in-text markers `[^3]` and
//! definition lines `[^3]: Author, Title. https://example.org/paper`.
//! A citation pairs a marker with the URL from its definition plus the
//! text surrounding the marker.

use std::sync::LazyLock;

use regex::Regex;

static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[\^([A-Za-z0-9_-]+)\]:\s*(.+)$").unwrap());

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>"']+"#).unwrap());

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^[A-Za-z0-9_-]+\]").unwrap());

/// Characters of context kept around an in-text marker.
const CLAIM_CONTEXT_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct Citation {
    pub footnote: String,
    pub url: String,
    pub claim_context: String,
}

/// Drop a leading `---` fenced frontmatter block, if present.
pub fn strip_frontmatter(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("---") else { return body };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => body,
    }
}

/// Extract all citations: footnote definitions with a URL, paired with
/// the context around their in-text marker. Ordered by numeric footnote
/// reference.
pub fn extract_citations(body: &str) -> Vec<Citation> {
    let body = strip_frontmatter(body);

    let mut citations: Vec<Citation> = DEF_RE
        .captures_iter(body)
        .filter_map(|cap| {
            let footnote = cap[1].to_string();
            let url = URL_RE.find(&cap[2])?.as_str().trim_end_matches('.').to_string();
            let claim_context = marker_context(body, &footnote).unwrap_or_default();
            Some(Citation { footnote, url, claim_context })
        })
        .collect();

    citations.sort_by_key(|c| numeric_ref(&c.footnote));
    citations
}

/// The sentence immediately preceding the in-text marker, or None when
/// the marker is absent or starts its paragraph.
pub fn extract_claim_sentence(body: &str, footnote: &str) -> Option<String> {
    let body = strip_frontmatter(body);
    let pos = marker_position(body, footnote)?;
    let before = &body[..pos];

    // Walk back to the previous sentence terminator or paragraph break.
    let start = before
        .rmatch_indices(['.', '!', '?'])
        .map(|(i, _)| i + 1)
        .find(|&i| i < before.len())
        .or_else(|| before.rfind("\n\n").map(|i| i + 2))
        .unwrap_or(0);

    // Other citations' markers are noise inside a claim sentence.
    let sentence = MARKER_RE.replace_all(&before[start..], "");
    let sentence = sentence.trim();
    if sentence.is_empty() {
        None
    } else {
        Some(sentence.to_string())
    }
}

/// Sort key: numeric footnotes in order, non-numeric ones after.
pub fn numeric_ref(footnote: &str) -> u32 {
    footnote.parse().unwrap_or(u32::MAX)
}

/// Byte offset of the in-text marker `[^N]` (skipping definition lines).
fn marker_position(body: &str, footnote: &str) -> Option<usize> {
    let marker = format!("[^{footnote}]");
    let mut from = 0;
    while let Some(rel) = body[from..].find(&marker) {
        let pos = from + rel;
        let after = pos + marker.len();
        if body[after..].starts_with(':') {
            // Definition line, not a reference.
            from = after;
            continue;
        }
        return Some(pos);
    }
    None
}

fn marker_context(body: &str, footnote: &str) -> Option<String> {
    let pos = marker_position(body, footnote)?;
    let para_start = body[..pos].rfind("\n\n").map(|i| i + 2).unwrap_or(0);
    let start = para_start.max(pos.saturating_sub(CLAIM_CONTEXT_CHARS));
    // Back off to a char boundary.
    let start = (start..=pos).find(|&i| body.is_char_boundary(i))?;
    Some(body[start..pos].trim().to_string())
}
