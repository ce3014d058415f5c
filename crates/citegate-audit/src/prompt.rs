//! Verification prompt construction and response parsing.
//!
//! One LLM call covers every claim sharing a source. The model answers
//! with a JSON object for a single claim or a JSON array (one entry per
//! claim, in order) for a batch; anything unparseable degrades to
//! `Unchecked`.

use citegate_common::types::FetchedSource;
use citegate_llm::extract_json_payload;

use crate::verdict::Verdict;

/// Cap on source text sent per verification call.
const SOURCE_TEXT_BUDGET: usize = 12_000;

pub const VERIFY_SYSTEM_PROMPT: &str = "\
You are a citation auditor. You are given the text of a source and one or \
more claims that cite it. For each claim decide:
- \"verified\": the source directly supports the claim
- \"unsupported\": the source does not contain support for the claim
- \"misattributed\": the source contradicts the claim

Respond with JSON only. For a single claim, return one object:
{\"verdict\": \"...\", \"relevantQuote\": \"...\", \"explanation\": \"...\"}
For multiple claims, return an array with one such object per claim, in \
the same order the claims were given. relevantQuote is a short verbatim \
quote from the source when one supports your verdict, otherwise null.";

/// Build the user prompt for a batch of claims sharing one source.
/// Prefers the request's relevant excerpts over full content to keep the
/// prompt small.
pub fn build_verification_prompt(source: &FetchedSource, claims: &[String]) -> String {
    let text: String = if source.relevant_excerpts.is_empty() {
        source.content.chars().take(SOURCE_TEXT_BUDGET).collect()
    } else {
        let joined = source.relevant_excerpts.join("\n\n");
        joined.chars().take(SOURCE_TEXT_BUDGET).collect()
    };

    let mut prompt = format!("SOURCE URL: {}\n", source.url);
    if !source.title.is_empty() {
        prompt.push_str(&format!("SOURCE TITLE: {}\n", source.title));
    }
    prompt.push_str(&format!("\nSOURCE TEXT:\n{text}\n\n"));

    if claims.len() == 1 {
        prompt.push_str(&format!("CLAIM:\n{}\n", claims[0]));
    } else {
        prompt.push_str("CLAIMS:\n");
        for (i, claim) in claims.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, claim));
        }
    }
    prompt
}

/// A single parsed verification entry.
#[derive(Debug, Clone)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    pub relevant_quote: Option<String>,
    pub explanation: Option<String>,
}

impl ParsedVerdict {
    pub(crate) fn unchecked(explanation: &str) -> Self {
        Self {
            verdict: Verdict::Unchecked,
            relevant_quote: None,
            explanation: Some(explanation.to_string()),
        }
    }
}

/// Parse a raw LLM response into exactly `expected` verdicts. Parse
/// failures, shape mismatches, and unknown verdict strings all degrade
/// to `Unchecked`, never to a negative finding.
pub fn parse_verification_response(raw: &str, expected: usize) -> Vec<ParsedVerdict> {
    let payload = extract_json_payload(raw);
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => {
            return vec![ParsedVerdict::unchecked("unparseable verification response"); expected]
        }
    };

    let entries: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Array(items) => items.iter().collect(),
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => Vec::new(),
    };

    (0..expected)
        .map(|i| match entries.get(i) {
            Some(entry) => parse_entry(entry),
            None => ParsedVerdict::unchecked("missing entry in verification response"),
        })
        .collect()
}

fn parse_entry(entry: &serde_json::Value) -> ParsedVerdict {
    let verdict = match entry["verdict"].as_str() {
        Some(raw) => Verdict::parse(raw),
        None => Verdict::Unchecked,
    };
    ParsedVerdict {
        verdict,
        relevant_quote: field(entry, "relevantQuote", "relevant_quote"),
        explanation: field(entry, "explanation", "explanation"),
    }
}

fn field(entry: &serde_json::Value, camel: &str, snake: &str) -> Option<String> {
    entry[camel]
        .as_str()
        .or_else(|| entry[snake].as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
