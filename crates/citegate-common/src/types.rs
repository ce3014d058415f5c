//! Data model for source fetching and citation auditing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on stored page text. Content beyond this is truncated at a
/// char boundary before caching.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Outcome classification for a fetched source.
///
/// `Dead` is a definitive HTTP failure (4xx/5xx after retries); `Error`
/// means the source could not be evaluated at all (network failure,
/// blocked domain, non-HTML content, unresolvable request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Paywall,
    Dead,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok      => "ok",
            FetchStatus::Paywall => "paywall",
            FetchStatus::Dead    => "dead",
            FetchStatus::Error   => "error",
        }
    }
}

/// How much of the page text the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Full cleaned text, no excerpts.
    #[default]
    Full,
    /// Full text plus query-relevant excerpts.
    Relevant,
}

/// Catalog metadata attached when the URL matches a known resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub id: String,
    pub title: String,
    pub resource_type: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Canonical fetch result for one URL. Constructed once per resolution
/// path and immutable thereafter.
///
/// `relevant_excerpts` is populated only when the request asked for
/// [`ExtractMode::Relevant`] with a query; it is never read from or
/// written to any cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedSource {
    pub url: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub relevant_excerpts: Vec<String>,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceMeta>,
}

impl FetchedSource {
    /// Minimal result for a URL that could not be evaluated.
    pub fn error(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            fetched_at: Utc::now(),
            content: String::new(),
            relevant_excerpts: Vec::new(),
            status: FetchStatus::Error,
            resource: None,
        }
    }
}

/// One cache-tier record for a fetched page, keyed by URL.
///
/// The embedded tier stores these with no expiry; the remote tier adds a
/// server-assigned `id` and treats old entries as stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    pub full_text: String,
    pub page_title: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub content_length: usize,
}

impl SourcePageRecord {
    pub fn new(
        url: impl Into<String>,
        full_text: impl Into<String>,
        page_title: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        let full_text = full_text.into();
        let content_length = full_text.len();
        Self {
            id: None,
            url: url.into(),
            full_text,
            page_title: page_title.into(),
            fetched_at: Utc::now(),
            http_status,
            content_length,
        }
    }
}

/// Truncate text at `MAX_CONTENT_CHARS`, respecting char boundaries.
pub fn cap_content(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_CONTENT_CHARS).collect()
    }
}
