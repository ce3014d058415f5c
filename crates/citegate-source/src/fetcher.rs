//! Source fetcher: tiered cache resolution with in-flight deduplication.
//!
//! Resolution order for a URL, each step a potential early return:
//!   1. session cache (in-process LRU)
//!   2. domain blocklist (immediate error result, still cached)
//!   3. remote store (within its staleness window; backfills embedded)
//!   4. embedded store
//!   5. network — markdown extraction service first when configured,
//!      then the built-in HTML→text fallback with retry/backoff
//!
//! Successful fetches are persisted to the embedded store synchronously
//! and to the remote store as a detached task; neither write can fail the
//! fetch. Concurrent requests for the same URL share one resolution
//! future, so N callers cost exactly one network fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use citegate_common::config::FetcherConfig;
use citegate_common::error::{CitegateError, Result};
use citegate_common::traits::{EmbeddedStore, FetchStatusUpdate, RemoteStore, ResourceCatalog};
use citegate_common::types::{
    cap_content, ExtractMode, FetchStatus, FetchedSource, ResourceMeta, SourcePageRecord,
};

use crate::excerpt::{extract_relevant_excerpts, DEFAULT_MAX_EXCERPTS};
use crate::paywall::looks_paywalled;
use crate::session::SessionCache;

const USER_AGENT: &str = "citegate/0.1 (+https://github.com/citegate/citegate)";

/// Remote-store entries older than this are treated as misses.
const REMOTE_STALE_AFTER_DAYS: i64 = 7;

/// Base delay for exponential backoff between fetch attempts.
const BACKOFF_BASE_MS: u64 = 500;

/// Domains that block automated fetch; no network call is attempted.
const BLOCKED_DOMAINS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "tiktok.com",
    "threads.net",
];

fn is_blocked_domain(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };
    let Some(host) = parsed.host_str() else { return false };
    BLOCKED_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

// ── Request ───────────────────────────────────────────────────────────────────

/// One fetch request. Either `url` or a `resource_id` resolvable through
/// the catalog is required.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: Option<String>,
    pub resource_id: Option<String>,
    pub extract: ExtractMode,
    pub query: Option<String>,
    /// Reflect the fetch outcome back to the resource catalog.
    pub update_resource_status: bool,
}

impl FetchRequest {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Self::default() }
    }

    pub fn for_resource(id: impl Into<String>) -> Self {
        Self { resource_id: Some(id.into()), ..Self::default() }
    }

    pub fn relevant_to(mut self, query: impl Into<String>) -> Self {
        self.extract = ExtractMode::Relevant;
        self.query = Some(query.into());
        self
    }
}

/// Batch controls for [`SourceFetcher::fetch_sources`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub delay_ms: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { concurrency: 3, delay_ms: 1_000 }
    }
}

// ── Fetcher ───────────────────────────────────────────────────────────────────

type SharedFetch = Shared<BoxFuture<'static, FetchedSource>>;

struct FetcherInner {
    http: reqwest::Client,
    cfg: FetcherConfig,
    session: Mutex<SessionCache>,
    inflight: Mutex<HashMap<String, SharedFetch>>,
    embedded: Option<Arc<dyn EmbeddedStore>>,
    remote: Option<Arc<dyn RemoteStore>>,
    catalog: Option<Arc<dyn ResourceCatalog>>,
}

#[derive(Clone)]
pub struct SourceFetcher {
    inner: Arc<FetcherInner>,
}

impl SourceFetcher {
    pub fn new(cfg: FetcherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CitegateError::Config(format!("HTTP client build failed: {e}")))?;
        let session = Mutex::new(SessionCache::new(cfg.session_cache_capacity));
        Ok(Self {
            inner: Arc::new(FetcherInner {
                http,
                cfg,
                session,
                inflight: Mutex::new(HashMap::new()),
                embedded: None,
                remote: None,
                catalog: None,
            }),
        })
    }

    pub fn with_embedded(mut self, store: Arc<dyn EmbeddedStore>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure the fetcher before cloning it")
            .embedded = Some(store);
        self
    }

    pub fn with_remote(mut self, store: Arc<dyn RemoteStore>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure the fetcher before cloning it")
            .remote = Some(store);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ResourceCatalog>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure the fetcher before cloning it")
            .catalog = Some(catalog);
        self
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    pub fn session_cache_size(&self) -> usize {
        self.inner.session.lock().unwrap().len()
    }

    pub fn session_cache_evictions(&self) -> u64 {
        self.inner.session.lock().unwrap().evictions()
    }

    pub fn clear_session_cache(&self) {
        self.inner.session.lock().unwrap().clear()
    }

    // ── Single fetch ─────────────────────────────────────────────────────

    /// Resolve one source through the tier chain.
    ///
    /// Expected runtime conditions (dead links, paywalls, network
    /// failures) come back as [`FetchStatus`] values; the only error is
    /// the precondition class: no URL, an unresolvable resource id, or
    /// relevant mode without a query.
    #[instrument(skip(self, request), fields(url = request.url.as_deref().unwrap_or("")))]
    pub async fn fetch_source(&self, request: FetchRequest) -> Result<FetchedSource> {
        if request.extract == ExtractMode::Relevant && request.query.is_none() {
            return Err(CitegateError::InvalidRequest(
                "relevant extract mode requires a query".to_string(),
            ));
        }

        let (url, id_meta) = self.resolve_target(&request).await?;

        let cached = self.inner.session.lock().unwrap().get(&url);
        let resolved = match cached {
            Some(hit) => {
                debug!(url, "session cache hit");
                hit
            }
            None => self.resolve_shared(&url).await,
        };

        Ok(self.finish(resolved, &request, id_meta))
    }

    /// Process requests in fixed-size batches, preserving input order.
    /// Sleeps `delay_ms` between batches, not within one.
    pub async fn fetch_sources(
        &self,
        requests: &[FetchRequest],
        opts: BatchOptions,
    ) -> Result<Vec<FetchedSource>> {
        let concurrency = opts.concurrency.max(1);
        let total_batches = requests.len().div_ceil(concurrency);
        let mut out = Vec::with_capacity(requests.len());

        for (i, batch) in requests.chunks(concurrency).enumerate() {
            let results = futures_util::future::join_all(
                batch.iter().map(|r| self.fetch_source(r.clone())),
            )
            .await;
            for r in results {
                out.push(r?);
            }
            if i + 1 < total_batches && opts.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(opts.delay_ms)).await;
            }
        }
        Ok(out)
    }

    // ── Resolution ───────────────────────────────────────────────────────

    async fn resolve_target(
        &self,
        request: &FetchRequest,
    ) -> Result<(String, Option<ResourceMeta>)> {
        if let Some(url) = &request.url {
            let meta = self.catalog_meta_for_url(url).await;
            return Ok((url.clone(), meta));
        }
        if let (Some(id), Some(catalog)) = (&request.resource_id, &self.inner.catalog) {
            match catalog.get_by_id(id).await {
                Ok(Some(resource)) => {
                    if let Some(url) = resource.url {
                        return Ok((url, Some(resource.meta)));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(id, error = %e, "catalog lookup failed"),
            }
        }
        Err(CitegateError::InvalidRequest(
            "fetch request needs a url or a resource id that resolves to one".to_string(),
        ))
    }

    /// Catalog metadata for a URL request, when the URL matches a known
    /// resource. Lookup failures degrade to no metadata.
    async fn catalog_meta_for_url(&self, url: &str) -> Option<ResourceMeta> {
        let catalog = self.inner.catalog.as_ref()?;
        match catalog.get_by_url(url).await {
            Ok(Some(resource)) => Some(resource.meta),
            Ok(None) => None,
            Err(e) => {
                warn!(url, error = %e, "catalog lookup failed");
                None
            }
        }
    }

    /// Deduplicate concurrent resolutions of the same URL: the first
    /// caller installs a shared future, later callers await the same one.
    async fn resolve_shared(&self, url: &str) -> FetchedSource {
        let fut = {
            let mut inflight = self.inner.inflight.lock().unwrap();
            match inflight.get(url) {
                Some(existing) => {
                    debug!(url, "joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let owned_url = url.to_string();
                    let fut: SharedFetch = async move {
                        let resolved = resolve_uncached(&inner, &owned_url).await;
                        inner.session.lock().unwrap().insert(resolved.clone());
                        inner.inflight.lock().unwrap().remove(&owned_url);
                        resolved
                    }
                    .boxed()
                    .shared();
                    inflight.insert(url.to_string(), fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    /// Apply per-request concerns to a resolved source: excerpt mode,
    /// catalog metadata, optional status reflection.
    fn finish(
        &self,
        mut source: FetchedSource,
        request: &FetchRequest,
        id_meta: Option<ResourceMeta>,
    ) -> FetchedSource {
        // Excerpts are never cached; recompute for this request's mode
        // and query so no read can see another query's excerpts.
        source.relevant_excerpts = match (request.extract, request.query.as_deref()) {
            (ExtractMode::Relevant, Some(query)) => {
                extract_relevant_excerpts(&source.content, query, DEFAULT_MAX_EXCERPTS)
            }
            _ => Vec::new(),
        };

        if source.resource.is_none() {
            source.resource = id_meta;
        }

        if request.update_resource_status {
            if let (Some(catalog), Some(meta)) = (&self.inner.catalog, &source.resource) {
                let catalog = catalog.clone();
                let id = meta.id.clone();
                let update = FetchStatusUpdate {
                    fetch_status: source.status.as_str().to_string(),
                    fetched_at: source.fetched_at,
                    fetched_title: (!source.title.is_empty()).then(|| source.title.clone()),
                };
                tokio::spawn(async move {
                    if let Err(e) = catalog.update_fetch_status(&id, update).await {
                        warn!(id, error = %e, "resource status update failed");
                    }
                });
            }
        }

        source
    }
}

// ── Uncached resolution (runs inside the shared future) ──────────────────────

async fn resolve_uncached(inner: &Arc<FetcherInner>, url: &str) -> FetchedSource {
    if is_blocked_domain(url) {
        info!(url, "domain blocks automated fetch, skipping network");
        return FetchedSource::error(url);
    }

    // Remote tier, inside its staleness window.
    if let Some(remote) = &inner.remote {
        match remote.get_by_url(url).await {
            Ok(Some(record)) if is_fresh(&record) => {
                debug!(url, "remote cache hit");
                backfill_embedded(inner, &record);
                return source_from_record(url, &record);
            }
            Ok(Some(_)) => debug!(url, "remote cache entry stale"),
            Ok(None) => {}
            Err(e) => warn!(url, error = %e, "remote cache read failed"),
        }
    }

    // Embedded tier, no expiry.
    if let Some(embedded) = &inner.embedded {
        match embedded.get_by_url(url) {
            Ok(Some(record)) => {
                debug!(url, "embedded cache hit");
                return source_from_record(url, &record);
            }
            Ok(None) => {}
            Err(e) => warn!(url, error = %e, "embedded cache read failed"),
        }
    }

    // Network.
    let outcome = fetch_from_network(inner, url).await;
    let content = cap_content(&outcome.text);

    let status = if outcome.http_status.is_some_and(|s| s >= 400) {
        FetchStatus::Dead
    } else if outcome.failed {
        FetchStatus::Error
    } else if looks_paywalled(&content) {
        FetchStatus::Paywall
    } else {
        FetchStatus::Ok
    };

    if !content.is_empty() && (status == FetchStatus::Ok || status == FetchStatus::Paywall) {
        persist(inner, url, &content, &outcome.title, outcome.http_status);
    }

    FetchedSource {
        url: url.to_string(),
        title: outcome.title,
        fetched_at: Utc::now(),
        content,
        relevant_excerpts: Vec::new(),
        status,
        resource: None,
    }
}

fn is_fresh(record: &SourcePageRecord) -> bool {
    Utc::now() - record.fetched_at <= chrono::Duration::days(REMOTE_STALE_AFTER_DAYS)
}

fn source_from_record(url: &str, record: &SourcePageRecord) -> FetchedSource {
    let content = cap_content(&record.full_text);
    let status = if record.http_status.is_some_and(|s| s >= 400) {
        FetchStatus::Dead
    } else if looks_paywalled(&content) {
        FetchStatus::Paywall
    } else {
        FetchStatus::Ok
    };
    FetchedSource {
        url: url.to_string(),
        title: record.page_title.clone(),
        fetched_at: record.fetched_at,
        content,
        relevant_excerpts: Vec::new(),
        status,
        resource: None,
    }
}

fn backfill_embedded(inner: &Arc<FetcherInner>, record: &SourcePageRecord) {
    if let Some(embedded) = &inner.embedded {
        if let Err(e) = embedded.upsert(record) {
            warn!(url = %record.url, error = %e, "embedded backfill failed");
        }
    }
}

/// Write-through after a successful fetch: embedded synchronously, remote
/// as a detached task. Failures are logged, never surfaced.
fn persist(inner: &Arc<FetcherInner>, url: &str, content: &str, title: &str, status: Option<u16>) {
    let record = SourcePageRecord::new(url, content, title, status);

    if let Some(embedded) = &inner.embedded {
        if let Err(e) = embedded.upsert(&record) {
            warn!(url, error = %e, "embedded store write failed");
        }
    }

    if let Some(remote) = inner.remote.clone() {
        tokio::spawn(async move {
            if let Err(e) = remote.upsert(&record).await {
                warn!(url = %record.url, error = %e, "remote store write failed");
            }
        });
    }
}

// ── Network strategies ────────────────────────────────────────────────────────

struct NetworkOutcome {
    text: String,
    title: String,
    http_status: Option<u16>,
    /// A fetch error occurred (network failure, unusable content type).
    failed: bool,
}

impl NetworkOutcome {
    fn failure(http_status: Option<u16>) -> Self {
        Self { text: String::new(), title: String::new(), http_status, failed: true }
    }
}

async fn fetch_from_network(inner: &Arc<FetcherInner>, url: &str) -> NetworkOutcome {
    if let Some(service) = &inner.cfg.markdown_service_url {
        match fetch_via_markdown_service(inner, service, url).await {
            Ok(outcome) => return outcome,
            Err(e) => warn!(url, error = %e, "markdown service failed, using fallback"),
        }
    }
    fetch_via_fallback(inner, url).await
}

/// Rich extraction: a service that renders the page and returns cleaned
/// markdown plus a title.
async fn fetch_via_markdown_service(
    inner: &Arc<FetcherInner>,
    service: &str,
    url: &str,
) -> Result<NetworkOutcome> {
    let endpoint = format!("{}/extract", service.trim_end_matches('/'));
    let resp = inner
        .http
        .post(&endpoint)
        .json(&serde_json::json!({ "url": url }))
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(CitegateError::Storage(format!(
            "markdown service returned {}",
            resp.status()
        )));
    }

    let body: serde_json::Value = resp.json().await?;
    let text = body["markdown"]
        .as_str()
        .or_else(|| body["content"].as_str())
        .unwrap_or("")
        .to_string();
    if text.is_empty() {
        return Err(CitegateError::Storage("markdown service returned no content".to_string()));
    }
    let title = body["title"].as_str().unwrap_or("").to_string();
    Ok(NetworkOutcome { text, title, http_status: Some(200), failed: false })
}

/// Built-in fallback: plain GET with retry/backoff, HTML parsed to text.
async fn fetch_via_fallback(inner: &Arc<FetcherInner>, url: &str) -> NetworkOutcome {
    let max_retries = inner.cfg.max_retries;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = BACKOFF_BASE_MS * (1 << (attempt - 1));
            debug!(url, attempt, backoff_ms = backoff, "retrying fetch");
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }

        let resp = match inner.http.get(url).send().await {
            Ok(resp) => resp,
            Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_retries => {
                debug!(url, error = %e, "transient network failure");
                continue;
            }
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                return NetworkOutcome::failure(None);
            }
        };

        let status = resp.status().as_u16();

        // 5xx and 429 are worth retrying; other failures are definitive.
        if (status >= 500 || status == 429) && attempt < max_retries {
            debug!(url, status, "retryable HTTP status");
            continue;
        }
        if status >= 400 {
            info!(url, status, "source is dead");
            return NetworkOutcome {
                text: String::new(),
                title: String::new(),
                http_status: Some(status),
                failed: false,
            };
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if content_type.contains("application/pdf") {
            // PDF extraction is out of scope; evaluated as unusable.
            info!(url, "PDF content, skipping extraction");
            return NetworkOutcome::failure(Some(status));
        }
        if !content_type.contains("html") && !content_type.contains("text/plain") {
            info!(url, content_type, "unsupported content type");
            return NetworkOutcome::failure(Some(status));
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "failed reading response body");
                return NetworkOutcome::failure(Some(status));
            }
        };

        return if content_type.contains("text/plain") {
            NetworkOutcome {
                text: body,
                title: String::new(),
                http_status: Some(status),
                failed: false,
            }
        } else {
            let (title, text) = html_to_text(&body);
            NetworkOutcome { text, title, http_status: Some(status), failed: false }
        };
    }

    NetworkOutcome::failure(None)
}

/// Reduce an HTML document to its title and blank-line-separated block
/// text, skipping script/style noise.
fn html_to_text(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);

    let title_sel = Selector::parse("title").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let block_sel =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li, blockquote, pre, td").unwrap();
    let mut blocks: Vec<String> = doc
        .select(&block_sel)
        .map(|el| {
            el.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|b| !b.is_empty())
        .collect();

    // Bare documents with no block elements: fall back to body text.
    if blocks.is_empty() {
        let body_sel = Selector::parse("body").unwrap();
        if let Some(body) = doc.select(&body_sel).next() {
            let text = body
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                blocks.push(text);
            }
        }
    }

    (title, blocks.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_domain_matching() {
        assert!(is_blocked_domain("https://twitter.com/some/status"));
        assert!(is_blocked_domain("https://mobile.twitter.com/some/status"));
        assert!(is_blocked_domain("https://x.com/post/1"));
        assert!(!is_blocked_domain("https://example.com/x.com"));
        assert!(!is_blocked_domain("https://notx.com/page"));
        assert!(!is_blocked_domain("not a url"));
    }

    #[test]
    fn test_html_to_text_extracts_blocks_and_title() {
        let html = "<html><head><title>A Page</title><style>.x{}</style></head>\
                    <body><script>var x=1;</script><h1>Heading</h1>\
                    <p>First   paragraph.</p><p>Second paragraph.</p></body></html>";
        let (title, text) = html_to_text(html);
        assert_eq!(title, "A Page");
        assert_eq!(text, "Heading\n\nFirst paragraph.\n\nSecond paragraph.");
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_html_to_text_body_fallback() {
        let html = "<html><body>just loose text</body></html>";
        let (_, text) = html_to_text(html);
        assert_eq!(text, "just loose text");
    }

    #[test]
    fn test_record_staleness_window() {
        let mut record = SourcePageRecord::new("https://a.example", "text", "t", Some(200));
        assert!(is_fresh(&record));
        record.fetched_at = Utc::now() - chrono::Duration::days(REMOTE_STALE_AFTER_DAYS + 1);
        assert!(!is_fresh(&record));
    }

    #[test]
    fn test_source_from_record_maps_status() {
        let dead = SourcePageRecord::new("https://a.example", "", "t", Some(404));
        assert_eq!(source_from_record("https://a.example", &dead).status, FetchStatus::Dead);

        let ok = SourcePageRecord::new("https://a.example", "plain text body", "t", Some(200));
        assert_eq!(source_from_record("https://a.example", &ok).status, FetchStatus::Ok);

        let paywalled =
            SourcePageRecord::new("https://a.example", "Subscribe to continue reading.", "t", Some(200));
        assert_eq!(
            source_from_record("https://a.example", &paywalled).status,
            FetchStatus::Paywall
        );
    }
}
