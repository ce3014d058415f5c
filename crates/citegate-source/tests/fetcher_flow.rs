//! End-to-end fetcher behavior against mock tiers and a loopback HTTP
//! server. No external network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use citegate_common::config::FetcherConfig;
use citegate_common::error::{CitegateError, Result};
use citegate_common::traits::{
    CatalogResource, EmbeddedStore, FetchStatusUpdate, RemoteStore, ResourceCatalog,
};
use citegate_common::types::{ExtractMode, FetchStatus, ResourceMeta, SourcePageRecord};
use citegate_source::fetcher::{BatchOptions, FetchRequest, SourceFetcher};
use citegate_store::SqliteSourceStore;

// ── Mock remote tier ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MockRemote {
    records: Mutex<Vec<SourcePageRecord>>,
    gets: AtomicUsize,
    upserts: Mutex<Vec<SourcePageRecord>>,
}

impl MockRemote {
    fn with_record(record: SourcePageRecord) -> Self {
        Self {
            records: Mutex::new(vec![record]),
            ..Self::default()
        }
    }

    fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn get_by_url(&self, url: &str) -> Result<Option<SourcePageRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.url == url)
            .cloned())
    }

    async fn upsert(&self, record: &SourcePageRecord) -> Result<SourcePageRecord> {
        self.upserts.lock().unwrap().push(record.clone());
        let mut saved = record.clone();
        saved.id = Some(1);
        Ok(saved)
    }
}

// ── Mock resource catalog ────────────────────────────────────────────────────

#[derive(Default)]
struct MockCatalog {
    resources: Mutex<Vec<(Option<String>, ResourceMeta)>>,
    updates: Mutex<Vec<(String, FetchStatusUpdate)>>,
}

impl MockCatalog {
    fn with_resource(id: &str, url: &str) -> Self {
        let meta = ResourceMeta {
            id: id.to_string(),
            title: format!("Resource {id}"),
            resource_type: "article".to_string(),
            summary: None,
            authors: Vec::new(),
            tags: Vec::new(),
        };
        Self {
            resources: Mutex::new(vec![(Some(url.to_string()), meta)]),
            updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceCatalog for MockCatalog {
    async fn get_by_id(&self, id: &str) -> Result<Option<CatalogResource>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .find(|(_, meta)| meta.id == id)
            .map(|(url, meta)| CatalogResource { meta: meta.clone(), url: url.clone() }))
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<CatalogResource>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u.as_deref() == Some(url))
            .map(|(u, meta)| CatalogResource { meta: meta.clone(), url: u.clone() }))
    }

    async fn update_fetch_status(&self, id: &str, update: FetchStatusUpdate) -> Result<()> {
        self.updates.lock().unwrap().push((id.to_string(), update));
        Ok(())
    }
}

/// Remote tier that always errors; reads must degrade to the next tier.
struct BrokenRemote;

#[async_trait]
impl RemoteStore for BrokenRemote {
    async fn get_by_url(&self, _url: &str) -> Result<Option<SourcePageRecord>> {
        Err(CitegateError::Storage("remote tier down".to_string()))
    }

    async fn upsert(&self, _record: &SourcePageRecord) -> Result<SourcePageRecord> {
        Err(CitegateError::Storage("remote tier down".to_string()))
    }
}

// ── Loopback HTTP server ─────────────────────────────────────────────────────

/// Serve canned HTTP responses in order, repeating the last one; returns
/// the URL to fetch and a hit counter.
async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

    let hits_srv = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { break };
            hits_srv.fetch_add(1, Ordering::SeqCst);
            let response = {
                let mut q = queue.lock().unwrap();
                if q.len() > 1 {
                    q.pop_front().unwrap()
                } else {
                    q.front().cloned().unwrap_or_default()
                }
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    (format!("http://{addr}/page"), hits)
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn fetcher_with(cfg: FetcherConfig) -> SourceFetcher {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    SourceFetcher::new(cfg).unwrap()
}

fn quick_cfg() -> FetcherConfig {
    FetcherConfig { timeout_secs: 5, max_retries: 0, ..FetcherConfig::default() }
}

const PAGE_TEXT: &str =
    "AI safety matters. The field requires careful work across many research directions.";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_identical_requests_resolve_once() {
    let remote = Arc::new(MockRemote::with_record(SourcePageRecord::new(
        "https://example.org/shared",
        PAGE_TEXT,
        "Shared",
        Some(200),
    )));
    let fetcher = fetcher_with(quick_cfg()).with_remote(remote.clone());

    let futures: Vec<_> = (0..8)
        .map(|_| fetcher.fetch_source(FetchRequest::for_url("https://example.org/shared")))
        .collect();
    let results = futures_util::future::join_all(futures).await;

    for r in &results {
        let src = r.as_ref().unwrap();
        assert_eq!(src.status, FetchStatus::Ok);
        assert_eq!(src.content, PAGE_TEXT);
    }
    // All eight callers shared a single tier resolution.
    assert_eq!(remote.get_count(), 1);
    assert_eq!(fetcher.session_cache_size(), 1);
}

#[tokio::test]
async fn full_mode_never_sees_another_querys_excerpts() {
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    embedded
        .upsert(&SourcePageRecord::new(
            "https://example.org/doc",
            "Alignment research is an open problem with many unsolved questions.\n\n\
             Cooking pasta requires salted water and a watchful eye on the clock.",
            "Doc",
            Some(200),
        ))
        .unwrap();
    let fetcher = fetcher_with(quick_cfg()).with_embedded(embedded);

    let relevant = fetcher
        .fetch_source(FetchRequest::for_url("https://example.org/doc").relevant_to("alignment research"))
        .await
        .unwrap();
    assert_eq!(relevant.relevant_excerpts.len(), 1);
    assert!(relevant.relevant_excerpts[0].contains("Alignment"));

    // A full-mode read of the now-cached entry carries no excerpts.
    let full = fetcher
        .fetch_source(FetchRequest::for_url("https://example.org/doc"))
        .await
        .unwrap();
    assert!(full.relevant_excerpts.is_empty());

    // A later relevant-mode read recomputes against its own query.
    let other = fetcher
        .fetch_source(FetchRequest::for_url("https://example.org/doc").relevant_to("pasta cooking"))
        .await
        .unwrap();
    assert_eq!(other.relevant_excerpts.len(), 1);
    assert!(other.relevant_excerpts[0].contains("pasta"));
}

#[tokio::test]
async fn remote_hit_backfills_embedded_tier() {
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    let remote = Arc::new(MockRemote::with_record(SourcePageRecord::new(
        "https://example.org/backfill",
        PAGE_TEXT,
        "Backfill",
        Some(200),
    )));
    let fetcher = fetcher_with(quick_cfg())
        .with_embedded(embedded.clone())
        .with_remote(remote);

    let src = fetcher
        .fetch_source(FetchRequest::for_url("https://example.org/backfill"))
        .await
        .unwrap();
    assert_eq!(src.status, FetchStatus::Ok);

    let stored = embedded.get_by_url("https://example.org/backfill").unwrap().unwrap();
    assert_eq!(stored.full_text, PAGE_TEXT);
}

#[tokio::test]
async fn stale_remote_entry_is_a_miss() {
    let mut old = SourcePageRecord::new("http://127.0.0.1:1/gone", PAGE_TEXT, "Old", Some(200));
    old.fetched_at = Utc::now() - chrono::Duration::days(8);
    let remote = Arc::new(MockRemote::with_record(old));
    let fetcher = fetcher_with(quick_cfg()).with_remote(remote);

    // The stale record is skipped and the (unreachable) origin fails.
    let src = fetcher
        .fetch_source(FetchRequest::for_url("http://127.0.0.1:1/gone"))
        .await
        .unwrap();
    assert_eq!(src.status, FetchStatus::Error);
    assert!(src.content.is_empty());
}

#[tokio::test]
async fn broken_remote_degrades_to_embedded() {
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    embedded
        .upsert(&SourcePageRecord::new("https://example.org/deg", PAGE_TEXT, "Deg", Some(200)))
        .unwrap();
    let fetcher = fetcher_with(quick_cfg())
        .with_embedded(embedded)
        .with_remote(Arc::new(BrokenRemote));

    let src = fetcher
        .fetch_source(FetchRequest::for_url("https://example.org/deg"))
        .await
        .unwrap();
    assert_eq!(src.status, FetchStatus::Ok);
    assert_eq!(src.content, PAGE_TEXT);
}

#[tokio::test]
async fn not_found_maps_to_dead_and_is_cached() {
    let (url, hits) = serve(vec![http_response("404 Not Found", "text/html", "gone")]).await;
    let fetcher = fetcher_with(quick_cfg());

    let src = fetcher.fetch_source(FetchRequest::for_url(&url)).await.unwrap();
    assert_eq!(src.status, FetchStatus::Dead);
    assert!(src.content.is_empty());
    assert!(src.relevant_excerpts.is_empty());
    assert_eq!(fetcher.session_cache_size(), 1);

    // Second read is served from the session cache.
    let again = fetcher.fetch_source(FetchRequest::for_url(&url)).await.unwrap();
    assert_eq!(again.status, FetchStatus::Dead);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_on_429_then_succeeds() {
    let html = format!("<html><head><title>T</title></head><body><p>{PAGE_TEXT}</p></body></html>");
    let (url, hits) = serve(vec![
        http_response("429 Too Many Requests", "text/html", "slow down"),
        http_response("200 OK", "text/html; charset=utf-8", &html),
    ])
    .await;
    let cfg = FetcherConfig { timeout_secs: 5, max_retries: 2, ..FetcherConfig::default() };
    let fetcher = fetcher_with(cfg);

    let src = fetcher.fetch_source(FetchRequest::for_url(&url)).await.unwrap();
    assert_eq!(src.status, FetchStatus::Ok);
    assert_eq!(src.title, "T");
    assert!(src.content.contains("AI safety matters."));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pdf_content_type_maps_to_error_with_empty_body() {
    let (url, _) = serve(vec![http_response("200 OK", "application/pdf", "%PDF-1.4")]).await;
    let fetcher = fetcher_with(quick_cfg());

    let src = fetcher.fetch_source(FetchRequest::for_url(&url)).await.unwrap();
    assert_eq!(src.status, FetchStatus::Error);
    assert!(src.content.is_empty());
}

#[tokio::test]
async fn blocked_domain_is_an_error_without_network() {
    let fetcher = fetcher_with(quick_cfg());
    let src = fetcher
        .fetch_source(FetchRequest::for_url("https://twitter.com/someone/status/1"))
        .await
        .unwrap();
    assert_eq!(src.status, FetchStatus::Error);
    assert_eq!(fetcher.session_cache_size(), 1);
}

#[tokio::test]
async fn fetch_sources_preserves_input_order() {
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    for i in 0..5 {
        embedded
            .upsert(&SourcePageRecord::new(
                format!("https://example.org/{i}"),
                format!("text number {i} with enough length to matter"),
                format!("Title {i}"),
                Some(200),
            ))
            .unwrap();
    }
    let fetcher = fetcher_with(quick_cfg()).with_embedded(embedded);

    let requests: Vec<_> = (0..5)
        .map(|i| FetchRequest::for_url(format!("https://example.org/{i}")))
        .collect();
    let out = fetcher
        .fetch_sources(&requests, BatchOptions { concurrency: 2, delay_ms: 0 })
        .await
        .unwrap();

    assert_eq!(out.len(), 5);
    for (i, src) in out.iter().enumerate() {
        assert_eq!(src.url, format!("https://example.org/{i}"));
    }
}

#[tokio::test]
async fn request_without_url_or_resource_is_invalid() {
    let fetcher = fetcher_with(quick_cfg());
    let err = fetcher.fetch_source(FetchRequest::default()).await.unwrap_err();
    assert!(matches!(err, CitegateError::InvalidRequest(_)));

    let err = fetcher
        .fetch_source(FetchRequest {
            url: Some("https://example.org/q".to_string()),
            extract: ExtractMode::Relevant,
            query: None,
            ..FetchRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CitegateError::InvalidRequest(_)));
}

#[tokio::test]
async fn successful_fetch_persists_to_both_tiers() {
    let html = format!("<html><body><p>{PAGE_TEXT}</p></body></html>");
    let (url, _) = serve(vec![http_response("200 OK", "text/html", &html)]).await;

    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    let remote = Arc::new(MockRemote::default());
    let fetcher = fetcher_with(quick_cfg())
        .with_embedded(embedded.clone())
        .with_remote(remote.clone());

    let src = fetcher.fetch_source(FetchRequest::for_url(&url)).await.unwrap();
    assert_eq!(src.status, FetchStatus::Ok);

    let stored = embedded.get_by_url(&url).unwrap().unwrap();
    assert!(stored.full_text.contains("AI safety matters."));

    // The remote write is detached; give it a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(remote.upserts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn url_request_attaches_catalog_metadata_and_reflects_status() {
    let url = "https://example.org/known";
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    embedded
        .upsert(&SourcePageRecord::new(url, PAGE_TEXT, "Known", Some(200)))
        .unwrap();
    let catalog = Arc::new(MockCatalog::with_resource("res-42", url));
    let fetcher = fetcher_with(quick_cfg())
        .with_embedded(embedded)
        .with_catalog(catalog.clone());

    let mut request = FetchRequest::for_url(url);
    request.update_resource_status = true;
    let src = fetcher.fetch_source(request).await.unwrap();

    let meta = src.resource.expect("catalog match should attach metadata");
    assert_eq!(meta.id, "res-42");

    // The status reflection is detached; give it a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let updates = catalog.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "res-42");
    assert_eq!(updates[0].1.fetch_status, "ok");
}

#[tokio::test]
async fn url_without_catalog_match_carries_no_metadata() {
    let url = "https://example.org/unknown";
    let embedded = Arc::new(SqliteSourceStore::open_in_memory().unwrap());
    embedded
        .upsert(&SourcePageRecord::new(url, PAGE_TEXT, "Unknown", Some(200)))
        .unwrap();
    let catalog = Arc::new(MockCatalog::with_resource("res-42", "https://example.org/other"));
    let fetcher = fetcher_with(quick_cfg())
        .with_embedded(embedded)
        .with_catalog(catalog.clone());

    let mut request = FetchRequest::for_url(url);
    request.update_resource_status = true;
    let src = fetcher.fetch_source(request).await.unwrap();
    assert!(src.resource.is_none());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(catalog.updates.lock().unwrap().is_empty());
}
