//! Store and catalog seams between the fetcher and its persistent tiers.
//!
//! The embedded tier is local synchronous I/O; the remote tier and the
//! resource catalog are network services. Both tiers are externally owned:
//! the fetcher reads and writes them but a write failure must never fail
//! the read path that triggered it.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ResourceMeta, SourcePageRecord};

/// Embedded (local SQL) cache tier, keyed by URL, no expiry.
pub trait EmbeddedStore: Send + Sync {
    fn get_by_url(&self, url: &str) -> Result<Option<SourcePageRecord>>;
    fn upsert(&self, record: &SourcePageRecord) -> Result<()>;
}

/// Remote (networked) cache tier. Entries carry a server-assigned id;
/// staleness is judged by the caller from `fetched_at`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_by_url(&self, url: &str) -> Result<Option<SourcePageRecord>>;
    async fn upsert(&self, record: &SourcePageRecord) -> Result<SourcePageRecord>;
}

/// Fetch-status update pushed back to the resource catalog after a fetch.
#[derive(Debug, Clone)]
pub struct FetchStatusUpdate {
    pub fetch_status: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub fetched_title: Option<String>,
}

/// Resource catalog lookup: maps resource ids to URLs and optionally
/// records fetch outcomes.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<CatalogResource>>;
    async fn get_by_url(&self, url: &str) -> Result<Option<CatalogResource>>;
    async fn update_fetch_status(&self, id: &str, update: FetchStatusUpdate) -> Result<()>;
}

/// A catalog entry: metadata plus the URL it points at.
#[derive(Debug, Clone)]
pub struct CatalogResource {
    pub meta: ResourceMeta,
    pub url: Option<String>,
}
