//! Resource catalog REST client.
//!
//! The catalog maps resource ids to URLs and records fetch outcomes so the
//! wiki's maintenance views can surface dead or paywalled sources.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use citegate_common::error::{CitegateError, Result};
use citegate_common::traits::{CatalogResource, FetchStatusUpdate, ResourceCatalog};
use citegate_common::types::ResourceMeta;

pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    title: String,
    #[serde(rename = "type")]
    resource_type: String,
    summary: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    url: Option<String>,
}

impl From<CatalogEntry> for CatalogResource {
    fn from(e: CatalogEntry) -> Self {
        CatalogResource {
            meta: ResourceMeta {
                id: e.id,
                title: e.title,
                resource_type: e.resource_type,
                summary: e.summary,
                authors: e.authors,
                tags: e.tags,
            },
            url: e.url,
        }
    }
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_entry(&self, request: reqwest::RequestBuilder) -> Result<Option<CatalogResource>> {
        let resp = request.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CitegateError::Storage(format!(
                "catalog returned {}",
                resp.status()
            )));
        }
        let entry: CatalogEntry = resp.json().await?;
        Ok(Some(entry.into()))
    }
}

#[async_trait]
impl ResourceCatalog for CatalogClient {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> Result<Option<CatalogResource>> {
        let endpoint = format!("{}/resources/{}", self.base_url, id);
        self.fetch_entry(self.client.get(&endpoint)).await
    }

    #[instrument(skip(self))]
    async fn get_by_url(&self, url: &str) -> Result<Option<CatalogResource>> {
        let endpoint = format!("{}/resources", self.base_url);
        self.fetch_entry(self.client.get(&endpoint).query(&[("url", url)]))
            .await
    }

    #[instrument(skip(self, update), fields(status = %update.fetch_status))]
    async fn update_fetch_status(&self, id: &str, update: FetchStatusUpdate) -> Result<()> {
        let endpoint = format!("{}/resources/{}/fetch-status", self.base_url, id);
        let body = serde_json::json!({
            "fetchStatus": update.fetch_status,
            "fetchedAt":   update.fetched_at,
            "fetchedTitle": update.fetched_title,
        });
        let resp = self.client.patch(&endpoint).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(CitegateError::Storage(format!(
                "catalog status update returned {}",
                resp.status()
            )));
        }
        debug!(id, "resource fetch status updated");
        Ok(())
    }
}
