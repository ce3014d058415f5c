//! Remote source-page store client.
//!
//! A shared HTTP key-value service: GET by URL, PUT to upsert. Records
//! carry a server-assigned id. The fetcher treats entries older than its
//! staleness window as misses; this client only moves records.

use async_trait::async_trait;
use tracing::{debug, instrument};

use citegate_common::error::{CitegateError, Result};
use citegate_common::traits::RemoteStore;
use citegate_common::types::SourcePageRecord;

pub struct RemoteSourceStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteSourceStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RemoteStore for RemoteSourceStore {
    #[instrument(skip(self))]
    async fn get_by_url(&self, url: &str) -> Result<Option<SourcePageRecord>> {
        let endpoint = format!("{}/source-pages", self.base_url);
        let resp = self
            .client
            .get(&endpoint)
            .query(&[("url", url)])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CitegateError::Storage(format!(
                "remote store GET returned {}",
                resp.status()
            )));
        }

        let record: SourcePageRecord = resp.json().await?;
        debug!(url, content_length = record.content_length, "remote store hit");
        Ok(Some(record))
    }

    #[instrument(skip(self, record), fields(url = %record.url))]
    async fn upsert(&self, record: &SourcePageRecord) -> Result<SourcePageRecord> {
        let endpoint = format!("{}/source-pages", self.base_url);
        let resp = self.client.put(&endpoint).json(record).send().await?;

        if !resp.status().is_success() {
            return Err(CitegateError::Storage(format!(
                "remote store PUT returned {}",
                resp.status()
            )));
        }
        let saved: SourcePageRecord = resp.json().await?;
        Ok(saved)
    }
}
