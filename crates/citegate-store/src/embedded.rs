//! Embedded SQLite cache tier.
//!
//! One table, `source_pages`, keyed by URL with no expiry. The store is
//! shared with other local tooling; schema creation is idempotent.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use citegate_common::error::{CitegateError, Result};
use citegate_common::traits::EmbeddedStore;
use citegate_common::types::SourcePageRecord;

pub struct SqliteSourceStore {
    conn: Mutex<Connection>,
}

impl SqliteSourceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS source_pages (
                url            TEXT PRIMARY KEY,
                full_text      TEXT NOT NULL,
                page_title     TEXT NOT NULL DEFAULT '',
                fetched_at     TEXT NOT NULL,
                http_status    INTEGER,
                content_length INTEGER NOT NULL DEFAULT 0
            );",
        )
        .map_err(sql_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn sql_err(e: rusqlite::Error) -> CitegateError {
    CitegateError::Storage(e.to_string())
}

impl EmbeddedStore for SqliteSourceStore {
    fn get_by_url(&self, url: &str) -> Result<Option<SourcePageRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT url, full_text, page_title, fetched_at, http_status, content_length
             FROM source_pages WHERE url = ?1",
            params![url],
            |row| {
                Ok(SourcePageRecord {
                    id: None,
                    url: row.get(0)?,
                    full_text: row.get(1)?,
                    page_title: row.get(2)?,
                    fetched_at: row
                        .get::<_, String>(3)?
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_else(|_| Utc::now()),
                    http_status: row.get::<_, Option<i64>>(4)?.map(|s| s as u16),
                    content_length: row.get::<_, i64>(5)? as usize,
                })
            },
        )
        .optional()
        .map_err(sql_err)
    }

    fn upsert(&self, record: &SourcePageRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO source_pages (url, full_text, page_title, fetched_at, http_status, content_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET
                full_text      = excluded.full_text,
                page_title     = excluded.page_title,
                fetched_at     = excluded.fetched_at,
                http_status    = excluded.http_status,
                content_length = excluded.content_length",
            params![
                record.url,
                record.full_text,
                record.page_title,
                record.fetched_at.to_rfc3339(),
                record.http_status.map(|s| s as i64),
                record.content_length as i64,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }
}
