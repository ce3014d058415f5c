//! citegate-store — Persistent cache tiers and the resource catalog client.
//!
//! Two tiers back the source fetcher: an embedded SQLite table for local
//! persistence and a remote HTTP key-value store shared across deployments.
//! Both implement traits from `citegate-common`; the fetcher never sees the
//! concrete types.

pub mod catalog;
pub mod embedded;
pub mod remote;

pub use catalog::CatalogClient;
pub use embedded::SqliteSourceStore;
pub use remote::RemoteSourceStore;
