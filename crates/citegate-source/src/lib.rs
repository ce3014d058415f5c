//! citegate-source — Tiered source fetching for citation tooling.
//!
//! The fetcher resolves URLs through an in-process LRU, a remote HTTP
//! store, an embedded SQLite store, and finally the network, with
//! in-flight deduplication so concurrent identical requests cost one
//! fetch. Also home to the excerpt extractor and the concurrency limiter
//! the auditor builds on.

pub mod excerpt;
pub mod fetcher;
pub mod limiter;
pub mod paywall;
pub mod session;

pub use excerpt::{extract_relevant_excerpts, DEFAULT_MAX_EXCERPTS};
pub use fetcher::{BatchOptions, FetchRequest, SourceFetcher};
pub use limiter::TaskLimiter;
pub use session::SessionCache;
