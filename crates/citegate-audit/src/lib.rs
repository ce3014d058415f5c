//! citegate-audit — LLM-backed citation auditing with a pass/fail gate.
//!
//! Extracts footnote citations from a document, resolves each source
//! through `citegate-source`, verifies claims against source text in
//! batched, concurrency-limited LLM calls, and aggregates the verdicts
//! into a report suitable for gating automation.

pub mod auditor;
pub mod citations;
pub mod prompt;
pub mod verdict;

pub use auditor::{AuditRequest, CitationAuditor};
pub use citations::{extract_citations, extract_claim_sentence, Citation};
pub use verdict::{AuditResult, AuditSummary, CitationAudit, Verdict};
