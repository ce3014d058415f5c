//! Citation auditing pipeline.
//!
//! Stages for one document:
//!   1. Extract footnote citations from the body
//!   2. Resolve each citation's source (pre-seeded cache, then the
//!      fetcher when `fetch_missing` allows it)
//!   3. Partition: dead/unavailable/thin sources settle without an LLM
//!   4. Group the rest by shared source URL, one batched verification
//!      call per group (capped claims per call)
//!   5. Run groups under the task limiter with an inter-call delay
//!   6. Re-sort into original citation order, summarize, apply the gate
//!
//! Per-citation state machine: pending → {unchecked | url-dead} without
//! an LLM call, or pending → verifying → {verified | unsupported |
//! misattributed | unchecked}. No citation re-enters pending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use citegate_common::error::Result;
use citegate_common::types::{FetchStatus, FetchedSource};
use citegate_llm::{call_llm, CallOptions, LlmBackend};
use citegate_source::{BatchOptions, FetchRequest, SourceFetcher, TaskLimiter};

use crate::citations::{extract_citations, extract_claim_sentence, numeric_ref, Citation};
use crate::prompt::{build_verification_prompt, parse_verification_response, VERIFY_SYSTEM_PROMPT};
use crate::verdict::{passes, summarize, AuditResult, CitationAudit, Verdict};

/// Sources with less text than this cannot be meaningfully verified.
const MIN_SOURCE_CONTENT_CHARS: usize = 50;

/// Ceiling on claims packed into one verification call; a large group is
/// split into several calls against the same source.
const MAX_CLAIMS_PER_CALL: usize = 8;

/// One audit request.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    /// Document body, markdown with footnote citations.
    pub body: String,
    /// Footnote ref → claim override, beats automatic extraction.
    pub claim_map: HashMap<String, String>,
    /// Caller-supplied URL → source pre-seed; read-only here.
    pub source_cache: HashMap<String, FetchedSource>,
    /// When false, citations whose URL is not already cached are marked
    /// unchecked instead of fetched.
    pub fetch_missing: bool,
    pub pass_threshold: f64,
    /// Concurrent verification calls.
    pub concurrency: usize,
    /// Sleep after each group's LLM call, not before the first.
    pub delay_ms: u64,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl Default for AuditRequest {
    fn default() -> Self {
        Self {
            body: String::new(),
            claim_map: HashMap::new(),
            source_cache: HashMap::new(),
            fetch_missing: true,
            pass_threshold: 0.8,
            concurrency: 3,
            delay_ms: 300,
            model: None,
            max_tokens: None,
        }
    }
}

impl AuditRequest {
    pub fn for_body(body: impl Into<String>) -> Self {
        Self { body: body.into(), ..Self::default() }
    }
}

struct PendingClaim {
    footnote: String,
    claim: String,
    url: String,
}

pub struct CitationAuditor {
    llm: Arc<dyn LlmBackend>,
    fetcher: SourceFetcher,
}

impl CitationAuditor {
    pub fn new(llm: Arc<dyn LlmBackend>, fetcher: SourceFetcher) -> Self {
        Self { llm, fetcher }
    }

    /// Audit every footnote citation in the request body.
    ///
    /// Dead links, unavailable sources, and unparseable verification
    /// responses become verdicts, never errors; the returned error arm
    /// is the precondition class only.
    #[instrument(skip(self, request))]
    pub async fn audit_citations(&self, request: AuditRequest) -> Result<AuditResult> {
        let citations = extract_citations(&request.body);
        if citations.is_empty() {
            debug!("no citations found");
            return Ok(AuditResult {
                audits: Vec::new(),
                summary: summarize(&[]),
                new_ungrounded_claims: Vec::new(),
                pass: true,
            });
        }
        info!(citations = citations.len(), "auditing citations");

        let sources = self.resolve_sources(&citations, &request).await?;

        // Partition into settled verdicts and LLM-verifiable claims.
        let mut audits: Vec<CitationAudit> = Vec::new();
        let mut verifiable: Vec<PendingClaim> = Vec::new();
        for citation in &citations {
            let claim = self.resolve_claim(citation, &request);
            match sources.get(&citation.url).and_then(Option::as_ref) {
                None => audits.push(settled(
                    citation,
                    claim,
                    Verdict::Unchecked,
                    "source not available",
                )),
                Some(src) if src.status == FetchStatus::Dead => {
                    audits.push(settled(citation, claim, Verdict::UrlDead, "source URL is dead"))
                }
                Some(src) if src.status != FetchStatus::Ok => audits.push(settled(
                    citation,
                    claim,
                    Verdict::Unchecked,
                    &format!("source could not be evaluated ({})", src.status.as_str()),
                )),
                Some(src) if src.content.chars().count() < MIN_SOURCE_CONTENT_CHARS => audits
                    .push(settled(
                        citation,
                        claim,
                        Verdict::Unchecked,
                        "source content too short to verify",
                    )),
                Some(_) => verifiable.push(PendingClaim {
                    footnote: citation.footnote.clone(),
                    claim,
                    url: citation.url.clone(),
                }),
            }
        }

        // Group by shared source URL, then verify under the limiter.
        let groups = group_by_url(verifiable);
        let limiter = TaskLimiter::new(request.concurrency.max(1));
        let request = &request;
        let limiter = &limiter;
        let calls = groups.iter().flat_map(|(url, claims)| {
            let source = sources[url].as_ref().expect("verifiable claims have a source");
            claims
                .chunks(MAX_CLAIMS_PER_CALL)
                .map(move |chunk| self.verify_batch(source, chunk, request, limiter))
        });
        let verified: Vec<Vec<CitationAudit>> = futures_util::future::join_all(calls).await;
        audits.extend(verified.into_iter().flatten());

        // Restore original citation order despite batching.
        audits.sort_by_key(|a| numeric_ref(&a.footnote_ref));

        let summary = summarize(&audits);
        let pass = passes(&summary, request.pass_threshold);
        info!(
            total = summary.total,
            verified = summary.verified,
            failed = summary.failed,
            unchecked = summary.unchecked,
            pass,
            "citation audit complete"
        );

        Ok(AuditResult {
            audits,
            summary,
            new_ungrounded_claims: Vec::new(),
            pass,
        })
    }

    /// Resolve each distinct URL once: pre-seeded cache first, then the
    /// fetcher when allowed. A failed fetch resolves to None.
    async fn resolve_sources(
        &self,
        citations: &[Citation],
        request: &AuditRequest,
    ) -> Result<HashMap<String, Option<FetchedSource>>> {
        let mut sources: HashMap<String, Option<FetchedSource>> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for citation in citations {
            if sources.contains_key(&citation.url) {
                continue;
            }
            match request.source_cache.get(&citation.url) {
                Some(seeded) => {
                    sources.insert(citation.url.clone(), Some(seeded.clone()));
                }
                None if request.fetch_missing => {
                    sources.insert(citation.url.clone(), None);
                    missing.push(citation.url.clone());
                }
                None => {
                    sources.insert(citation.url.clone(), None);
                }
            }
        }

        if !missing.is_empty() {
            let requests: Vec<FetchRequest> =
                missing.iter().map(|url| FetchRequest::for_url(url.as_str())).collect();
            let fetched = self
                .fetcher
                .fetch_sources(&requests, BatchOptions::default())
                .await?;
            for source in fetched {
                sources.insert(source.url.clone(), Some(source));
            }
        }

        Ok(sources)
    }

    /// Claim precedence: explicit override → extracted sentence → raw
    /// context around the marker.
    fn resolve_claim(&self, citation: &Citation, request: &AuditRequest) -> String {
        if let Some(overridden) = request.claim_map.get(&citation.footnote) {
            return overridden.clone();
        }
        extract_claim_sentence(&request.body, &citation.footnote)
            .unwrap_or_else(|| citation.claim_context.clone())
    }

    /// One batched verification call for claims sharing a source.
    async fn verify_batch(
        &self,
        source: &FetchedSource,
        claims: &[PendingClaim],
        request: &AuditRequest,
        limiter: &TaskLimiter,
    ) -> Vec<CitationAudit> {
        let claim_texts: Vec<String> = claims.iter().map(|c| c.claim.clone()).collect();
        let prompt = build_verification_prompt(source, &claim_texts);
        let opts = CallOptions {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            title: Some(format!("verify {} claim(s) against {}", claims.len(), source.url)),
        };

        let parsed = limiter
            .run(async {
                let outcome = call_llm(self.llm.as_ref(), VERIFY_SYSTEM_PROMPT, &prompt, opts).await;
                if request.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
                }
                match outcome {
                    Ok(raw) => parse_verification_response(&raw, claims.len()),
                    Err(e) => {
                        warn!(url = %source.url, error = %e, "verification call failed");
                        vec![
                            crate::prompt::ParsedVerdict::unchecked("verification call failed");
                            claims.len()
                        ]
                    }
                }
            })
            .await;

        claims
            .iter()
            .zip(parsed)
            .map(|(claim, entry)| CitationAudit {
                footnote_ref: claim.footnote.clone(),
                claim: claim.claim.clone(),
                source_url: claim.url.clone(),
                verdict: entry.verdict,
                relevant_quote: entry.relevant_quote,
                explanation: entry.explanation,
            })
            .collect()
    }
}

fn settled(
    citation: &Citation,
    claim: String,
    verdict: Verdict,
    explanation: &str,
) -> CitationAudit {
    CitationAudit {
        footnote_ref: citation.footnote.clone(),
        claim,
        source_url: citation.url.clone(),
        verdict,
        relevant_quote: None,
        explanation: Some(explanation.to_string()),
    }
}

/// Group claims by source URL, preserving first-appearance order.
fn group_by_url(claims: Vec<PendingClaim>) -> Vec<(String, Vec<PendingClaim>)> {
    let mut groups: Vec<(String, Vec<PendingClaim>)> = Vec::new();
    for claim in claims {
        match groups.iter_mut().find(|(url, _)| *url == claim.url) {
            Some((_, members)) => members.push(claim),
            None => groups.push((claim.url.clone(), vec![claim])),
        }
    }
    groups
}
