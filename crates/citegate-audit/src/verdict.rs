//! Verdict taxonomy and audit result types.
//!
//! The verdict set is closed. `Unchecked` is the universal "could not
//! determine" fallback and is deliberately distinct from `Unsupported`:
//! an infrastructure failure must never read as a substantive negative
//! finding against a citation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Verified,
    Unsupported,
    Misattributed,
    UrlDead,
    Unchecked,
}

impl Verdict {
    /// Map a raw string to a verdict; anything unrecognized is `Unchecked`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "verified"      => Verdict::Verified,
            "unsupported"   => Verdict::Unsupported,
            "misattributed" => Verdict::Misattributed,
            "url-dead"      => Verdict::UrlDead,
            "unchecked"     => Verdict::Unchecked,
            _               => Verdict::Unchecked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Verified      => "verified",
            Verdict::Unsupported   => "unsupported",
            Verdict::Misattributed => "misattributed",
            Verdict::UrlDead       => "url-dead",
            Verdict::Unchecked     => "unchecked",
        }
    }
}

/// One verdict per citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationAudit {
    pub footnote_ref: String,
    pub claim: String,
    pub source_url: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_quote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Aggregate counts. `failed` is the disjoint union of unsupported and
/// misattributed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub verified: usize,
    pub failed: usize,
    pub misattributed: usize,
    pub unchecked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    /// In original citation order, regardless of internal batching.
    pub audits: Vec<CitationAudit>,
    pub summary: AuditSummary,
    /// Deliberate stub: ungrounded-claim detection is out of scope.
    pub new_ungrounded_claims: Vec<String>,
    pub pass: bool,
}

pub fn summarize(audits: &[CitationAudit]) -> AuditSummary {
    let mut summary = AuditSummary { total: audits.len(), ..AuditSummary::default() };
    for audit in audits {
        match audit.verdict {
            Verdict::Verified => summary.verified += 1,
            Verdict::Unsupported => summary.failed += 1,
            Verdict::Misattributed => {
                summary.failed += 1;
                summary.misattributed += 1;
            }
            Verdict::UrlDead | Verdict::Unchecked => summary.unchecked += 1,
        }
    }
    summary
}

/// The gate. A misattributed source actively contradicts its claim and
/// hard-fails regardless of threshold; otherwise pass when there was
/// nothing checkable or the verified ratio clears the threshold.
pub fn passes(summary: &AuditSummary, threshold: f64) -> bool {
    if summary.misattributed > 0 {
        return false;
    }
    let checkable = summary.verified + summary.failed;
    if checkable == 0 {
        return true;
    }
    (summary.verified as f64 / checkable as f64) >= threshold
}
