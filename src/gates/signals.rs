//! Decline/consent signal extraction from free user text.
//!
//! The phrase lists here are tuning detail, deliberately isolated behind a
//! stable trait so wording can evolve without touching the gating logic.

use regex::Regex;
use std::sync::LazyLock;

/// Consent extracted from one user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentSignal {
    /// Nothing detected; prior knowledge stands.
    Unknown,
    /// The user invited prayer or faith engagement.
    Granted,
    /// The user explicitly asked to keep faith content out.
    Declined,
}

pub trait SignalExtractor: Send + Sync {
    /// Whether this message brushes off or ignores a pending faith invite.
    fn detect_decline(&self, text: &str) -> bool;

    /// Prayer-consent signal carried by this message, if any.
    fn detect_consent(&self, text: &str) -> ConsentSignal;
}

static CONSENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bplease\s+pray\b",
        r"\bpray\s+for\s+me\b",
        r"\bpray\s+for\s+us\b",
        r"\byes\b.*\bforward\b.*\bprayer\b",
        r"\byou\s+can\s+forward\b.*\bprayer\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static consent pattern"))
    .collect()
});

static REFUSAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bdon'?t\s+pray\b",
        r"\bno\s+prayer\b",
        r"\bkeep\s+(?:faith|religion|god|jesus)\s+out\b",
        r"\bstop\s+(?:asking|bringing)\b.*\b(?:jesus|god|faith|pray)",
        r"\bnot\s+religious\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static refusal pattern"))
    .collect()
});

static DECLINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bno\s+thanks?\b",
        r"\bnot\s+interested\b",
        r"\brather\s+not\b",
        r"\bplease\s+stop\b",
        r"\bnot\s+right\s+now\b",
        r"\bskip\s+that\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static decline pattern"))
    .collect()
});

/// Default keyword/regex extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSignalExtractor;

impl KeywordSignalExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SignalExtractor for KeywordSignalExtractor {
    fn detect_decline(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        DECLINE_PATTERNS.iter().any(|p| p.is_match(&lowered))
            || REFUSAL_PATTERNS.iter().any(|p| p.is_match(&lowered))
    }

    fn detect_consent(&self, text: &str) -> ConsentSignal {
        let lowered = text.to_lowercase();
        if REFUSAL_PATTERNS.iter().any(|p| p.is_match(&lowered)) {
            return ConsentSignal::Declined;
        }
        if CONSENT_PATTERNS.iter().any(|p| p.is_match(&lowered)) {
            return ConsentSignal::Granted;
        }
        ConsentSignal::Unknown
    }
}
