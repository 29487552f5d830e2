//! Keyword-based pre/post moderation.
//!
//! Intentionally crude and conservative: false positives are acceptable,
//! false negatives are the primary risk to avoid.

/// Outcome of a pre-moderation scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub flag: bool,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    #[must_use]
    pub fn clear() -> Self {
        Self {
            flag: false,
            reason: None,
        }
    }
}

/// High-risk keyword categories: self-harm, violence, abuse terms.
const RED_FLAG_TERMS: [&str; 7] = [
    "suicide", "kill", "abuse", "violence", "child", "assault", "threat",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyGuard;

impl SafetyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Scan raw user text for high-risk keywords. Any match flags the turn
    /// with reason `"keyword"`.
    #[must_use]
    pub fn pre_moderate(&self, text: &str) -> SafetyVerdict {
        let lowered = text.to_lowercase();
        if RED_FLAG_TERMS.iter().any(|t| lowered.contains(t)) {
            return SafetyVerdict {
                flag: true,
                reason: Some("keyword".to_string()),
            };
        }
        SafetyVerdict::clear()
    }

    /// Post-moderation pass over composed output.
    ///
    /// Currently an identity pass. The contract for future revisions: text
    /// may only be altered when a moderation concern is found, and content
    /// must never be removed silently without annotating metadata.
    #[must_use]
    pub fn post_moderate(&self, text: String) -> String {
        text
    }
}
