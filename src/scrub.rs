//! Resource-mention scrubbing for gated turns.
//!
//! When explicit attributions are not allowed, any book title, author name,
//! URL, or quoted resource the model leaked is replaced with a placeholder
//! and recorded. The placeholder itself never reaches the user: [`finalize`]
//! strips it and repairs the surrounding whitespace as a last step before
//! the reply leaves the engine.

use crate::resources::ResourceLibrary;
use regex::Regex;
use std::sync::LazyLock;

pub const PLACEHOLDER: &str = "[resource removed]";

const MAX_SCRUB_TOKEN_CHARS: usize = 120;

static GENERIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"https?://\S+",
        r#"[“”"]([^“”"]{2,})[“”"]"#,
        r"\b(?:book|devotional|study|workbook|resource|curriculum)\b\s+(?:called|named|titled)\s+\S+(?:\s+\S+){0,5}",
        r"\bby\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,3}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static scrub pattern"))
    .collect()
});

static PLACEHOLDER_CLEANUP: LazyLock<Vec<(Regex, &str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\[resource removed\]").expect("static pattern"),
            "",
        ),
        (Regex::new(r"[ \t]{2,}").expect("static pattern"), " "),
        (Regex::new(r" +([,.!?;:])").expect("static pattern"), "$1"),
        (Regex::new(r"\n{3,}").expect("static pattern"), "\n\n"),
    ]
});

/// Replaces leaked resource mentions with [`PLACEHOLDER`] and collects what
/// was removed. Built per-library so known titles and authors are matched
/// exactly, case-insensitively.
pub struct ResourceScrubber {
    known: Vec<Regex>,
}

impl ResourceScrubber {
    #[must_use]
    pub fn new(library: &ResourceLibrary) -> Self {
        let mut known = Vec::new();
        let titles: Vec<&str> = library.titles();
        let authors: Vec<&str> = library.authors();
        for group in [titles, authors] {
            if group.is_empty() {
                continue;
            }
            let alternation = group
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            if let Ok(re) = Regex::new(&format!("(?i)\\b(?:{alternation})\\b")) {
                known.push(re);
            }
        }
        Self { known }
    }

    /// Scrub `text` unless attributions are allowed this turn. Returns the
    /// scrubbed text plus the distinct snippets that were removed.
    #[must_use]
    pub fn scrub(&self, text: &str, allow: bool) -> (String, Vec<String>) {
        if allow {
            return (text.to_string(), Vec::new());
        }

        let mut removed: Vec<String> = Vec::new();
        let mut out = text.to_string();
        for pattern in self.known.iter().chain(GENERIC_PATTERNS.iter()) {
            for found in pattern.find_iter(&out) {
                let snippet: String = found
                    .as_str()
                    .trim()
                    .trim_matches(['"', '\u{201C}', '\u{201D}'])
                    .chars()
                    .take(MAX_SCRUB_TOKEN_CHARS)
                    .collect();
                if !snippet.is_empty() && !removed.contains(&snippet) {
                    removed.push(snippet);
                }
            }
            out = pattern.replace_all(&out, PLACEHOLDER).into_owned();
        }

        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "scrubbed resource mentions");
        }
        (out, removed)
    }
}

/// Final output pass: drop every placeholder and tidy the whitespace the
/// removals left behind. Line structure is preserved.
#[must_use]
pub fn finalize(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, replacement) in PLACEHOLDER_CLEANUP.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    out.trim().to_string()
}
