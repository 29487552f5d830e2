//! Curated resource reference data.
//!
//! Loaded once from a JSON document and injected by construction; an empty
//! library is a valid degraded state, not an error. The library serves two
//! distinct needs: explicit attributions (gated per turn) and paraphrased,
//! attribution-free insight clauses (always available).

use crate::error::ResourceError;
use crate::plan::Topic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MIN_CLAUSE_CHARS: usize = 20;
const MAX_CLAUSE_CHARS: usize = 180;

/// Verb prefixes marking a clause as short and actionable.
const ACTIONABLE_PREFIXES: [&str; 20] = [
    "live", "pursue", "let ", "serve", "commit", "make ", "pray", "remove", "agree", "speak",
    "listen", "guard", "schedule", "confess", "forgive", "replace", "set ", "share", "use ",
    "avoid",
];

/// An explicit, named attribution revealed only when books are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub key: String,
    pub pretty: String,
    pub author: String,
    #[serde(default)]
    pub section: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BookRecord {
    key: String,
    #[serde(alias = "title")]
    pretty: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    section: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BookSource {
    #[serde(default)]
    key_principles: Vec<String>,
    #[serde(default)]
    practical_patterns: Vec<String>,
    #[serde(default)]
    principles: Vec<String>,
    #[serde(default)]
    core_convictions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LibraryDocument {
    #[serde(default)]
    books: Vec<BookRecord>,
    #[serde(default)]
    book_sources: HashMap<String, BookSource>,
}

/// Static reference data: curated titles/authors plus paraphrased clauses.
#[derive(Debug, Clone, Default)]
pub struct ResourceLibrary {
    books: Vec<BookRecord>,
    sources: HashMap<String, BookSource>,
}

impl ResourceLibrary {
    /// The valid degraded state: nothing to attribute, nothing to scrub by name.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ResourceError> {
        let doc: LibraryDocument =
            serde_json::from_str(raw).map_err(|e| ResourceError::Parse(e.to_string()))?;
        Ok(Self {
            books: doc.books,
            sources: doc.book_sources,
        })
    }

    /// Known curated titles, for the scrubber's redaction list.
    #[must_use]
    pub fn titles(&self) -> Vec<&str> {
        self.books
            .iter()
            .map(|b| b.pretty.as_str())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Known curated authors, for the scrubber's redaction list.
    #[must_use]
    pub fn authors(&self) -> Vec<&str> {
        self.books
            .iter()
            .map(|b| b.author.as_str())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Explicit attributions for a topic. Books tagged with the topic match;
    /// untagged books match every topic.
    #[must_use]
    pub fn attributions(&self, topic: Topic) -> Vec<Attribution> {
        let label = topic.to_string();
        self.books
            .iter()
            .filter(|b| b.topics.is_empty() || b.topics.iter().any(|t| t == &label))
            .map(|b| Attribution {
                key: b.key.clone(),
                pretty: b.pretty.clone(),
                author: b.author.clone(),
                section: b.section.clone().unwrap_or_else(|| "overview".to_string()),
            })
            .collect()
    }

    /// Up to `limit` short, actionable, attribution-free clauses.
    ///
    /// Clauses come from every vetted source; the topic parameter is kept
    /// for future per-topic curation but does not filter today.
    #[must_use]
    pub fn insight_clauses(&self, _topic: Topic, limit: usize) -> Vec<String> {
        let mut seen = Vec::new();
        for source in self.sources.values() {
            let fields = [
                &source.key_principles,
                &source.practical_patterns,
                &source.principles,
                &source.core_convictions,
            ];
            for field in fields {
                for clause in field {
                    let cleaned = clause.trim().trim_matches(['"', '\u{201C}', '\u{201D}']);
                    if !(MIN_CLAUSE_CHARS..=MAX_CLAUSE_CHARS).contains(&cleaned.len()) {
                        continue;
                    }
                    let lowered = cleaned.to_lowercase();
                    if !ACTIONABLE_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
                        continue;
                    }
                    if seen.iter().any(|s| s == cleaned) {
                        continue;
                    }
                    seen.push(cleaned.to_string());
                    if seen.len() >= limit {
                        return seen;
                    }
                }
            }
        }
        seen
    }
}
