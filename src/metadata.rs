//! Canonical per-turn metadata.
//!
//! Every assistant message carries a complete, normalized metadata object so
//! downstream consumers never branch on missing keys. [`TurnMetadata`] is the
//! typed shape the engine assembles; [`normalize`] coerces arbitrary stored
//! JSON into the same vocabulary; [`deep_merge`] is the write primitive for
//! conversation-level patches.

use crate::gates::{BooksGateReason, CadenceReason};
use crate::plan::{Phase, Topic};
use crate::resources::Attribution;
use serde_json::{json, Map, Value};

pub const STYLE_GUIDE: &str = "friend_v1";
pub const FAITH_BRANCH: &str = "unknown_path";

/// Canonical key set, in the order the original vocabulary fixes.
pub const CANONICAL_KEYS: [&str; 22] = [
    "phase",
    "advice_intent",
    "safety_flag_this_turn",
    "gate_reason",
    "book_selection_reason",
    "book_attributions",
    "scrubbed_books",
    "asked_question",
    "rooted_in_jesus_emphasis",
    "jesus_invite_variant",
    "style_guide",
    "faith_branch",
    "topic",
    "topic_confidence",
    "used_book_insights",
    "path",
    "allow_books",
    "allow_jesus",
    "cadence_reason",
    "planner_retries",
    "fallback_reason",
    "declined_jesus_until_turn",
];

/// The fully assembled metadata for one assistant turn.
#[derive(Debug, Clone)]
pub struct TurnMetadata {
    pub phase: Phase,
    pub advice_intent: bool,
    pub safety_flag_this_turn: bool,
    pub gate_reason: BooksGateReason,
    pub book_selection_reason: String,
    pub book_attributions: Vec<Attribution>,
    pub scrubbed_books: Vec<String>,
    pub asked_question: bool,
    pub rooted_in_jesus_emphasis: bool,
    pub jesus_invite_variant: u32,
    pub topic: Topic,
    pub topic_confidence: f64,
    pub used_book_insights: bool,
    pub path: String,
    pub allow_books: bool,
    pub allow_jesus: bool,
    pub cadence_reason: CadenceReason,
    pub planner_retries: u32,
    pub fallback_reason: Option<String>,
    pub declined_jesus_until_turn: Option<u32>,
    /// Message-level flag the cadence memory reads back next turn.
    pub had_jesus_invite: bool,
}

impl TurnMetadata {
    /// Serialize to the canonical JSON object. Every canonical key is
    /// present; `had_jesus_invite` rides along as a message-level extra.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "phase": self.phase,
            "advice_intent": self.advice_intent,
            "safety_flag_this_turn": self.safety_flag_this_turn,
            "gate_reason": self.gate_reason,
            "book_selection_reason": self.book_selection_reason,
            "book_attributions": self.book_attributions,
            "scrubbed_books": self.scrubbed_books,
            "asked_question": self.asked_question,
            "rooted_in_jesus_emphasis": self.rooted_in_jesus_emphasis,
            "jesus_invite_variant": self.jesus_invite_variant,
            "style_guide": STYLE_GUIDE,
            "faith_branch": FAITH_BRANCH,
            "topic": self.topic,
            "topic_confidence": self.topic_confidence,
            "used_book_insights": self.used_book_insights,
            "path": self.path,
            "allow_books": self.allow_books,
            "allow_jesus": self.allow_jesus,
            "cadence_reason": self.cadence_reason,
            "planner_retries": self.planner_retries,
            "fallback_reason": self.fallback_reason,
            "declined_jesus_until_turn": self.declined_jesus_until_turn,
            "had_jesus_invite": self.had_jesus_invite,
        })
    }
}

fn default_for(key: &str) -> Value {
    match key {
        "phase" => json!("intake"),
        "gate_reason" => json!("ok"),
        "book_selection_reason" => json!("gated or none"),
        "book_attributions" | "scrubbed_books" => json!([]),
        "asked_question" => json!(true),
        "jesus_invite_variant" | "planner_retries" => json!(0),
        "style_guide" => json!(STYLE_GUIDE),
        "faith_branch" => json!(FAITH_BRANCH),
        "topic" => json!("other"),
        "topic_confidence" => json!(0.0),
        "path" => json!("chat"),
        "cadence_reason" => json!("ok"),
        "fallback_reason" | "declined_jesus_until_turn" => Value::Null,
        // advice_intent, safety_flag_this_turn, rooted_in_jesus_emphasis,
        // used_book_insights, allow_books, allow_jesus
        _ => json!(false),
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => {
            s.parse().ok()
        }
        _ => None,
    }
}

/// Coerce arbitrary stored metadata into the canonical vocabulary.
///
/// Missing keys get defaults, numeric fields accept numeric strings, and
/// unknown keys survive untouched.
#[must_use]
pub fn normalize(meta: &Value) -> Value {
    let mut out = meta.as_object().cloned().unwrap_or_default();
    for key in CANONICAL_KEYS {
        let entry = out.entry(key.to_string()).or_insert_with(|| default_for(key));
        match key {
            "topic_confidence" => {
                *entry = json!(coerce_f64(entry).unwrap_or(0.0).clamp(0.0, 1.0));
            }
            "planner_retries" | "jesus_invite_variant" => {
                *entry = json!(coerce_u64(entry).unwrap_or(0));
            }
            "declined_jesus_until_turn" => {
                *entry = coerce_u64(entry).map_or(Value::Null, |n| json!(n));
            }
            _ => {}
        }
    }
    Value::Object(out)
}

/// Recursively merge `patch` into `base`. Objects merge key by key; every
/// other value type replaces. Null in the patch overwrites.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, patch_value) => *base_slot = patch_value,
    }
}

/// Empty object helper for stores initializing a conversation.
#[must_use]
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}
