//! Lightweight topic classification for a single user message.
//!
//! Classification is strictly best-effort: any transport or parse failure is
//! returned as an error, and callers are expected to swallow it and proceed
//! without a classifier opinion. There is no retry here.

use crate::config::PolicySettings;
use crate::error::ClassifierError;
use crate::plan::Topic;
use crate::planner::extract_json;
use crate::providers::{ChatMessage, CompletionProvider};
use std::sync::Arc;

const CLASSIFIER_SYSTEM: &str = "\
You are a topic classifier for Christian marriage conversations.
Return ONLY one JSON object with:
- topic: one of [conflict, betrayal, porn, intimacy, finances, parenting, boundaries, other]
- confidence: float from 0.0 to 1.0 representing how confident you are about the topic label.
No markdown, no extra text.";

/// A coerced topic opinion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub topic: Topic,
    /// Clamped to `[0.0, 1.0]`; `0.0` when the model omitted or mangled it.
    pub confidence: f64,
}

pub struct Classifier {
    provider: Arc<dyn CompletionProvider>,
    temperature: f64,
}

impl Classifier {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: &PolicySettings) -> Self {
        Self {
            provider,
            temperature: settings.classifier_temperature,
        }
    }

    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let messages = vec![
            ChatMessage::system(CLASSIFIER_SYSTEM),
            ChatMessage::user(text),
        ];

        let raw = self
            .provider
            .complete_json(&messages, self.temperature)
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        if raw.trim().is_empty() {
            return Err(ClassifierError::EmptyContent);
        }

        let value: serde_json::Value = serde_json::from_str(extract_json(&raw))
            .map_err(|e| ClassifierError::InvalidJson(e.to_string()))?;

        Ok(coerce(&value))
    }
}

/// Coercion rules: lowercase topic with unknowns mapped to `other`;
/// confidence accepted as number or numeric string, defaulting to 0.0 and
/// clamped to `[0.0, 1.0]`.
fn coerce(value: &serde_json::Value) -> Classification {
    let topic = value
        .get("topic")
        .and_then(serde_json::Value::as_str)
        .map_or(Topic::Other, Topic::parse_lenient);

    let confidence = match value.get("confidence") {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    Classification {
        topic,
        confidence: confidence.clamp(0.0, 1.0),
    }
}
