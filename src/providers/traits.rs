use super::types::ChatMessage;
use std::future::Future;
use std::pin::Pin;

/// The external structured-completion service, treated as a black box.
///
/// Given an ordered message list, returns the raw text of a single JSON-mode
/// completion or fails with a transport error. The provider performs no
/// retries and no validation; all retry/repair logic belongs to callers.
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier (e.g. "openai").
    fn name(&self) -> &str;

    /// Request one completion constrained to a single JSON object.
    fn complete_json<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}
