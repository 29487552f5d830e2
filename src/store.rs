//! Conversation persistence.
//!
//! The engine is storage-agnostic: it reads conversation metadata and recent
//! history at the start of a turn and writes messages plus a metadata patch
//! at the end. [`InMemoryStore`] is the bundled backend, suitable for tests
//! and single-process deployments.

use crate::error::StoreError;
use crate::metadata::{deep_merge, empty_object};
use crate::providers::MessageRole;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

pub trait ConversationStore: Send + Sync {
    /// Create a new conversation and return its id.
    fn create_conversation<'a>(&'a self) -> StoreFuture<'a, String>;

    /// Current conversation-level metadata.
    fn get_metadata<'a>(&'a self, conversation_id: &'a str) -> StoreFuture<'a, Value>;

    /// Deep-merge a patch into the conversation-level metadata.
    fn merge_metadata<'a>(
        &'a self,
        conversation_id: &'a str,
        patch: Value,
    ) -> StoreFuture<'a, ()>;

    /// Append one message; returns the stored message id.
    fn append_message<'a>(
        &'a self,
        conversation_id: &'a str,
        role: MessageRole,
        content: &'a str,
        metadata: Value,
    ) -> StoreFuture<'a, String>;

    /// Persist one finished turn atomically: the user message, the
    /// assistant reply with its metadata, and the conversation-level patch
    /// (deep-merged). Either everything lands or nothing does.
    fn commit_turn<'a>(
        &'a self,
        conversation_id: &'a str,
        user_content: &'a str,
        assistant_content: &'a str,
        assistant_metadata: Value,
        patch: Value,
    ) -> StoreFuture<'a, ()>;

    /// The most recent messages, oldest first, capped at `max_pairs`
    /// user/assistant exchanges.
    fn list_recent_turns<'a>(
        &'a self,
        conversation_id: &'a str,
        max_pairs: usize,
    ) -> StoreFuture<'a, Vec<StoredMessage>>;
}

#[derive(Debug, Default)]
struct ConversationRecord {
    metadata: Value,
    messages: Vec<StoredMessage>,
}

/// Hash-map backend behind one async mutex.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: Mutex<HashMap<String, ConversationRecord>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryStore {
    fn create_conversation<'a>(&'a self) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let id = Uuid::new_v4().to_string();
            let mut guard = self.conversations.lock().await;
            guard.insert(
                id.clone(),
                ConversationRecord {
                    metadata: empty_object(),
                    messages: Vec::new(),
                },
            );
            Ok(id)
        })
    }

    fn get_metadata<'a>(&'a self, conversation_id: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            let guard = self.conversations.lock().await;
            guard
                .get(conversation_id)
                .map(|record| record.metadata.clone())
                .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))
        })
    }

    fn merge_metadata<'a>(
        &'a self,
        conversation_id: &'a str,
        patch: Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.conversations.lock().await;
            let record = guard
                .get_mut(conversation_id)
                .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
            deep_merge(&mut record.metadata, patch);
            Ok(())
        })
    }

    fn append_message<'a>(
        &'a self,
        conversation_id: &'a str,
        role: MessageRole,
        content: &'a str,
        metadata: Value,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let mut guard = self.conversations.lock().await;
            let record = guard
                .get_mut(conversation_id)
                .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
            let id = Uuid::new_v4().to_string();
            record.messages.push(StoredMessage {
                id: id.clone(),
                role,
                content: content.to_string(),
                metadata,
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    fn commit_turn<'a>(
        &'a self,
        conversation_id: &'a str,
        user_content: &'a str,
        assistant_content: &'a str,
        assistant_metadata: Value,
        patch: Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            // One lock acquisition covers all three writes.
            let mut guard = self.conversations.lock().await;
            let record = guard
                .get_mut(conversation_id)
                .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
            let now = Utc::now();
            record.messages.push(StoredMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::User,
                content: user_content.to_string(),
                metadata: empty_object(),
                created_at: now,
            });
            record.messages.push(StoredMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::Assistant,
                content: assistant_content.to_string(),
                metadata: assistant_metadata,
                created_at: now,
            });
            deep_merge(&mut record.metadata, patch);
            Ok(())
        })
    }

    fn list_recent_turns<'a>(
        &'a self,
        conversation_id: &'a str,
        max_pairs: usize,
    ) -> StoreFuture<'a, Vec<StoredMessage>> {
        Box::pin(async move {
            let guard = self.conversations.lock().await;
            let record = guard
                .get(conversation_id)
                .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
            let cap = max_pairs.saturating_mul(2);
            let start = record.messages.len().saturating_sub(cap);
            Ok(record.messages[start..].to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn metadata_starts_empty_and_merges_deeply() {
        let store = InMemoryStore::new();
        let id = store.create_conversation().await.unwrap();
        assert_eq!(store.get_metadata(&id).await.unwrap(), json!({}));

        store
            .merge_metadata(&id, json!({"intake": {"issue_named": true}, "turns": 1}))
            .await
            .unwrap();
        store
            .merge_metadata(&id, json!({"intake": {"goal_captured": true}, "turns": 2}))
            .await
            .unwrap();

        let meta = store.get_metadata(&id).await.unwrap();
        assert_eq!(meta["turns"], json!(2));
        assert_eq!(meta["intake"]["issue_named"], json!(true));
        assert_eq!(meta["intake"]["goal_captured"], json!(true));
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get_metadata("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn commit_turn_lands_messages_and_patch_together() {
        let store = InMemoryStore::new();
        let id = store.create_conversation().await.unwrap();

        store
            .commit_turn(
                &id,
                "we argue daily",
                "a reply",
                json!({"path": "orchestrated"}),
                json!({"turns": 1, "last_turn_had_jesus": false}),
            )
            .await
            .unwrap();

        let messages = store.list_recent_turns(&id, 8).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].metadata["path"], json!("orchestrated"));

        let meta = store.get_metadata(&id).await.unwrap();
        assert_eq!(meta["turns"], json!(1));
    }

    #[tokio::test]
    async fn commit_to_unknown_conversation_persists_nothing() {
        let store = InMemoryStore::new();
        let err = store
            .commit_turn("nope", "u", "a", json!({}), json!({"turns": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn recent_turns_are_capped_and_ordered() {
        let store = InMemoryStore::new();
        let id = store.create_conversation().await.unwrap();
        for i in 0..5 {
            store
                .append_message(&id, MessageRole::User, &format!("u{i}"), json!({}))
                .await
                .unwrap();
            store
                .append_message(&id, MessageRole::Assistant, &format!("a{i}"), json!({}))
                .await
                .unwrap();
        }

        let recent = store.list_recent_turns(&id, 2).await.unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].content, "u3");
        assert_eq!(recent[3].content, "a4");
    }
}
