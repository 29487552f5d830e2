//! Persisted turn driver.
//!
//! [`TurnSession`] is the read-modify-write loop around the pure pipeline:
//! load conversation state, fold in the user's consent/decline signals, run
//! the orchestrator, then persist both messages and the state patch in one
//! store commit. A failed turn persists nothing and can simply be retried.

use super::{Orchestrator, TurnOutput};
use crate::cadence::CadenceMemory;
use crate::config::PolicySettings;
use crate::error::Result;
use crate::gates::KeywordSignalExtractor;
use crate::intake::IntakeState;
use crate::metadata::{deep_merge, normalize};
use crate::orchestrator::TurnState;
use crate::providers::{ChatMessage, MessageRole};
use crate::store::ConversationStore;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct TurnSession {
    store: Arc<dyn ConversationStore>,
    orchestrator: Orchestrator,
    signals: KeywordSignalExtractor,
    settings: PolicySettings,
}

impl TurnSession {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        orchestrator: Orchestrator,
        settings: PolicySettings,
    ) -> Self {
        Self {
            store,
            orchestrator,
            signals: KeywordSignalExtractor::new(),
            settings,
        }
    }

    /// Run one full turn against a stored conversation.
    pub async fn run_turn(&self, conversation_id: &str, user_message: &str) -> Result<TurnOutput> {
        let meta = self.store.get_metadata(conversation_id).await?;

        let turn_index = read_u32(&meta, "turns");
        let last_turn_had_invite = meta
            .get("last_turn_had_jesus")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut cadence = CadenceMemory::from_metadata(&meta);
        let mut intake = IntakeState::from_metadata(&meta);

        cadence.observe_user_turn(
            &self.signals,
            user_message,
            last_turn_had_invite,
            turn_index,
            &self.settings,
        );
        if cadence.prayer_consent.is_some() {
            intake.prayer_consent_known = true;
        }

        let recent = self
            .store
            .list_recent_turns(conversation_id, self.settings.history_max_pairs)
            .await?;
        let prior_book_keys = recent
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| attribution_keys(&m.metadata))
            .unwrap_or_default();
        let mut history: Vec<ChatMessage> = recent
            .into_iter()
            .map(|m| match m.role {
                MessageRole::System => ChatMessage::system(&m.content),
                MessageRole::User => ChatMessage::user(&m.content),
                MessageRole::Assistant => ChatMessage::assistant(&m.content),
            })
            .collect();
        history.push(ChatMessage::user(user_message));

        let state = TurnState {
            conversation_id: conversation_id.to_string(),
            turn_index,
            intake_completed: intake.is_complete(),
            last_turn_had_invite,
            prior_book_keys,
            user_message: user_message.to_string(),
            history_for_model: history,
            last_invite_turn: cadence.last_invite_turn,
            cooldown_until_turn: cadence.cooldown_until_turn,
            prayer_consent: cadence.prayer_consent,
        };

        // Pipeline failure leaves the conversation untouched.
        let output = self.orchestrator.run(&state).await?;

        if output.metadata.had_jesus_invite {
            cadence.record_invite(turn_index);
        }

        let mut patch = json!({
            "turns": turn_index + 1,
            "last_turn_had_jesus": output.metadata.had_jesus_invite,
        });
        deep_merge(&mut patch, cadence.to_metadata());
        deep_merge(&mut patch, intake.to_metadata());

        // Both messages and the state patch land in one store transaction.
        self.store
            .commit_turn(
                conversation_id,
                user_message,
                &output.content,
                normalize(&output.metadata.to_value()),
                patch,
            )
            .await?;

        Ok(output)
    }
}

fn read_u32(meta: &Value, key: &str) -> u32 {
    meta.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn attribution_keys(meta: &Value) -> Vec<String> {
    meta.get("book_attributions")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("key").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
