//! Conversation-scoped faith-invite memory.
//!
//! Initialized empty at conversation creation, read at the start of every
//! turn, updated from the user's decline/consent signals and from whether an
//! invite was issued, then written back with the turn's other metadata.

use crate::config::PolicySettings;
use crate::gates::{ConsentSignal, SignalExtractor};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CadenceMemory {
    /// Last assistant turn index at which an invite was issued.
    pub last_invite_turn: Option<u32>,
    /// Consecutive declines/ignores since the last engagement.
    pub decline_count: u32,
    /// Invites are suppressed before this assistant turn index.
    pub cooldown_until_turn: Option<u32>,
    /// Prayer consent: `None` until the user has said either way.
    pub prayer_consent: Option<bool>,
}

impl CadenceMemory {
    #[must_use]
    pub fn from_metadata(meta: &Value) -> Self {
        let as_u32 = |key: &str| {
            meta.get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };
        let prayer_consent = match meta.get("prayer_consent_known").and_then(Value::as_bool) {
            Some(true) => meta.get("prayer_consent").and_then(Value::as_bool),
            _ => None,
        };
        Self {
            last_invite_turn: as_u32("last_jesus_invite_turn"),
            decline_count: as_u32("jesus_decline_count").unwrap_or(0),
            cooldown_until_turn: as_u32("declined_jesus_until_turn"),
            prayer_consent,
        }
    }

    /// Metadata patch for deep-merge writes. Keys are flat, matching the
    /// canonical metadata vocabulary.
    #[must_use]
    pub fn to_metadata(&self) -> Value {
        json!({
            "last_jesus_invite_turn": self.last_invite_turn,
            "jesus_decline_count": self.decline_count,
            "declined_jesus_until_turn": self.cooldown_until_turn,
            "prayer_consent_known": self.prayer_consent.is_some(),
            "prayer_consent": self.prayer_consent.unwrap_or(false),
        })
    }

    /// Record that an invite was issued on `turn`.
    pub fn record_invite(&mut self, turn: u32) {
        self.last_invite_turn = Some(turn);
    }

    /// Fold one user message into the memory before the assistant replies.
    ///
    /// `turn_index` is the index of the assistant turn about to be produced.
    /// A decline only counts against the invite cadence when the previous
    /// assistant turn actually contained an invite; after
    /// `decline_threshold` declines a cooldown of `decline_cooldown_turns`
    /// starts and the counter resets.
    pub fn observe_user_turn(
        &mut self,
        signals: &dyn SignalExtractor,
        text: &str,
        last_turn_had_invite: bool,
        turn_index: u32,
        settings: &PolicySettings,
    ) {
        match signals.detect_consent(text) {
            ConsentSignal::Granted => {
                self.prayer_consent = Some(true);
                self.decline_count = 0;
            }
            ConsentSignal::Declined => {
                self.prayer_consent = Some(false);
            }
            ConsentSignal::Unknown => {}
        }

        if last_turn_had_invite && signals.detect_decline(text) {
            self.decline_count += 1;
            if self.decline_count >= settings.decline_threshold {
                self.cooldown_until_turn = Some(turn_index + settings.decline_cooldown_turns);
                self.decline_count = 0;
                tracing::info!(
                    until = turn_index + settings.decline_cooldown_turns,
                    "invite cooldown started after repeated declines"
                );
            }
        }
    }
}
