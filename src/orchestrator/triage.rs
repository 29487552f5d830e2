//! Safety triage response.
//!
//! A flagged pre-scan bypasses classification, planning and both gates. The
//! reply is a fixed compassionate script and the metadata disables books and
//! invites for the turn.

use super::TurnOutput;
use crate::gates::{BooksGateReason, CadenceReason};
use crate::metadata::TurnMetadata;
use crate::plan::{Phase, Topic};
use crate::safety::SafetyVerdict;

/// Build the triage reply for a flagged user message.
#[must_use]
pub fn triage_route(user_message: &str, verdict: &SafetyVerdict) -> TurnOutput {
    tracing::warn!(
        reason = verdict.reason.as_deref().unwrap_or(""),
        chars = user_message.chars().count(),
        "routing turn to safety triage"
    );

    let content = [
        "Thank you for sharing this. I'm really sorry you're facing this. Your safety matters.",
        "If you're in immediate danger, please contact local emergency services right away.",
        "If you can, would you share what city/region you're in so a human can help route local support?",
    ]
    .join("\n");

    let metadata = TurnMetadata {
        phase: Phase::Intake,
        advice_intent: false,
        safety_flag_this_turn: true,
        gate_reason: BooksGateReason::SafetyTriage,
        book_selection_reason: "gated or none".to_string(),
        book_attributions: Vec::new(),
        scrubbed_books: Vec::new(),
        asked_question: true,
        rooted_in_jesus_emphasis: false,
        jesus_invite_variant: 0,
        topic: Topic::Other,
        topic_confidence: 0.0,
        used_book_insights: false,
        path: "triage".to_string(),
        allow_books: false,
        allow_jesus: false,
        cadence_reason: CadenceReason::Safety,
        planner_retries: 0,
        fallback_reason: None,
        declined_jesus_until_turn: None,
        had_jesus_invite: false,
    };

    TurnOutput { content, metadata }
}
