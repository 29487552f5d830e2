//! Explicit-attribution gate.
//!
//! Only *named* attributions are gated here. Paraphrased, attribution-free
//! insight clauses are always retrievable regardless of this decision.

use crate::plan::Phase;
use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BooksGateReason {
    Ok,
    IntakeIncomplete,
    LowConfidence,
    SafetyTriage,
}

/// Explicit resource attribution is allowed iff the phase is advice, intake
/// is complete, the turn is not safety-flagged, and effective confidence
/// meets the threshold.
#[must_use]
pub fn books_gate(
    phase: Phase,
    intake_completed: bool,
    safety_flag: bool,
    effective_confidence: f64,
    threshold: f64,
) -> (bool, BooksGateReason) {
    let allow = phase == Phase::Advice
        && intake_completed
        && !safety_flag
        && effective_confidence >= threshold;

    let reason = if safety_flag {
        BooksGateReason::SafetyTriage
    } else if phase == Phase::Advice && !intake_completed {
        BooksGateReason::IntakeIncomplete
    } else if effective_confidence < threshold {
        BooksGateReason::LowConfidence
    } else {
        BooksGateReason::Ok
    };

    (allow, reason)
}
