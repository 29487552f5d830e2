//! The unified faith-invite gate.
//!
//! Pure function, no I/O. Rules are evaluated strictly in order; the first
//! matching rule wins, so each reason code is only reachable when every
//! earlier condition is false. This ordering is a hard contract covered by
//! the tests below.

use crate::config::PolicySettings;
use crate::plan::Phase;
use serde::Serialize;
use strum::Display;

/// Reason code attached to every invite decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CadenceReason {
    Safety,
    PhaseIntake,
    NotAdvice,
    Intake,
    PlanBlocked,
    FirstTurn,
    LastTurnHadJesus,
    CadenceWindow,
    CooldownDeclined,
    Ok,
}

/// Everything the gate looks at for one turn.
#[derive(Debug, Clone)]
pub struct InviteGateInput {
    pub phase: Phase,
    pub advice_intent: bool,
    pub intake_completed: bool,
    pub safety_flag: bool,
    /// Index of the assistant turn being produced (0-based).
    pub assistant_turn_index: u32,
    /// Turn index of the last issued invite, if any.
    pub last_invite_turn: Option<u32>,
    /// Invites are suppressed while the current turn is before this index.
    pub cooldown_until_turn: Option<u32>,
    /// Whether the immediately preceding assistant turn contained an invite.
    pub last_turn_had_invite: bool,
    /// Prayer consent: `None` = unknown, `Some(false)` = explicit no.
    pub prayer_consent: Option<bool>,
    /// The planner's advisory flag.
    pub plan_allows_invite: bool,
}

/// Decide whether a faith invite may be appended this turn.
#[must_use]
pub fn invite_gate(input: &InviteGateInput, settings: &PolicySettings) -> (bool, CadenceReason) {
    // 1) Hard blocks, order matters.
    if input.safety_flag {
        return (false, CadenceReason::Safety);
    }
    if input.phase == Phase::Intake {
        return (false, CadenceReason::PhaseIntake);
    }
    if input.phase != Phase::Advice && !input.advice_intent {
        return (false, CadenceReason::NotAdvice);
    }
    if !input.intake_completed {
        return (false, CadenceReason::Intake);
    }

    // 2) Consent: an explicit "no" blocks; unknown consent does not.
    if input.prayer_consent == Some(false) {
        return (false, CadenceReason::PlanBlocked);
    }

    // 3) Frequency / duplication.
    if input.assistant_turn_index == 0 {
        return (false, CadenceReason::FirstTurn);
    }
    if input.last_turn_had_invite {
        return (false, CadenceReason::LastTurnHadJesus);
    }

    // 4) Cadence window: build-up before the first invite, spacing after.
    match input.last_invite_turn {
        None => {
            if input.assistant_turn_index < settings.first_invite_min_turn {
                return (false, CadenceReason::CadenceWindow);
            }
        }
        Some(last) => {
            if input.assistant_turn_index.saturating_sub(last) < settings.invite_spacing_turns {
                return (false, CadenceReason::CadenceWindow);
            }
        }
    }

    // 5) Decline cooldown.
    if let Some(until) = input.cooldown_until_turn
        && input.assistant_turn_index < until
    {
        return (false, CadenceReason::CooldownDeclined);
    }

    // 6) Planner advisory.
    if !input.plan_allows_invite {
        return (false, CadenceReason::PlanBlocked);
    }

    (true, CadenceReason::Ok)
}
