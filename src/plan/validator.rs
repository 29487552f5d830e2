//! Semantic plan rules, beyond basic shape validation.
//!
//! Validation is exhaustive, not short-circuiting: a single call reports
//! every simultaneous defect, each as a distinct error string. The planner
//! feeds the full list back to the model as a correction message.

use super::{Phase, ResponsePlan};

const MIN_STEPS: usize = 3;
const MAX_STEPS: usize = 5;
const MIN_STEP_MINUTES: i64 = 5;
const MAX_STEP_MINUTES: i64 = 180;
const MAX_INVITE_VARIANT: u8 = 6;
const MIN_ANCHOR_CHARS: usize = 10;

/// Validate a [`ResponsePlan`]. An empty vector means the plan passed.
#[must_use]
pub fn validate_plan(plan: &ResponsePlan) -> Vec<String> {
    let mut errors = Vec::new();

    // Phase sanity. Serde already restricts the tag; this guards manually
    // constructed plans fed in by callers.
    match plan.phase {
        Phase::Intake | Phase::Chat | Phase::Advice => {}
    }

    // Defensive: schema normally guarantees the reason shape.
    if plan.safety.flag
        && plan
            .safety
            .reason
            .as_ref()
            .is_some_and(|r| r.trim().is_empty())
    {
        errors.push("safety.reason must be a non-empty string when provided".to_string());
    }

    if !(0.0..=1.0).contains(&plan.topic_confidence) {
        errors.push(format!(
            "topic_confidence out of range: {}",
            plan.topic_confidence
        ));
    }

    // Invite coherence is bidirectional: allowed ⟺ variant > 0.
    if plan.jesus_invite_allowed && plan.jesus_invite_variant == 0 {
        errors.push("jesus_invite_allowed but variant == 0".to_string());
    }
    if !plan.jesus_invite_allowed && plan.jesus_invite_variant > 0 {
        errors.push("jesus_invite_variant > 0 but not allowed".to_string());
    }
    if plan.jesus_invite_variant > MAX_INVITE_VARIANT {
        errors.push(format!(
            "jesus_invite_variant out of range (0-{MAX_INVITE_VARIANT}): {}",
            plan.jesus_invite_variant
        ));
    }

    let steps = &plan.plan.steps_7day;
    if !(MIN_STEPS..=MAX_STEPS).contains(&steps.len()) {
        errors.push(format!(
            "steps_7day must be {MIN_STEPS}-{MAX_STEPS} items, got {}",
            steps.len()
        ));
    }
    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        if step.title.trim().is_empty() {
            errors.push(format!("step {n} missing title"));
        }
        if step.how_to_say_it.trim().is_empty() {
            errors.push(format!("step {n} missing how_to_say_it"));
        }
        if !(MIN_STEP_MINUTES..=MAX_STEP_MINUTES).contains(&step.time_estimate_min) {
            errors.push(format!(
                "step {n} time_estimate_min out of range ({MIN_STEP_MINUTES}-{MAX_STEP_MINUTES}): {}",
                step.time_estimate_min
            ));
        }
        if step
            .trigger_if_then
            .as_ref()
            .is_none_or(|t| t.trim().is_empty())
        {
            errors.push(format!("step {n} missing trigger_if_then"));
        }
    }

    if plan.plan.obstacles.is_empty() {
        errors.push("at least one obstacle required".to_string());
    }

    if plan.plan.check_in_question.trim().is_empty() {
        errors.push("missing check_in_question".to_string());
    }

    let anchor_chars = plan
        .plan
        .truth_anchor
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    if anchor_chars < MIN_ANCHOR_CHARS {
        errors.push("truth_anchor is missing or too trivial".to_string());
    }

    errors
}
