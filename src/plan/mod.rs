//! The structured "response plan" data contract.
//!
//! A [`ResponsePlan`] is produced fresh by the external model each turn,
//! validated (shape here via serde, semantics in [`validator`]), rendered
//! into text and then discarded. Only its rendered output and derived
//! metadata outlive the turn.

pub mod validator;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Coarse conversational stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Intake,
    Chat,
    Advice,
}

/// Closed topic set for marriage conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Topic {
    Conflict,
    Betrayal,
    Porn,
    Intimacy,
    Finances,
    Parenting,
    Boundaries,
    Other,
}

impl Topic {
    /// Lenient coercion used by the classifier: lowercase the label and map
    /// anything unrecognized to `Other`.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "conflict" => Self::Conflict,
            "betrayal" => Self::Betrayal,
            "porn" => Self::Porn,
            "intimacy" => Self::Intimacy,
            "finances" => Self::Finances,
            "parenting" => Self::Parenting,
            "boundaries" => Self::Boundaries,
            _ => Self::Other,
        }
    }
}

/// Planner hint for how resources should be used this turn. Advisory only;
/// server-side gates are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BooksMode {
    None,
    Insights,
    Attributions,
}

/// One step of the 7-day plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub title: String,
    pub how_to_say_it: String,
    pub time_estimate_min: i64,
    #[serde(default)]
    pub trigger_if_then: Option<String>,
}

/// Model-reported safety assessment for the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub flag: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The nested pastoral scaffold: mirror, diagnosis, anchor, steps,
/// obstacles, one check-in question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanBody {
    pub mirror: String,
    pub diagnose: String,
    pub truth_anchor: String,
    pub steps_7day: Vec<PlanStep>,
    pub obstacles: Vec<String>,
    pub check_in_question: String,
}

fn default_books_mode() -> BooksMode {
    BooksMode::Insights
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub phase: Phase,
    pub safety: SafetyAssessment,
    pub topic: Topic,
    #[serde(default)]
    pub intake_completed_needed: bool,
    #[serde(default)]
    pub jesus_invite_allowed: bool,
    #[serde(default)]
    pub jesus_invite_variant: u8,
    #[serde(default)]
    pub topic_confidence: f64,
    /// Candidate resource keys, advisory only.
    #[serde(default)]
    pub book_candidate_keys: Vec<String>,
    #[serde(default = "default_books_mode")]
    pub books_mode_hint: BooksMode,
    pub plan: PlanBody,
}
