//! The per-turn decision pipeline.
//!
//! [`Orchestrator::run`] is a pure pipeline over one [`TurnState`]: safety
//! pre-scan, best-effort classification, structured planning, the two gates,
//! composition, scrubbing, and metadata assembly. It performs no storage I/O;
//! [`session::TurnSession`] wires it to a [`crate::store::ConversationStore`].

pub mod session;
pub mod triage;

use crate::classify::Classifier;
use crate::config::PolicySettings;
use crate::error::{Result, SelahError};
use crate::gates::{books_gate, invite_gate, InviteGateInput};
use crate::metadata::TurnMetadata;
use crate::plan::{Phase, ResponsePlan, Topic};
use crate::planner::StructuredPlanner;
use crate::providers::{ChatMessage, CompletionProvider};
use crate::resources::{Attribution, ResourceLibrary};
use crate::safety::SafetyGuard;
use crate::scrub::{finalize, ResourceScrubber};
use std::sync::Arc;

/// Rotating invite phrasings, selected by the planner's 1-based variant.
const INVITE_VARIANTS: [&str; 6] = [
    "Where do you sense Jesus inviting you to take one small, grace-filled step this week?",
    "If you brought this to Jesus in one honest sentence tonight, what would you say?",
    "What might it look like to invite Jesus into the hardest moment of this week?",
    "Would you be open to asking Jesus for the courage to take the first step here?",
    "Where could a short, quiet prayer fit into your week as you try this?",
    "As you work on this, what would trusting Jesus with the outcome look like?",
];

const SCRUB_NOTICE: &str =
    "Once we've finished intake and I'm confident on the topic, I can suggest resources.";

/// Everything the pipeline needs to know about one turn, assembled by the
/// caller from conversation state.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub conversation_id: String,
    /// Index of the assistant turn being produced (0-based).
    pub turn_index: u32,
    pub intake_completed: bool,
    /// Whether the previous assistant turn contained a faith invite.
    pub last_turn_had_invite: bool,
    /// Resource keys attributed on the previous assistant turn. Auxiliary;
    /// empty for most conversations.
    pub prior_book_keys: Vec<String>,
    pub user_message: String,
    /// Recent history including the current user message, oldest first.
    pub history_for_model: Vec<ChatMessage>,
    pub last_invite_turn: Option<u32>,
    pub cooldown_until_turn: Option<u32>,
    pub prayer_consent: Option<bool>,
}

/// One finished turn: final user-facing text plus complete metadata.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub content: String,
    pub metadata: TurnMetadata,
}

pub struct Orchestrator {
    guard: SafetyGuard,
    classifier: Classifier,
    planner: StructuredPlanner,
    scrubber: ResourceScrubber,
    library: Arc<ResourceLibrary>,
    settings: PolicySettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        library: Arc<ResourceLibrary>,
        settings: PolicySettings,
    ) -> Self {
        Self {
            guard: SafetyGuard::new(),
            classifier: Classifier::new(Arc::clone(&provider), &settings),
            planner: StructuredPlanner::new(provider, &settings),
            scrubber: ResourceScrubber::new(&library),
            library,
            settings,
        }
    }

    /// Run the full pipeline for one turn.
    ///
    /// Only a terminal planner failure is an error; the classifier is
    /// best-effort and a safety flag resolves into a triage reply rather
    /// than an error.
    pub async fn run(&self, state: &TurnState) -> Result<TurnOutput> {
        // 1) Safety pre-scan short-circuits everything else.
        let safety = self.guard.pre_moderate(&state.user_message);
        if safety.flag {
            tracing::warn!(
                cid = %state.conversation_id,
                reason = safety.reason.as_deref().unwrap_or(""),
                "safety triage short-circuit"
            );
            return Ok(triage::triage_route(&state.user_message, &safety));
        }

        // 2) Best-effort topic opinion. Failures are logged and dropped.
        let classification = match self.classifier.classify(&state.user_message).await {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(cid = %state.conversation_id, error = %e, "classifier unavailable, continuing without it");
                None
            }
        };

        // 3) Structured plan with bounded validation retries. Terminal.
        let outcome = self
            .planner
            .generate(&state.history_for_model)
            .await
            .map_err(SelahError::from)?;
        let plan = outcome.plan;

        // 4) Effective topic and confidence: prefer the classifier when the
        // plan says "other"; confidence is the max of both opinions.
        let effective_topic = match (plan.topic, classification) {
            (Topic::Other, Some(c)) => c.topic,
            (topic, _) => topic,
        };
        let effective_confidence = plan
            .topic_confidence
            .max(classification.map_or(0.0, |c| c.confidence));

        tracing::info!(
            cid = %state.conversation_id,
            phase = %plan.phase,
            advice_intent = plan.phase == Phase::Advice,
            intake_complete = state.intake_completed,
            topic = %effective_topic,
            topic_conf = effective_confidence,
            "phase_gate"
        );

        // 5) Invite gate.
        let gate_input = InviteGateInput {
            phase: plan.phase,
            advice_intent: plan.phase == Phase::Advice,
            intake_completed: state.intake_completed,
            safety_flag: plan.safety.flag,
            assistant_turn_index: state.turn_index,
            last_invite_turn: state.last_invite_turn,
            cooldown_until_turn: state.cooldown_until_turn,
            last_turn_had_invite: state.last_turn_had_invite,
            prayer_consent: state.prayer_consent,
            plan_allows_invite: plan.jesus_invite_allowed,
        };
        let (allow_jesus, cadence_reason) = invite_gate(&gate_input, &self.settings);

        tracing::info!(
            cid = %state.conversation_id,
            a_idx = state.turn_index,
            last_invite = ?state.last_invite_turn,
            until = ?state.cooldown_until_turn,
            allow_jesus,
            cadence_reason = %cadence_reason,
            "gate"
        );

        // 6) Books gate, fed the pre-scan verdict (clear at this point).
        let (allow_books, gate_reason) = books_gate(
            plan.phase,
            state.intake_completed,
            safety.flag,
            effective_confidence,
            self.settings.books_confidence_threshold,
        );

        // 7) Retrieval: paraphrased insights always, attributions only when
        // the books gate allows.
        let insights = self
            .library
            .insight_clauses(effective_topic, self.settings.insight_clause_limit);
        let attributions: Vec<Attribution> = if allow_books {
            self.library.attributions(effective_topic)
        } else {
            Vec::new()
        };

        // 8) Compose, post-moderate, scrub.
        let composed = compose(
            &plan,
            &attributions,
            allow_jesus,
            self.settings.max_attributions_shown,
        );
        let moderated = self.guard.post_moderate(composed);
        let (scrubbed, scrubbed_list) = self.scrubber.scrub(&moderated, allow_books);

        let mut content = scrubbed;
        if !allow_books && !scrubbed_list.is_empty() {
            content.push('\n');
            content.push_str(SCRUB_NOTICE);
        }
        let content = finalize(&content);

        tracing::info!(
            cid = %state.conversation_id,
            path = "orchestrated",
            allow = allow_books,
            reason = %gate_reason,
            scrubbed = scrubbed_list.len(),
            used_insights = !insights.is_empty(),
            phase = %plan.phase,
            topic = %effective_topic,
            topic_conf = effective_confidence,
            "books_gate"
        );

        // 9) Metadata. When nothing was retrieved, the plan's candidate keys
        // seed the scrub list so gating stays observable.
        let mut scrubbed_books = if attributions.is_empty() {
            plan.book_candidate_keys.clone()
        } else {
            Vec::new()
        };
        for snippet in scrubbed_list {
            if !scrubbed_books.contains(&snippet) {
                scrubbed_books.push(snippet);
            }
        }

        let metadata = TurnMetadata {
            phase: plan.phase,
            advice_intent: plan.phase == Phase::Advice,
            safety_flag_this_turn: plan.safety.flag,
            gate_reason,
            book_selection_reason: if attributions.is_empty() {
                "gated or none".to_string()
            } else {
                "contextual".to_string()
            },
            book_attributions: attributions,
            scrubbed_books,
            asked_question: true,
            rooted_in_jesus_emphasis: allow_jesus,
            jesus_invite_variant: if allow_jesus {
                u32::from(plan.jesus_invite_variant)
            } else {
                0
            },
            topic: effective_topic,
            topic_confidence: effective_confidence,
            used_book_insights: !insights.is_empty(),
            path: "orchestrated".to_string(),
            allow_books,
            allow_jesus,
            cadence_reason,
            planner_retries: outcome.retries,
            fallback_reason: None,
            declined_jesus_until_turn: state.cooldown_until_turn,
            had_jesus_invite: allow_jesus,
        };

        Ok(TurnOutput { content, metadata })
    }
}

/// Render the plan into the fixed reply template.
fn compose(
    plan: &ResponsePlan,
    attributions: &[Attribution],
    allow_jesus: bool,
    max_attributions_shown: usize,
) -> String {
    let body = &plan.plan;
    let mut lines: Vec<String> = Vec::new();

    lines.push(body.mirror.clone());
    lines.push(format!("**What's going on (read):** {}", body.diagnose));
    lines.push(format!("**Truth anchor:** {}", body.truth_anchor));

    lines.push("\n**Next 7 days**".to_string());
    for (i, step) in body.steps_7day.iter().enumerate() {
        let trigger = step
            .trigger_if_then
            .as_deref()
            .map(|t| format!(" (trigger: {t})"))
            .unwrap_or_default();
        lines.push(format!(
            "{}. {} ({} min)\n   Say it like this: \"{}\"{}",
            i + 1,
            step.title,
            step.time_estimate_min,
            step.how_to_say_it,
            trigger
        ));
    }

    lines.push("\n**Likely obstacles & how to handle:**".to_string());
    for obstacle in &body.obstacles {
        lines.push(format!("- {obstacle}"));
    }

    lines.push(format!("\n**Quick check-in:** {}", body.check_in_question));

    if allow_jesus {
        let index = usize::from(plan.jesus_invite_variant.clamp(1, 6)) - 1;
        lines.push(format!("\n{}", INVITE_VARIANTS[index]));
    }

    if !attributions.is_empty() {
        let cites = attributions
            .iter()
            .take(max_attributions_shown)
            .map(|a| format!("({}, {})", a.pretty, a.section))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("\nSources: {cites}"));
    }

    lines.join("\n")
}
