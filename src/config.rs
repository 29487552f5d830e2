//! Tuning constants for the policy core.
//!
//! The thresholds here are product decisions, not derived values. They are
//! named settings so tests and deployments can substitute them, but the
//! defaults must be preserved unless product requirements change.

/// Settings consumed by the orchestrator, planner and gates.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    /// Model identifier passed to the completion provider.
    pub model: String,
    /// Sampling temperature for the structured planner.
    pub temperature: f64,
    /// Sampling temperature for the topic classifier.
    pub classifier_temperature: f64,
    /// Extra planner attempts after the first (2 extra = 3 total attempts).
    pub max_planner_retries: u32,
    /// Minimum effective topic confidence before explicit attributions show.
    pub books_confidence_threshold: f64,
    /// No faith invite before this assistant turn index when none was ever issued.
    pub first_invite_min_turn: u32,
    /// Minimum assistant turns between two faith invites.
    pub invite_spacing_turns: u32,
    /// Declines/ignores tolerated before a cooldown starts.
    pub decline_threshold: u32,
    /// Length of the decline cooldown, in assistant turns.
    pub decline_cooldown_turns: u32,
    /// Maximum explicit attributions rendered in the "Sources:" line.
    pub max_attributions_shown: usize,
    /// Maximum paraphrased insight clauses retrieved per turn.
    pub insight_clause_limit: usize,
    /// Recent user/assistant pairs fed back to the model as history.
    pub history_max_pairs: usize,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            classifier_temperature: 0.1,
            max_planner_retries: 2,
            books_confidence_threshold: 0.6,
            first_invite_min_turn: 4,
            invite_spacing_turns: 3,
            decline_threshold: 2,
            decline_cooldown_turns: 6,
            max_attributions_shown: 3,
            insight_clause_limit: 6,
            history_max_pairs: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PolicySettings;

    #[test]
    fn defaults_preserve_product_constants() {
        let s = PolicySettings::default();
        assert_eq!(s.max_planner_retries, 2);
        assert!((s.books_confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(s.first_invite_min_turn, 4);
        assert_eq!(s.invite_spacing_turns, 3);
        assert_eq!(s.decline_threshold, 2);
        assert_eq!(s.decline_cooldown_turns, 6);
    }
}
