//! Structured plan generation with a bounded validation/repair loop.
//!
//! Each attempt is an independent full round-trip built from the same
//! immutable base message list plus at most one corrective system message
//! describing the previous failure. Failed responses are never partially
//! reused.

use crate::config::PolicySettings;
use crate::error::PlannerError;
use crate::plan::validator::validate_plan;
use crate::plan::ResponsePlan;
use crate::providers::{ChatMessage, CompletionProvider};
use std::sync::Arc;

const SYSTEM_POLICY: &str = "\
You are a Christian marriage mentor and pastoral counselor.
Return ONLY a single JSON object that validates against the provided schema.
No markdown, no backticks, no explanations.

Content contract (the caller renders this):
- Warm, candid, hopeful, non-shaming.
- Scaffold: Mirror -> Diagnose -> Truth Anchor -> 7-day Plan (3-5 steps with time+scripts) -> Obstacles -> One check-in question.
- Optional Jesus invite is decided by the caller (field: jesus_invite_allowed).

Hard rules about external resources:
- Do NOT include explicit book titles, authors, publishers, URLs, or links anywhere in strings.
- Use paraphrased, principle-level insights only. Never quote or cite.
- If you feel a resource is helpful, paraphrase the idea but do not name it.
- The server controls if/when explicit attributions are revealed; you must not reveal them.
- You may set books_mode_hint to \"insights\" (default) or \"none\" based on need, but do not place attributions or titles in any field.";

const JSON_SHAPE_CORRECTION: &str = "The prior response failed to return valid JSON. Return ONLY \
a single valid JSON object conforming to the schema, with quoted keys and values and no trailing commas.";
const EMPTY_CORRECTION: &str =
    "Your last reply was empty. Return ONLY one JSON object matching the schema.";

/// A validated plan plus the number of retries spent obtaining it.
#[derive(Debug)]
pub struct PlanOutcome {
    pub plan: ResponsePlan,
    pub retries: u32,
}

pub struct StructuredPlanner {
    provider: Arc<dyn CompletionProvider>,
    max_retries: u32,
    temperature: f64,
}

impl StructuredPlanner {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: &PolicySettings) -> Self {
        Self {
            provider,
            max_retries: settings.max_planner_retries,
            temperature: settings.temperature,
        }
    }

    /// Obtain a plan that passes both schema and semantic validation, or
    /// fail terminally after exhausting the retry budget.
    pub async fn generate(&self, history: &[ChatMessage]) -> Result<PlanOutcome, PlannerError> {
        let mut base = Vec::with_capacity(history.len() + 1);
        base.push(ChatMessage::system(SYSTEM_POLICY));
        base.extend_from_slice(history);

        let mut correction: Option<String> = None;

        for attempt in 0..=self.max_retries {
            let attempts = attempt + 1;
            let exhausted = attempt == self.max_retries;

            // Fresh list per attempt: base plus at most one correction.
            let messages: Vec<ChatMessage> = match &correction {
                None => base.clone(),
                Some(c) => {
                    let mut m = base.clone();
                    m.push(ChatMessage::system(c.clone()));
                    m
                }
            };

            let raw = match self.provider.complete_json(&messages, self.temperature).await {
                Ok(raw) => raw,
                Err(e) => {
                    if exhausted {
                        return Err(PlannerError::Transport {
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    tracing::warn!(attempt = attempts, error = %e, "planner transport failure, retrying");
                    correction = Some(JSON_SHAPE_CORRECTION.to_string());
                    continue;
                }
            };

            if raw.trim().is_empty() {
                if exhausted {
                    return Err(PlannerError::EmptyContent { attempts });
                }
                tracing::warn!(attempt = attempts, "planner returned empty content, retrying");
                correction = Some(EMPTY_CORRECTION.to_string());
                continue;
            }

            let json_str = extract_json(&raw);
            let value: serde_json::Value = match serde_json::from_str(json_str) {
                Ok(v) => v,
                Err(e) => {
                    if exhausted {
                        return Err(PlannerError::InvalidJson {
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    tracing::warn!(attempt = attempts, error = %e, "planner output was not JSON, retrying");
                    correction = Some(format!("Fix and return valid JSON only. Error: {e}"));
                    continue;
                }
            };

            let plan: ResponsePlan = match serde_json::from_value(value) {
                Ok(p) => p,
                Err(e) => {
                    if exhausted {
                        return Err(PlannerError::Schema {
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    tracing::warn!(attempt = attempts, error = %e, "plan failed schema validation, retrying");
                    correction = Some(format!(
                        "Your JSON failed schema validation. Correct the fields and return only the JSON object. Error: {e}"
                    ));
                    continue;
                }
            };

            let errors = validate_plan(&plan);
            if !errors.is_empty() {
                if exhausted {
                    return Err(PlannerError::Semantic { attempts, errors });
                }
                tracing::warn!(attempt = attempts, ?errors, "plan failed semantic validation, retrying");
                correction = Some(format!(
                    "Revise the JSON to satisfy these constraints and return only the fixed JSON object: {}",
                    errors.join("; ")
                ));
                continue;
            }

            return Ok(PlanOutcome {
                plan,
                retries: attempt,
            });
        }

        unreachable!("retry loop returns on the final attempt")
    }
}

/// Best-effort extraction of the first `{...}` block from raw model output.
#[must_use]
pub(crate) fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        calls: AtomicUsize,
        responses: Mutex<Vec<anyhow::Result<String>>>,
        seen_message_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
                seen_message_counts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete_json<'a>(
            &'a self,
            messages: &'a [ChatMessage],
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen_message_counts.lock().unwrap().push(messages.len());
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    anyhow::bail!("script exhausted");
                }
                responses.remove(0)
            })
        }
    }

    fn valid_plan_json() -> String {
        serde_json::json!({
            "phase": "advice",
            "safety": {"flag": false, "reason": null},
            "topic": "conflict",
            "intake_completed_needed": false,
            "jesus_invite_allowed": false,
            "jesus_invite_variant": 0,
            "topic_confidence": 0.8,
            "book_candidate_keys": [],
            "books_mode_hint": "insights",
            "plan": {
                "mirror": "You sound worn down by the same argument.",
                "diagnose": "The fight is about feeling unheard, not chores.",
                "truth_anchor": "You are on the same team, even mid-conflict.",
                "steps_7day": [
                    {"title": "Pause ritual", "how_to_say_it": "Can we take ten?", "time_estimate_min": 10, "trigger_if_then": "if voices rise then pause"},
                    {"title": "Daily check-in", "how_to_say_it": "What helped today?", "time_estimate_min": 15, "trigger_if_then": "if dinner ends then ask"},
                    {"title": "Repair attempt", "how_to_say_it": "I was harsh, I'm sorry.", "time_estimate_min": 5, "trigger_if_then": "if you snap then repair"}
                ],
                "obstacles": ["old habits"],
                "check_in_question": "Which step feels doable first?"
            }
        })
        .to_string()
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::user("we keep fighting about money")]
    }

    fn planner(provider: Arc<ScriptedProvider>) -> StructuredPlanner {
        StructuredPlanner::new(provider, &PolicySettings::default())
    }

    #[tokio::test]
    async fn first_attempt_success_uses_base_messages_only() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(valid_plan_json())]));
        let outcome = planner(Arc::clone(&provider))
            .generate(&history())
            .await
            .unwrap();
        assert_eq!(outcome.retries, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        // system policy + one user message
        assert_eq!(*provider.seen_message_counts.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn invalid_json_exhausts_exactly_three_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("not json at all".into()),
            Ok("still not json".into()),
            Ok("nope".into()),
        ]));
        let err = planner(Arc::clone(&provider))
            .generate(&history())
            .await
            .expect_err("must exhaust");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        match err {
            PlannerError::InvalidJson { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected InvalidJson, got {other}"),
        }
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn corrections_do_not_accumulate_across_retries() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("garbage".into()),
            Ok("garbage".into()),
            Ok(valid_plan_json()),
        ]));
        let outcome = planner(Arc::clone(&provider))
            .generate(&history())
            .await
            .unwrap();
        assert_eq!(outcome.retries, 2);
        // Every retry is base (2 messages) + exactly one correction.
        assert_eq!(
            *provider.seen_message_counts.lock().unwrap(),
            vec![2, 3, 3]
        );
    }

    #[tokio::test]
    async fn semantic_failure_then_repair() {
        let mut bad: serde_json::Value = serde_json::from_str(&valid_plan_json()).unwrap();
        bad["plan"]["obstacles"] = serde_json::json!([]);
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(bad.to_string()),
            Ok(valid_plan_json()),
        ]));
        let outcome = planner(Arc::clone(&provider))
            .generate(&history())
            .await
            .unwrap();
        assert_eq!(outcome.retries, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn semantic_exhaustion_reports_rule_errors() {
        let mut bad: serde_json::Value = serde_json::from_str(&valid_plan_json()).unwrap();
        bad["plan"]["obstacles"] = serde_json::json!([]);
        let body = bad.to_string();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(body.clone()),
            Ok(body.clone()),
            Ok(body),
        ]));
        let err = planner(provider)
            .generate(&history())
            .await
            .expect_err("must exhaust");
        match err {
            PlannerError::Semantic { attempts, errors } => {
                assert_eq!(attempts, 3);
                assert!(errors.iter().any(|e| e.contains("obstacle")));
            }
            other => panic!("expected Semantic, got {other}"),
        }
    }

    #[tokio::test]
    async fn transport_exhaustion_is_terminal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(anyhow::anyhow!("503 upstream")),
            Err(anyhow::anyhow!("503 upstream")),
            Err(anyhow::anyhow!("503 upstream")),
        ]));
        let err = planner(Arc::clone(&provider))
            .generate(&history())
            .await
            .expect_err("must exhaust");
        assert!(matches!(err, PlannerError::Transport { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn empty_content_retries_then_fails() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(String::new()),
            Ok("   ".into()),
            Ok(String::new()),
        ]));
        let err = planner(provider)
            .generate(&history())
            .await
            .expect_err("must exhaust");
        assert!(matches!(err, PlannerError::EmptyContent { attempts: 3 }));
    }

    #[test]
    fn extract_json_picks_the_block() {
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("noise {\"a\":1} trailing"), "{\"a\":1}");
        assert_eq!(extract_json("no braces here"), "no braces here");
    }

    #[tokio::test]
    async fn json_wrapped_in_prose_still_parses() {
        let wrapped = format!("Here is the plan:\n{}\nHope this helps.", valid_plan_json());
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(wrapped)]));
        let outcome = planner(provider).generate(&history()).await.unwrap();
        assert_eq!(outcome.retries, 0);
    }
}
