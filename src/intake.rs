//! Prerequisite intake tracking.
//!
//! Four flags must all be satisfied before the assistant moves past intake;
//! completion gates both explicit attributions and faith invites.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeState {
    #[serde(default)]
    pub issue_named: bool,
    #[serde(default)]
    pub safety_cleared: bool,
    #[serde(default)]
    pub goal_captured: bool,
    #[serde(default)]
    pub prayer_consent_known: bool,
}

impl IntakeState {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.issue_named && self.safety_cleared && self.goal_captured && self.prayer_consent_known
    }

    /// Read intake flags from conversation metadata. Flags may live at the
    /// top level or nested under an `intake` key; missing flags are false.
    #[must_use]
    pub fn from_metadata(meta: &Value) -> Self {
        let scope = meta.get("intake").unwrap_or(meta);
        let flag = |key: &str| {
            scope
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        Self {
            issue_named: flag("issue_named"),
            safety_cleared: flag("safety_cleared"),
            goal_captured: flag("goal_captured"),
            prayer_consent_known: flag("prayer_consent_known"),
        }
    }

    /// Metadata patch for deep-merge writes, nested under `intake`.
    #[must_use]
    pub fn to_metadata(&self) -> Value {
        json!({
            "intake": {
                "issue_named": self.issue_named,
                "safety_cleared": self.safety_cleared,
                "goal_captured": self.goal_captured,
                "prayer_consent_known": self.prayer_consent_known,
                "completed": self.is_complete(),
            }
        })
    }
}
