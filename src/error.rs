use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for the policy core.
///
/// Each subsystem defines its own error variant. Callers can match on these
/// to decide recovery strategy; internal plumbing continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum SelahError {
    // ── Planner (terminal for the turn when exhausted) ──────────────────
    #[error("planner: {0}")]
    Planner(#[from] PlannerError),

    // ── Classifier (best-effort; callers swallow this) ──────────────────
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),

    // ── Resource reference data ──────────────────────────────────────────
    #[error("resources: {0}")]
    Resource(#[from] ResourceError),

    // ── Conversation store ───────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Planner errors ──────────────────────────────────────────────────────────

/// Terminal planner failures, one per failure category of the retry loop.
///
/// `attempts` is the number of full round-trips made before giving up.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("completion request failed after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    #[error("model returned empty content after {attempts} attempts")]
    EmptyContent { attempts: u32 },

    #[error("structured output was not valid JSON after {attempts} attempts: {message}")]
    InvalidJson { attempts: u32, message: String },

    #[error("structured output failed schema validation after {attempts} attempts: {message}")]
    Schema { attempts: u32, message: String },

    #[error("plan failed semantic validation after {attempts} attempts: {errors:?}")]
    Semantic { attempts: u32, errors: Vec<String> },
}

// ─── Classifier errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(String),

    #[error("classifier returned empty content")]
    EmptyContent,

    #[error("classifier output was not valid JSON: {0}")]
    InvalidJson(String),
}

// ─── Resource errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to parse resource reference data: {0}")]
    Parse(String),
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("backend: {0}")]
    Backend(String),
}

// ─── Convenience re-exports ──────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, SelahError>;
