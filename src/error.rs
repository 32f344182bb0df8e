use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `tenax`.
///
/// Only infrastructure failures surface here. Conversational failure modes
/// (unknown intent, unresolved clarification, no matching task, guardrail
/// block) are never errors; they become replies.
#[derive(Debug, Error)]
pub enum TenaxError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Task ledger ─────────────────────────────────────────────────────
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Ledger errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("invalid update for task {id}: {reason}")]
    InvalidUpdate { id: String, reason: String },

    #[error("backend: {0}")]
    Backend(String),
}

// ─── Model fallback errors ──────────────────────────────────────────────────

/// Reasons the model fallback classifier can fail. These never leave the
/// classifier: every variant degrades to an `unknown` intent.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback timed out after {0}ms")]
    Timeout(u64),

    #[error("fallback provider failed: {0}")]
    Provider(String),

    #[error("fallback output is not structured intent data: {0}")]
    Malformed(String),

    #[error("fallback produced intent outside the known set: {0}")]
    OutOfEnumeration(String),
}

impl FallbackError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Provider(_) => "provider",
            Self::Malformed(_) => "malformed",
            Self::OutOfEnumeration(_) => "out_of_enumeration",
        }
    }
}

/// Convenience alias used by the dialogue entry point.
pub type Result<T> = std::result::Result<T, TenaxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_converts_into_top_level() {
        let err: TenaxError = LedgerError::NotFound("task-1".into()).into();
        assert_eq!(err.to_string(), "ledger: task not found: task-1");
    }

    #[test]
    fn fallback_reasons_are_stable() {
        assert_eq!(FallbackError::Timeout(10).reason(), "timeout");
        assert_eq!(
            FallbackError::OutOfEnumeration("fly".into()).reason(),
            "out_of_enumeration"
        );
    }
}
