use thiserror::Error;

/// Crate-wide error type for the trading orchestrator.
///
/// Variants map onto the error taxonomy: `TransientNetworkError` and
/// `AuthError` come from the exchange/scoreboard transport layer,
/// `ValidationError`/`RiskGateRejected`/`MatchNotFound` are normal control
/// flow produced by the decision engine and risk gate, and
/// `OrphanedOrder`/`KillSwitchTriggered`/`ScoreboardStale` are the
/// conditions that the orchestrator treats specially rather than just
/// logging and moving on.
#[derive(Error, Debug)]
pub enum TraderError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("transient network error: {0}")]
    TransientNetworkError(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("risk gate rejected entry: {0}")]
    RiskGateRejected(String),

    #[error("no market for game: {0}")]
    MatchNotFound(String),

    #[error("order filled but position write failed for order {order_id}: {reason}")]
    OrphanedOrder { order_id: String, reason: String },

    #[error("kill switch active: {0}")]
    KillSwitchTriggered(String),

    #[error("scoreboard stale for event {event_id}, falling back to market time")]
    ScoreboardStale { event_id: String },

    #[error("order submission failed: {0}")]
    OrderSubmission(String),

    #[error("order timeout: {0}")]
    OrderTimeout(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TraderError>;

impl TraderError {
    /// Whether a loop should retry this error via backoff rather than
    /// treat it as terminal for the current iteration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TraderError::TransientNetworkError(_) | TraderError::Http(_)
        )
    }

    /// Whether this error should pause the bot and raise an alert rather
    /// than just log and continue.
    pub fn is_fatal_for_user(&self) -> bool {
        matches!(
            self,
            TraderError::AuthError(_) | TraderError::KillSwitchTriggered(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_network_errors_are_retryable() {
        let err = TraderError::TransientNetworkError("timeout".into());
        assert!(err.is_retryable());
        assert!(!err.is_fatal_for_user());
    }

    #[test]
    fn auth_errors_are_fatal_not_retryable() {
        let err = TraderError::AuthError("401".into());
        assert!(!err.is_retryable());
        assert!(err.is_fatal_for_user());
    }

    #[test]
    fn risk_gate_rejection_is_neither_retryable_nor_fatal() {
        let err = TraderError::RiskGateRejected("daily loss limit".into());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal_for_user());
    }
}
