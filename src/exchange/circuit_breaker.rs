//! Circuit breaker for exchange client calls.
//!
//! Every `ExchangeClient` call is expected to pass through one of these
//! before hitting the wire: closed state allows calls through, a run of
//! consecutive failures opens the circuit, and after a recovery timeout one
//! probe call is allowed through in half-open state to decide whether to
//! close again or re-open.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub half_open_success_threshold: u32,
    pub max_retries: u8,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExchangeCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_success_threshold: 1,
            max_retries: 3,
            base_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

pub struct ExchangeCircuitBreaker {
    config: ExchangeCircuitBreakerConfig,
    state: Arc<RwLock<CircuitState>>,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    opened_at: Arc<RwLock<Option<Instant>>>,
}

impl ExchangeCircuitBreaker {
    pub fn new(config: ExchangeCircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            opened_at: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ExchangeCircuitBreakerConfig::default())
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a call may proceed right now. Promotes Open to HalfOpen once
    /// the recovery timeout has elapsed, matching how a probe request is
    /// allowed through before fully closing the circuit again.
    pub async fn should_allow(&self) -> bool {
        let state = *self.state.read().await;
        if state != CircuitState::Open {
            return true;
        }
        let opened_at = *self.opened_at.read().await;
        match opened_at {
            Some(at) if at.elapsed() >= Duration::from_secs(self.config.recovery_timeout_secs) => {
                let mut state = self.state.write().await;
                *state = CircuitState::HalfOpen;
                self.half_open_successes.store(0, Ordering::SeqCst);
                info!("exchange circuit breaker transitioning to half-open");
                true
            }
            _ => false,
        }
    }

    pub async fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let state = *self.state.read().await;
        if state == CircuitState::HalfOpen {
            let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.half_open_success_threshold {
                let mut state = self.state.write().await;
                *state = CircuitState::Closed;
                *self.opened_at.write().await = None;
                info!("exchange circuit breaker closed");
            }
        }
    }

    pub async fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let state = *self.state.read().await;
        if state == CircuitState::HalfOpen || failures >= self.config.failure_threshold {
            let mut state = self.state.write().await;
            if *state != CircuitState::Open {
                *state = CircuitState::Open;
                *self.opened_at.write().await = Some(Instant::now());
                warn!(failures, "exchange circuit breaker tripped");
            }
        }
    }

    /// Backoff delay for retry attempt `attempt` (0-indexed): exponential
    /// with 10% jitter, capped at `max_backoff_ms`. `retry_after` overrides
    /// the computed delay when the server supplied one.
    pub fn backoff_delay(&self, attempt: u8, retry_after: Option<Duration>) -> Duration {
        if let Some(d) = retry_after {
            return d;
        }
        let exp = self.config.base_backoff_ms.saturating_mul(1u64 << attempt.min(10));
        let capped = exp.min(self.config.max_backoff_ms);
        let jitter_frac: f64 = rand::thread_rng().gen_range(-0.1..=0.1);
        let jittered = (capped as f64 * (1.0 + jitter_frac)).max(0.0) as u64;
        Duration::from_millis(jittered)
    }

    pub fn max_retries(&self) -> u8 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let cb = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.should_allow().await);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_on_success_and_reopens_on_failure() {
        let cb = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_secs: 0,
            ..Default::default()
        });
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(cb.should_allow().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[test]
    fn backoff_delay_is_capped_and_honors_retry_after() {
        let cb = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 500,
            ..Default::default()
        });
        let capped = cb.backoff_delay(10, None);
        assert!(capped <= Duration::from_millis(550));

        let explicit = cb.backoff_delay(0, Some(Duration::from_secs(2)));
        assert_eq!(explicit, Duration::from_secs(2));
    }
}
