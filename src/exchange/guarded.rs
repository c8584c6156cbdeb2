//! Wraps any `ExchangeClient` with the circuit breaker + retry/backoff
//! policy every exchange call goes through: retries on transient network
//! errors and 429/5xx (folded into `TraderError::TransientNetworkError` at
//! the adapter boundary), honors the breaker's open/half-open state, and
//! never retries `AuthError` or `ValidationError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{Market, OrderRequest};
use crate::error::{Result, TraderError};

use super::circuit_breaker::ExchangeCircuitBreaker;
use super::traits::{Balance, ExchangeClient, ExchangeKind, FillOutcome, SlippageCheck};

pub struct GuardedExchangeClient {
    inner: Arc<dyn ExchangeClient>,
    breaker: ExchangeCircuitBreaker,
}

impl GuardedExchangeClient {
    pub fn new(inner: Arc<dyn ExchangeClient>, breaker: ExchangeCircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    async fn call<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.breaker.should_allow().await {
            return Err(TraderError::TransientNetworkError(format!(
                "circuit breaker open, rejecting {}",
                op
            )));
        }

        let mut attempt: u8 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.breaker.max_retries() => {
                    self.breaker.record_failure().await;
                    let delay = self.breaker.backoff_delay(attempt, None);
                    warn!(op, attempt, ?delay, error = %err, "retrying exchange call after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        self.breaker.record_failure().await;
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for GuardedExchangeClient {
    fn kind(&self) -> ExchangeKind {
        self.inner.kind()
    }

    fn is_dry_run(&self) -> bool {
        self.inner.is_dry_run()
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.call("get_balance", || self.inner.get_balance()).await
    }

    async fn get_market(&self, ticker: &str) -> Result<Market> {
        self.call("get_market", || self.inner.get_market(ticker)).await
    }

    async fn list_markets(&self, sport: Option<&str>, max_close_time: DateTime<Utc>) -> Result<Vec<Market>> {
        self.call("list_markets", || self.inner.list_markets(sport, max_close_time))
            .await
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        self.call("place_order", || self.inner.place_order(request)).await
    }

    async fn wait_for_fill(&self, order_id: &str, timeout_seconds: u64) -> Result<FillOutcome> {
        // Not retried at this layer: the adapter's own poll loop already
        // owns `timeout_seconds`, and retrying here would double the wait.
        self.inner.wait_for_fill(order_id, timeout_seconds).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        self.call("cancel_order", || self.inner.cancel_order(order_id)).await
    }

    async fn check_slippage(
        &self,
        ticker: &str,
        intended_price: Decimal,
        max_slippage: Decimal,
    ) -> Result<SlippageCheck> {
        self.call("check_slippage", || {
            self.inner.check_slippage(ticker, intended_price, max_slippage)
        })
        .await
    }
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<GuardedExchangeClient>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::circuit_breaker::ExchangeCircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl ExchangeClient for FlakyClient {
        fn kind(&self) -> ExchangeKind {
            ExchangeKind::Kalshi
        }
        fn is_dry_run(&self) -> bool {
            true
        }
        async fn get_balance(&self) -> Result<Balance> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(TraderError::TransientNetworkError("flaky".into()));
            }
            Ok(Balance {
                available: Decimal::ONE,
                total: Decimal::ONE,
            })
        }
        async fn get_market(&self, _ticker: &str) -> Result<Market> {
            unimplemented!()
        }
        async fn list_markets(&self, _sport: Option<&str>, _max_close_time: DateTime<Utc>) -> Result<Vec<Market>> {
            Ok(vec![])
        }
        async fn place_order(&self, _request: &OrderRequest) -> Result<String> {
            unimplemented!()
        }
        async fn wait_for_fill(&self, _order_id: &str, _timeout_seconds: u64) -> Result<FillOutcome> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn check_slippage(
            &self,
            _ticker: &str,
            _intended_price: Decimal,
            _max_slippage: Decimal,
        ) -> Result<SlippageCheck> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let inner = Arc::new(FlakyClient {
            failures_left: AtomicU32::new(2),
        });
        let breaker = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig {
            base_backoff_ms: 1,
            max_backoff_ms: 2,
            failure_threshold: 10,
            ..Default::default()
        });
        let guarded = GuardedExchangeClient::new(inner, breaker);
        let balance = guarded.get_balance().await.unwrap();
        assert_eq!(balance.available, Decimal::ONE);
    }
}
