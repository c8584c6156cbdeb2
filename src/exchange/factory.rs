use std::sync::Arc;

use crate::adapters::KalshiClient;
use crate::config::AppConfig;
use crate::error::Result;

use super::circuit_breaker::{ExchangeCircuitBreaker, ExchangeCircuitBreakerConfig};
use super::guarded::GuardedExchangeClient;
use super::ExchangeClient;

/// Build the runtime exchange client for a user from the layered config,
/// wrapped in the circuit breaker + retry policy every exchange call goes
/// through.
pub fn build_exchange_client(app_config: &AppConfig, dry_run: bool) -> Result<Arc<dyn ExchangeClient>> {
    let client = KalshiClient::new(
        app_config.exchange.base_url.as_deref(),
        app_config.exchange.api_key.clone(),
        app_config.exchange.api_secret.clone(),
        dry_run,
    )?;
    let breaker = ExchangeCircuitBreaker::new(ExchangeCircuitBreakerConfig::default());
    Ok(Arc::new(GuardedExchangeClient::new(Arc::new(client), breaker)))
}
