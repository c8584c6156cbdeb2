pub mod circuit_breaker;
pub mod factory;
pub mod guarded;
pub mod ticker;
mod traits;

pub use circuit_breaker::{CircuitState, ExchangeCircuitBreaker, ExchangeCircuitBreakerConfig};
pub use factory::build_exchange_client;
pub use guarded::GuardedExchangeClient;
pub use traits::{
    parse_exchange_kind, Balance, ExchangeClient, ExchangeKind, FillOutcome, SlippageCheck,
};
