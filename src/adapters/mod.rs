pub mod kalshi_rest;
pub mod postgres;

pub use kalshi_rest::KalshiClient;
pub use postgres::{CreatePositionOutcome, PostgresStore, TrackedMarketRecord};
