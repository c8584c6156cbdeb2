use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{Market, OrderRequest};
use crate::error::{Result, TraderError};

/// Which concrete exchange a client implementation talks to. The decision
/// engine and orchestrator speak only in terms of `ExchangeClient` and never
/// match on this — it exists for logging and config, matching how the code
/// base supports more than one exchange behind the same capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Kalshi,
    Polymarket,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kalshi => "kalshi",
            Self::Polymarket => "polymarket",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kalshi" => Ok(Self::Kalshi),
            "polymarket" | "pm" => Ok(Self::Polymarket),
            _ => Err("invalid exchange; expected kalshi|polymarket"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| TraderError::ValidationError(e.to_string()))
}

/// Account balance in the exchange's settlement currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub total: Decimal,
}

/// Terminal or near-terminal outcome of `wait_for_fill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillOutcome {
    Filled,
    Cancelled,
    Expired,
    /// No terminal status observed within the timeout; caller cancels and
    /// treats this as not-filled.
    Timeout,
}

/// Result of a slippage check against the live top-of-book.
#[derive(Debug, Clone, Copy)]
pub struct SlippageCheck {
    pub ok: bool,
    pub observed_best: Decimal,
}

/// The capability set every exchange adapter implements. All prices in and
/// out of this trait are decimal probabilities in [0,1]; the cents-based
/// wire format of a given exchange is converted at the adapter boundary and
/// never leaks past it.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    fn is_dry_run(&self) -> bool;

    /// Fails with `TransientNetworkError` (retryable) or `AuthError` (fatal).
    async fn get_balance(&self) -> Result<Balance>;

    /// Current best bid/ask/last for one market, normalized to [0,1].
    async fn get_market(&self, ticker: &str) -> Result<Market>;

    /// Enumerates tradable event markets, optionally narrowed to one sport's
    /// series, up to `max_close_time`. Feeds Market Discovery; parlay/
    /// multi-leg markets are filtered out by the caller, not here.
    async fn list_markets(&self, sport: Option<&str>, max_close_time: DateTime<Utc>) -> Result<Vec<Market>>;

    /// Places an order for `size` contracts (integer) at `price` in [0,1].
    /// Returns the exchange order id extracted from either a flat or nested
    /// response envelope, matching the exchange's actual response shape.
    async fn place_order(&self, request: &OrderRequest) -> Result<String>;

    /// Polls order status until terminal or `timeout_seconds` elapses. A
    /// timeout returns `FillOutcome::Timeout` without cancelling — the
    /// caller decides whether to cancel.
    async fn wait_for_fill(&self, order_id: &str, timeout_seconds: u64) -> Result<FillOutcome>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    /// Reads top-of-book and compares it against an intended price:
    /// `ok = |observed - intended| / intended <= max_slippage`.
    async fn check_slippage(
        &self,
        ticker: &str,
        intended_price: Decimal,
        max_slippage: Decimal,
    ) -> Result<SlippageCheck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exchange_kind_accepts_aliases() {
        assert_eq!(parse_exchange_kind("kalshi").unwrap(), ExchangeKind::Kalshi);
        assert_eq!(
            parse_exchange_kind("polymarket").unwrap(),
            ExchangeKind::Polymarket
        );
        assert_eq!(parse_exchange_kind("pm").unwrap(), ExchangeKind::Polymarket);
    }

    #[test]
    fn parse_exchange_kind_rejects_unknown_value() {
        assert!(parse_exchange_kind("foo").is_err());
    }
}
