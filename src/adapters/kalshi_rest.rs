//! Kalshi REST adapter.
//!
//! Kalshi prices contracts in integer cents (1-99); everywhere else in this
//! crate prices are decimal probabilities in [0,1]. The conversion happens
//! only here, at the boundary, per `ExchangeClient`'s documented contract.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{Market, OrderRequest, OrderSide, Side};
use crate::error::{Result, TraderError};
use crate::exchange::{Balance, ExchangeClient, ExchangeKind, FillOutcome, SlippageCheck};

const DEFAULT_KALSHI_API_BASE: &str = "https://api.elections.kalshi.com/trade-api/v2";
const POLL_INTERVAL: Duration = Duration::from_millis(750);

type HmacSha256 = Hmac<Sha256>;

/// Integer cents (1-99) to a decimal probability in [0,1].
fn cents_to_probability(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Decimal probability in [0,1] to integer cents (1-99), rounded.
fn probability_to_cents(price: Decimal) -> i64 {
    (price * Decimal::new(100, 0))
        .round_dp(0)
        .to_i64()
        .unwrap_or(0)
        .clamp(1, 99)
}

/// Kalshi series tickers for the sports the scoreboard registry knows about.
/// Adding a league is a table entry here, matching the scoreboard's own
/// sport registry.
fn series_ticker_for_sport(sport: &str) -> Option<&'static str> {
    match sport.to_ascii_lowercase().as_str() {
        "nba" => Some("KXNBAGAME"),
        "nfl" => Some("KXNFLGAME"),
        "nhl" => Some("KXNHLGAME"),
        "mlb" => Some("KXMLBGAME"),
        "ncaab" => Some("KXNCAABGAME"),
        "ncaaf" => Some("KXNCAAFGAME"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct KalshiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    dry_run: bool,
}

impl KalshiClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        api_secret: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_KALSHI_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .user_agent("trading-orchestrator-kalshi-adapter/0.1")
            .build()
            .map_err(|e| TraderError::Internal(format!("failed to build Kalshi HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            dry_run,
        })
    }

    pub fn from_env(base_url: Option<&str>, dry_run: bool) -> Result<Self> {
        let api_key = std::env::var("KALSHI_API_KEY").ok();
        let api_secret = std::env::var("KALSHI_API_SECRET").ok();
        Self::new(base_url, api_key, api_secret, dry_run)
    }

    fn auth_headers(&self, method: &Method, path: &str) -> Result<HeaderMap> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| TraderError::AuthError("KALSHI_API_KEY is required".to_string()))?;
        let secret = self
            .api_secret
            .as_ref()
            .ok_or_else(|| TraderError::AuthError("KALSHI_API_SECRET is required".to_string()))?;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let sign_payload = format!("{}{}{}", timestamp, method.as_str().to_uppercase(), path);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| TraderError::AuthError(format!("invalid Kalshi secret: {}", e)))?;
        mac.update(sign_payload.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("kalshi-access-key"),
            HeaderValue::from_str(key)
                .map_err(|e| TraderError::AuthError(format!("invalid API key header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("kalshi-access-signature"),
            HeaderValue::from_str(&signature)
                .map_err(|e| TraderError::AuthError(format!("invalid signature header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("kalshi-access-timestamp"),
            HeaderValue::from_str(&timestamp)
                .map_err(|e| TraderError::AuthError(format!("invalid timestamp header: {}", e)))?,
        );

        Ok(headers)
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<Value>,
        require_auth: bool,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method.clone(), &url);

        if let Some(query) = query {
            req = req.query(query);
        }
        if require_auth {
            req = req.headers(self.auth_headers(&method, path)?);
        }
        if let Some(ref body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }

        let resp = req.send().await.map_err(|e| {
            TraderError::TransientNetworkError(format!("{} {}: {}", method, path, e))
        })?;
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TraderError::TransientNetworkError(format!(
                "rate limited on {} {} (retry_after={:?})",
                method, path, retry_after
            )));
        }
        if status.is_server_error() {
            return Err(TraderError::TransientNetworkError(format!(
                "{} {} returned {}: {}",
                method, path, status, text
            )));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TraderError::AuthError(format!(
                "{} {} returned {}: {}",
                method, path, status, text
            )));
        }
        if !status.is_success() {
            return Err(TraderError::ValidationError(format!(
                "{} {} returned {}: {}",
                method, path, status, text
            )));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TraderError::ValidationError(format!("invalid JSON: {}", e)))
    }

    fn pick<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|k| root.get(*k))
    }

    fn pick_str<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a str> {
        Self::pick(root, keys).and_then(|v| v.as_str())
    }

    fn pick_i64(root: &Value, keys: &[&str]) -> Option<i64> {
        Self::pick(root, keys).and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
    }

    fn map_order_status(&self, order: &Value) -> (String, i64) {
        let status = Self::pick_str(order, &["status", "state"])
            .unwrap_or("resting")
            .to_ascii_lowercase();
        let filled = Self::pick_i64(order, &["filled_count", "filled"]).unwrap_or(0);
        (status, filled)
    }

    fn map_market(&self, ticker: &str, value: &Value) -> Result<Market> {
        let root = Self::pick(value, &["market", "data"]).unwrap_or(value);

        let yes_bid = Self::pick_i64(root, &["yes_bid"]).unwrap_or(0);
        let yes_ask = Self::pick_i64(root, &["yes_ask"]).unwrap_or(0);
        let no_bid = Self::pick_i64(root, &["no_bid"]).unwrap_or(0);
        let no_ask = Self::pick_i64(root, &["no_ask"]).unwrap_or(0);

        let yes_price = if yes_ask > 0 {
            cents_to_probability(yes_ask)
        } else {
            cents_to_probability(yes_bid)
        };
        let no_price = if no_ask > 0 {
            cents_to_probability(no_ask)
        } else {
            cents_to_probability(no_bid)
        };

        let title = Self::pick_str(root, &["title", "subtitle"]).unwrap_or(ticker).to_string();
        let close_time = Self::pick_str(root, &["close_time", "expiration_time"])
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Market {
            condition_id: ticker.to_string(),
            yes_token_id: format!("{}:yes", ticker),
            no_token_id: format!("{}:no", ticker),
            question: title,
            sport: String::new(),
            home_team: String::new(),
            away_team: String::new(),
            game_start_time: close_time,
            yes_price,
            no_price,
            volume_24h: Self::pick_i64(root, &["volume_24h", "volume"])
                .map(Decimal::from)
                .unwrap_or(Decimal::ZERO),
            liquidity: Self::pick_i64(root, &["liquidity"])
                .map(|l| cents_to_probability(l) * Decimal::new(100, 0))
                .unwrap_or(Decimal::ZERO),
            spread: (yes_ask - yes_bid).max(0).into(),
        })
    }
}

#[async_trait]
impl ExchangeClient for KalshiClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Kalshi
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn get_balance(&self) -> Result<Balance> {
        if self.dry_run {
            return Ok(Balance {
                available: Decimal::new(100_000, 2),
                total: Decimal::new(100_000, 2),
            });
        }
        let value = self
            .request_json(Method::GET, "/portfolio/balance", None, None, true)
            .await?;
        let balance_cents = Self::pick_i64(&value, &["balance", "available_balance"]).unwrap_or(0);
        let amount = Decimal::new(balance_cents, 2);
        Ok(Balance {
            available: amount,
            total: amount,
        })
    }

    async fn get_market(&self, ticker: &str) -> Result<Market> {
        let path = format!("/markets/{}", ticker);
        let value = self
            .request_json(Method::GET, &path, None, None, false)
            .await?;
        self.map_market(ticker, &value)
    }

    async fn list_markets(&self, sport: Option<&str>, max_close_time: DateTime<Utc>) -> Result<Vec<Market>> {
        let mut query: Vec<(&str, String)> = vec![
            ("status", "open".to_string()),
            ("max_close_ts", max_close_time.timestamp().to_string()),
        ];
        if let Some(series) = sport.and_then(series_ticker_for_sport) {
            query.push(("series_ticker", series.to_string()));
        }

        let value = self
            .request_json(Method::GET, "/markets", Some(&query), None, false)
            .await?;

        let markets = value
            .get("markets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(markets.len());
        for entry in &markets {
            let Some(ticker) = Self::pick_str(entry, &["ticker"]) else {
                continue;
            };
            // Parlay/multi-leg markets carry a non-empty `legs` array; skip them.
            if entry.get("legs").and_then(Value::as_array).is_some_and(|l| !l.is_empty()) {
                continue;
            }
            if let Ok(mut market) = self.map_market(ticker, entry) {
                if let Some(s) = sport {
                    market.sport = s.to_string();
                }
                out.push(market);
            }
        }
        Ok(out)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        if self.dry_run {
            debug!(client_order_id = %request.client_order_id, "dry-run order, not submitted to exchange");
            return Ok(format!("dryrun-{}", request.client_order_id));
        }

        let action = match request.order_side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let side = match request.outcome_side {
            Side::Yes => "yes",
            Side::No => "no",
        };
        let cents = probability_to_cents(request.limit_price);

        let body = json!({
            "ticker": request.condition_id,
            "client_order_id": request.client_order_id,
            "action": action,
            "side": side,
            "type": "limit",
            "count": request.size,
            "yes_price": if side == "yes" { Some(cents) } else { None::<i64> },
            "no_price": if side == "no" { Some(cents) } else { None::<i64> },
            "time_in_force": format!("{:?}", request.time_in_force).to_lowercase(),
        });

        let value = self
            .request_json(Method::POST, "/portfolio/orders", None, Some(body), true)
            .await?;
        let order = Self::pick(&value, &["order"]).unwrap_or(&value);
        let order_id = Self::pick_str(order, &["order_id", "id"])
            .map(ToString::to_string)
            .unwrap_or_else(|| request.client_order_id.clone());
        Ok(order_id)
    }

    async fn wait_for_fill(&self, order_id: &str, timeout_seconds: u64) -> Result<FillOutcome> {
        if self.dry_run {
            return Ok(FillOutcome::Filled);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);
        let path = format!("/portfolio/orders/{}", order_id);

        loop {
            let value = self
                .request_json(Method::GET, &path, None, None, true)
                .await?;
            let order = Self::pick(&value, &["order"]).unwrap_or(&value);
            let (status, _filled) = self.map_order_status(order);

            match status.as_str() {
                "filled" | "executed" => return Ok(FillOutcome::Filled),
                "cancelled" | "canceled" => return Ok(FillOutcome::Cancelled),
                "expired" => return Ok(FillOutcome::Expired),
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(order_id, "order did not reach a terminal state before timeout");
                return Ok(FillOutcome::Timeout);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        let path = format!("/portfolio/orders/{}", order_id);
        self.request_json(Method::DELETE, &path, None, None, true)
            .await
            .map(|_| true)
    }

    async fn check_slippage(
        &self,
        ticker: &str,
        intended_price: Decimal,
        max_slippage: Decimal,
    ) -> Result<SlippageCheck> {
        let market = self.get_market(ticker).await?;
        let observed_best = market.yes_price;
        if intended_price.is_zero() {
            return Ok(SlippageCheck {
                ok: true,
                observed_best,
            });
        }
        let deviation = ((observed_best - intended_price) / intended_price).abs();
        Ok(SlippageCheck {
            ok: deviation <= max_slippage,
            observed_best,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cents_round_trip_through_probability() {
        assert_eq!(cents_to_probability(42), dec!(0.42));
        assert_eq!(probability_to_cents(dec!(0.42)), 42);
    }

    #[test]
    fn probability_to_cents_clamps_to_valid_range() {
        assert_eq!(probability_to_cents(dec!(0.0)), 1);
        assert_eq!(probability_to_cents(dec!(1.0)), 99);
    }

    #[test]
    fn dry_run_client_places_orders_without_network() {
        let client = KalshiClient::new(None, None, None, true).unwrap();
        assert!(client.is_dry_run());
        assert_eq!(client.kind(), ExchangeKind::Kalshi);
    }
}
