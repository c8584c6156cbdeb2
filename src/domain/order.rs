use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

/// Order side on the wire (always BUY or SELL; distinct from the outcome
/// `Side` being bought or sold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Cancelled
    GTC,
    /// Fill Or Kill
    FOK,
    /// Immediate Or Cancel
    IOC,
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
    /// No exchange response observed within `wait_for_fill`'s timeout; the
    /// order may still fill later but the caller treats it as not-filled.
    Timeout,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
                | OrderStatus::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

/// What the order is for, from the decision engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPurpose {
    Entry,
    Exit,
}

/// Order request: what we want the exchange to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub outcome_side: Side,
    pub order_side: OrderSide,
    pub purpose: OrderPurpose,
    pub size: u64,
    pub limit_price: Decimal,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn entry(condition_id: String, token_id: String, side: Side, size: u64, price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            condition_id,
            token_id,
            outcome_side: side,
            order_side: OrderSide::Buy,
            purpose: OrderPurpose::Entry,
            size,
            limit_price: price,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GTC,
        }
    }

    pub fn exit(condition_id: String, token_id: String, side: Side, size: u64, price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            condition_id,
            token_id,
            outcome_side: side,
            order_side: OrderSide::Sell,
            purpose: OrderPurpose::Exit,
            size,
            limit_price: price,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GTC,
        }
    }
}

/// Order tracked by our system, mirroring the exchange's view of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub position_id: Option<i64>,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub condition_id: String,
    pub token_id: String,
    pub outcome_side: Side,
    pub order_side: OrderSide,
    pub size: u64,
    pub limit_price: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub filled_size: u64,
    pub status: OrderStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(request: &OrderRequest) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            position_id: None,
            client_order_id: request.client_order_id.clone(),
            exchange_order_id: None,
            condition_id: request.condition_id.clone(),
            token_id: request.token_id.clone(),
            outcome_side: request.outcome_side,
            order_side: request.order_side,
            size: request.size,
            limit_price: request.limit_price,
            avg_fill_price: None,
            filled_size: 0,
            status: OrderStatus::Pending,
            submitted_at: None,
            filled_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn value(&self) -> Decimal {
        self.limit_price * Decimal::from(self.size)
    }

    pub fn fill_pct(&self) -> Decimal {
        if self.size == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.filled_size) / Decimal::from(self.size) * Decimal::from(100)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.status.is_filled() && self.filled_size >= self.size
    }

    pub fn fill_value(&self) -> Decimal {
        match self.avg_fill_price {
            Some(price) => price * Decimal::from(self.filled_size),
            None => Decimal::ZERO,
        }
    }
}

/// Fill event observed from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub trade_id: String,
    pub price: Decimal,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub fee: Decimal,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    GameFinished,
    TimeExit,
    SegmentExit,
    EmergencyStop,
    KillSwitch,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::GameFinished => "game_finished",
            ExitReason::TimeExit => "time_exit",
            ExitReason::SegmentExit => "segment_exit",
            ExitReason::EmergencyStop => "emergency_stop",
            ExitReason::KillSwitch => "kill_switch",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A position in one token of one market, persisted in the Position Store.
///
/// Invariants: at most one open position per (user, condition_id); once
/// closed, immutable; `realized_pnl = exit_proceeds - entry_cost` exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Option<i64>,
    pub user_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub status: PositionStatus,
    pub team_name: String,

    pub entry_price: Decimal,
    pub entry_size: u64,
    pub entry_cost: Decimal,
    pub entry_reason: String,
    pub entry_order_id: String,
    pub entry_confidence_score: f64,
    pub entry_timestamp: DateTime<Utc>,

    pub exit_price: Option<Decimal>,
    pub exit_size: Option<u64>,
    pub exit_proceeds: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub exit_order_id: Option<String>,
    pub realized_pnl: Option<Decimal>,
    pub close_timestamp: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    /// Unrealized P&L given the current market price for this token.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        current_price * Decimal::from(self.entry_size) - self.entry_cost
    }

    pub fn unrealized_pnl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (current_price - self.entry_price) / self.entry_price
    }

    /// Close the position in place. Returns the realized P&L. Calling this
    /// twice on an already-closed position is a no-op that returns the
    /// previously recorded P&L.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        exit_size: u64,
        exit_proceeds: Decimal,
        reason: ExitReason,
        exit_order_id: String,
    ) -> Decimal {
        if !self.is_open() {
            return self.realized_pnl.unwrap_or(Decimal::ZERO);
        }
        let pnl = exit_proceeds - self.entry_cost;
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_size = Some(exit_size);
        self.exit_proceeds = Some(exit_proceeds);
        self.exit_reason = Some(reason);
        self.exit_order_id = Some(exit_order_id);
        self.realized_pnl = Some(pnl);
        self.close_timestamp = Some(Utc::now());
        pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_position() -> Position {
        Position {
            id: Some(1),
            user_id: "u1".into(),
            condition_id: "C1".into(),
            token_id: "Y1".into(),
            side: Side::Yes,
            status: PositionStatus::Open,
            team_name: "Warriors".into(),
            entry_price: dec!(0.40),
            entry_size: 100,
            entry_cost: dec!(40),
            entry_reason: "YES price drop: 20.0%".into(),
            entry_order_id: "o1".into(),
            entry_confidence_score: 0.78,
            entry_timestamp: Utc::now(),
            exit_price: None,
            exit_size: None,
            exit_proceeds: None,
            exit_reason: None,
            exit_order_id: None,
            realized_pnl: None,
            close_timestamp: None,
        }
    }

    #[test]
    fn order_fill_pct_tracks_partial_fills() {
        let mut order = Order::from_request(&OrderRequest::entry(
            "C1".into(),
            "Y1".into(),
            Side::Yes,
            100,
            dec!(0.45),
        ));
        order.filled_size = 50;
        assert_eq!(order.fill_pct(), dec!(50));
        order.filled_size = 100;
        order.status = OrderStatus::Filled;
        assert_eq!(order.fill_pct(), dec!(100));
        assert!(order.is_fully_filled());
    }

    #[test]
    fn take_profit_close_realizes_pnl_proportional_to_move() {
        // entry 0.40, exit 0.50, take_profit_pct 0.20.
        let mut position = open_position();
        let exit_proceeds = dec!(0.50) * Decimal::from(100u64);
        let pnl = position.close(dec!(0.50), 100, exit_proceeds, ExitReason::TakeProfit, "o2".into());
        assert_eq!(pnl, dec!(10));
        assert_eq!(position.realized_pnl, Some(dec!(10)));
        assert!(!position.is_open());
    }

    #[test]
    fn closing_twice_is_a_no_op_on_the_second_call() {
        let mut position = open_position();
        let first = position.close(dec!(0.50), 100, dec!(50), ExitReason::TakeProfit, "o2".into());
        let second = position.close(dec!(0.10), 100, dec!(10), ExitReason::StopLoss, "o3".into());
        assert_eq!(first, second);
        assert_eq!(position.exit_reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn realized_pnl_equals_exit_proceeds_minus_entry_cost() {
        let mut position = open_position();
        let pnl = position.close(dec!(0.55), 100, dec!(55), ExitReason::GameFinished, "o2".into());
        assert_eq!(pnl, dec!(55) - position.entry_cost);
    }
}
