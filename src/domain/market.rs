use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// How many recent price samples `TrackedGame::record_price` keeps, most
/// recent first — enough for the confidence scorer's trend factor.
pub const PRICE_HISTORY_LEN: usize = 10;

/// Side of a binary outcome market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which team selection the user has configured for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSelection {
    Home,
    Away,
    Both,
    Auto,
}

/// Live status of a scoreboard game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Pre,
    In,
    Post,
}

impl GameStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, GameStatus::In)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, GameStatus::Post)
    }
}

/// A value type produced by Market Discovery: one binary-outcome market on
/// the exchange, with prices already normalized to [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub question: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub game_start_time: DateTime<Utc>,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume_24h: Decimal,
    pub liquidity: Decimal,
    pub spread: Decimal,
}

impl Market {
    pub fn price(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }

    pub fn token_id(&self, side: Side) -> &str {
        match side {
            Side::Yes => &self.yes_token_id,
            Side::No => &self.no_token_id,
        }
    }
}

/// In-memory, per-user record of a game being actively followed.
///
/// Keyed by scoreboard event id once known; during recovery it may
/// temporarily be keyed by condition id until Discovery resolves the real
/// event id, at which point the orchestrator migrates the key in place
/// (see `orchestrator::recovery`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedGame {
    pub event_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub market: Market,
    /// Yes-side price captured once, before the game goes live.
    pub baseline_yes_price: Decimal,
    pub current_yes_price: Decimal,
    /// Most recent YES price first, capped at `PRICE_HISTORY_LEN`; fed to
    /// the confidence scorer's trend factor.
    #[serde(default)]
    pub price_history: VecDeque<Decimal>,
    pub status: GameStatus,
    pub period: u8,
    pub total_periods: u8,
    pub clock: String,
    pub segment: String,
    pub time_remaining_seconds: u64,
    pub home_score: i32,
    pub away_score: i32,
    pub last_update: DateTime<Utc>,
    pub selection: TeamSelection,
    pub position_id: Option<i64>,
    pub is_user_selected: bool,
}

impl TrackedGame {
    pub fn has_position(&self) -> bool {
        self.position_id.is_some()
    }

    /// Record a fresh YES price sample, evicting the oldest once the
    /// history exceeds `PRICE_HISTORY_LEN`.
    pub fn record_price(&mut self, price: Decimal) {
        self.price_history.push_front(price);
        self.price_history.truncate(PRICE_HISTORY_LEN);
    }

    /// Fractional drop from baseline on the YES side; negative if the price
    /// has risen.
    pub fn yes_drop_pct(&self) -> Decimal {
        if self.baseline_yes_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.baseline_yes_price - self.current_yes_price) / self.baseline_yes_price
    }

    /// Fractional drop on the NO side, symmetric to `yes_drop_pct`.
    pub fn no_drop_pct(&self) -> Decimal {
        let baseline_no = Decimal::ONE - self.baseline_yes_price;
        let current_no = Decimal::ONE - self.current_yes_price;
        if baseline_no.is_zero() {
            return Decimal::ZERO;
        }
        (baseline_no - current_no) / baseline_no
    }

    pub fn team_for_side(&self, side: Side) -> &str {
        // By convention YES tracks the home team's win probability.
        match side {
            Side::Yes => &self.home_team,
            Side::No => &self.away_team,
        }
    }

    /// Whether this game is stale enough for the Cleanup loop to evict it
    /// when it has no open position.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        !self.has_position() && Utc::now() - self.last_update > max_age
    }
}

/// Per-sport, per-user trading statistics consulted by the Risk Gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SportStats {
    pub sport: String,
    pub enabled: bool,
    pub priority: u8,
    pub trades_today: u32,
    pub daily_pnl: Decimal,
    pub open_positions: u32,
    pub daily_loss_cap: Decimal,
    pub exposure_cap: Decimal,
}

impl SportStats {
    pub fn new(sport: impl Into<String>, daily_loss_cap: Decimal, exposure_cap: Decimal) -> Self {
        Self {
            sport: sport.into(),
            enabled: true,
            priority: 0,
            trades_today: 0,
            daily_pnl: Decimal::ZERO,
            open_positions: 0,
            daily_loss_cap,
            exposure_cap,
        }
    }

    pub fn within_daily_loss_cap(&self) -> bool {
        self.daily_pnl > -self.daily_loss_cap
    }

    pub fn record_trade(&mut self, pnl: Decimal) {
        self.trades_today += 1;
        self.daily_pnl += pnl;
    }

    pub fn reset_day(&mut self) {
        self.trades_today = 0;
        self.daily_pnl = Decimal::ZERO;
    }
}

/// Order action verbs, distinct from the exchange-facing `OrderSide` used on
/// the wire (which is always BUY/SELL); entry/exit signals speak in terms of
/// the outcome side being bought or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

/// An order that has been placed but has not yet reached a terminal state.
/// Removed from the in-memory map as soon as a terminal status is observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub action: OrderAction,
    pub price: Decimal,
    pub size: u64,
    pub placed_at: DateTime<Utc>,
}

/// The layered view of per-market configuration: market override > sport
/// config > runtime override > built-in default. Built fresh for every
/// Decision Engine evaluation rather than persisted, so it is never stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub is_enabled: bool,
    pub auto_trade: bool,
    pub entry_threshold_drop_pct: Decimal,
    pub absolute_entry_price: Decimal,
    pub min_time_remaining_seconds: u64,
    pub latest_entry_cutoff_seconds: u64,
    pub latest_exit_cutoff_seconds: u64,
    pub allowed_entry_segments: HashSet<String>,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub default_position_size: u64,
    pub max_positions_per_game: u32,
    pub use_kelly_sizing: bool,
    pub kelly_fraction: Decimal,
    pub min_entry_confidence_score: f64,
    pub min_pregame_probability: Option<Decimal>,
    pub min_position_size_usdc: Decimal,
    pub max_position_size_usdc: Decimal,
}

impl EffectiveConfig {
    /// An empty `segment` means the live segment hasn't been observed yet
    /// (e.g. a just-recovered position before the next scoreboard poll) and
    /// is never treated as restricted, regardless of `allowed_entry_segments`.
    pub fn allows_segment(&self, segment: &str) -> bool {
        segment.is_empty() || self.allowed_entry_segments.is_empty() || self.allowed_entry_segments.contains(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_game() -> TrackedGame {
        TrackedGame {
            event_id: "E1".into(),
            sport: "nba".into(),
            home_team: "Warriors".into(),
            away_team: "Lakers".into(),
            market: Market {
                condition_id: "C1".into(),
                yes_token_id: "Y1".into(),
                no_token_id: "N1".into(),
                question: "Will the Warriors win?".into(),
                sport: "nba".into(),
                home_team: "Warriors".into(),
                away_team: "Lakers".into(),
                game_start_time: Utc::now(),
                yes_price: dec!(0.48),
                no_price: dec!(0.52),
                volume_24h: dec!(10000),
                liquidity: dec!(5000),
                spread: dec!(0.02),
            },
            baseline_yes_price: dec!(0.60),
            current_yes_price: dec!(0.48),
            price_history: VecDeque::from([dec!(0.48)]),
            status: GameStatus::In,
            period: 2,
            total_periods: 4,
            clock: "7:00".into(),
            segment: "q2".into(),
            time_remaining_seconds: 420,
            home_score: 40,
            away_score: 55,
            last_update: Utc::now(),
            selection: TeamSelection::Auto,
            position_id: None,
            is_user_selected: true,
        }
    }

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn yes_drop_pct_matches_20_percent_drop_scenario() {
        let game = sample_game();
        // (0.60 - 0.48) / 0.60 = 0.20
        assert_eq!(game.yes_drop_pct(), dec!(0.2));
    }

    #[test]
    fn record_price_keeps_most_recent_first_and_caps_length() {
        let mut game = sample_game();
        game.price_history.clear();
        for i in 0..(PRICE_HISTORY_LEN + 3) {
            game.record_price(Decimal::new(i as i64, 0));
        }
        assert_eq!(game.price_history.len(), PRICE_HISTORY_LEN);
        assert_eq!(game.price_history[0], Decimal::new((PRICE_HISTORY_LEN + 2) as i64, 0));
    }

    #[test]
    fn has_position_reflects_position_id() {
        let mut game = sample_game();
        assert!(!game.has_position());
        game.position_id = Some(42);
        assert!(game.has_position());
    }

    #[test]
    fn effective_config_allows_segment_when_unrestricted() {
        let cfg = EffectiveConfig {
            is_enabled: true,
            auto_trade: true,
            entry_threshold_drop_pct: dec!(0.15),
            absolute_entry_price: dec!(0.30),
            min_time_remaining_seconds: 120,
            latest_entry_cutoff_seconds: 60,
            latest_exit_cutoff_seconds: 30,
            allowed_entry_segments: HashSet::new(),
            take_profit_pct: dec!(0.20),
            stop_loss_pct: dec!(0.15),
            default_position_size: 50,
            max_positions_per_game: 1,
            use_kelly_sizing: false,
            kelly_fraction: dec!(0.25),
            min_entry_confidence_score: 0.6,
            min_pregame_probability: None,
            min_position_size_usdc: dec!(1),
            max_position_size_usdc: dec!(1000),
        };
        assert!(cfg.allows_segment("q1"));

        let mut restricted = cfg;
        restricted
            .allowed_entry_segments
            .extend(["q2".to_string(), "q3".to_string()]);
        assert!(restricted.allows_segment("q2"));
        assert!(!restricted.allows_segment("q4"));
        assert!(restricted.allows_segment(""));
    }

    #[test]
    fn sport_stats_within_daily_loss_cap() {
        let mut stats = SportStats::new("nba", dec!(200), dec!(1000));
        assert!(stats.within_daily_loss_cap());
        stats.record_trade(dec!(-250));
        assert!(!stats.within_daily_loss_cap());
    }
}
