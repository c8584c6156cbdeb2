//! Decision Engine (§4.8): applies `EffectiveConfig` to a tracked game and
//! either emits an entry/exit signal or nothing. Pure with respect to its
//! inputs — it never places orders or talks to the network; the
//! orchestrator's execution path does that after the Risk Gate approves.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::{EffectiveConfig, Market, OrderAction, Side, TrackedGame};

use super::confidence::{self, ConfidenceInputs, ConfidenceScore};
use super::kelly::{self, KellyInputs, KellySizing};

#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub side: Side,
    pub token_id: String,
    pub price: Decimal,
    pub size: u64,
    pub reason: String,
    pub confidence_score: f64,
    pub confidence_breakdown: ConfidenceScore,
    pub team: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReasonKind {
    EmergencyStop,
    TakeProfit,
    StopLoss,
    GameFinished,
    RestrictedSegment,
    TimeExit,
}

impl ExitReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReasonKind::EmergencyStop => "emergency_stop",
            ExitReasonKind::TakeProfit => "take_profit",
            ExitReasonKind::StopLoss => "stop_loss",
            ExitReasonKind::GameFinished => "game_finished",
            ExitReasonKind::RestrictedSegment => "restricted_segment",
            ExitReasonKind::TimeExit => "time_exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReasonKind,
}

/// Everything the Decision Engine consults besides the game and config
/// that isn't itself a pure function of `TrackedGame` — kill-switch state,
/// per-team/per-market position state, and whatever the Risk Gate has
/// already decided. The orchestrator assembles this once per tick.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub kill_switch_active: bool,
    pub emergency_stop: bool,
    pub open_positions_for_market: u32,
    pub has_open_position_for_team: bool,
    pub risk_gate_allows: bool,
    pub bankroll: f64,
    pub historical_win_rate: Option<f64>,
    pub historical_trade_count: u32,
    pub losing_streak_multiplier: Decimal,
    pub volume_24h: Option<f64>,
    pub recent_prices: Option<Vec<f64>>,
    pub score_differential: Option<i32>,
    pub spread_bps: Option<f64>,
}

fn is_live(game: &TrackedGame, market: &Market, now: chrono::DateTime<chrono::Utc>) -> bool {
    if game.status.is_live() {
        return true;
    }
    // market-time fallback when the scoreboard is stale.
    now >= market.game_start_time
}

fn price_condition_met(
    side: Side,
    game: &TrackedGame,
    config: &EffectiveConfig,
) -> bool {
    match side {
        Side::Yes => {
            game.yes_drop_pct() >= config.entry_threshold_drop_pct
                || game.current_yes_price <= config.absolute_entry_price
        }
        Side::No => {
            let current_no = Decimal::ONE - game.current_yes_price;
            game.no_drop_pct() >= config.entry_threshold_drop_pct
                || current_no <= config.absolute_entry_price
        }
    }
}

fn confidence_inputs_for(
    side: Side,
    game: &TrackedGame,
    ctx: &DecisionContext,
) -> ConfidenceInputs {
    let (baseline, current) = match side {
        Side::Yes => (game.baseline_yes_price, game.current_yes_price),
        Side::No => (
            Decimal::ONE - game.baseline_yes_price,
            Decimal::ONE - game.current_yes_price,
        ),
    };
    ConfidenceInputs {
        baseline_price: baseline.to_f64().unwrap_or(0.0),
        current_price: current.to_f64().unwrap_or(0.0),
        time_remaining_seconds: Some(game.time_remaining_seconds),
        period: game.period,
        total_periods: game.total_periods,
        volume_24h: ctx.volume_24h,
        recent_prices: ctx.recent_prices.clone(),
        score_differential: ctx.score_differential,
        spread_bps: ctx.spread_bps,
    }
}

/// Entry precondition chain, in order (§4.8). The first failing check
/// short-circuits with no signal — this function never returns partial
/// progress, only `None` or a fully-formed `EntrySignal`.
pub fn evaluate_entry(
    game: &TrackedGame,
    config: &EffectiveConfig,
    ctx: &DecisionContext,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<EntrySignal> {
    // 1. enabled + auto_trade
    if !config.is_enabled || !config.auto_trade {
        return None;
    }
    // 2. kill switch
    if ctx.kill_switch_active {
        return None;
    }
    // 3. game live (scoreboard OR market-time fallback)
    if !is_live(game, &game.market, now) {
        return None;
    }
    // 4. segment allowed
    if !config.allows_segment(&game.segment) {
        return None;
    }
    // 5. time remaining thresholds
    if game.time_remaining_seconds < config.min_time_remaining_seconds
        || game.time_remaining_seconds < config.latest_entry_cutoff_seconds
    {
        return None;
    }
    // 6. per-market position cap
    if ctx.open_positions_for_market >= config.max_positions_per_game {
        return None;
    }
    // 7. risk gate (daily loss / exposure)
    if !ctx.risk_gate_allows {
        return None;
    }

    // 8. price condition, either side, determined by which side actually
    // satisfies the drop/absolute-price test.
    let side = if price_condition_met(Side::Yes, game, config) {
        Side::Yes
    } else if price_condition_met(Side::No, game, config) {
        Side::No
    } else {
        return None;
    };

    // 9. pre-game probability floor
    if let Some(floor) = config.min_pregame_probability {
        if game.baseline_yes_price < floor {
            return None;
        }
    }

    // 10. single position per team
    if ctx.has_open_position_for_team {
        return None;
    }

    // 11. confidence threshold
    let inputs = confidence_inputs_for(side, game, ctx);
    let confidence = confidence::score(&inputs, config.min_entry_confidence_score);
    if confidence.overall < config.min_entry_confidence_score {
        return None;
    }

    let drop_pct = match side {
        Side::Yes => game.yes_drop_pct(),
        Side::No => game.no_drop_pct(),
    };
    let price = match side {
        Side::Yes => game.current_yes_price,
        Side::No => Decimal::ONE - game.current_yes_price,
    };

    let size = if config.use_kelly_sizing {
        let kelly_inputs = KellyInputs {
            bankroll: ctx.bankroll,
            price: price.to_f64().unwrap_or(0.5),
            confidence: confidence.overall,
            historical_win_rate: ctx.historical_win_rate,
            historical_trade_count: ctx.historical_trade_count,
            kelly_fraction: config.kelly_fraction.to_f64().unwrap_or(0.25),
            min_position_size: config.min_position_size_usdc.to_f64().unwrap_or(1.0),
            max_position_size: config.max_position_size_usdc.to_f64().unwrap_or(f64::MAX),
        };
        let sizing: KellySizing = kelly::size_position(&kelly_inputs);
        if sizing.recommended_contracts == 0 {
            return None;
        }
        sizing.recommended_contracts
    } else {
        config.default_position_size
    };

    let adjusted_size = (Decimal::from(size) * ctx.losing_streak_multiplier)
        .to_f64()
        .map(|v| v.floor() as u64)
        .unwrap_or(size)
        .max(1);

    let team = game.team_for_side(side).to_string();
    let token_id = game.market.token_id(side).to_string();
    let reason = format!("{} price drop: {:.1}%", side.as_str(), drop_pct * Decimal::from(100));

    Some(EntrySignal {
        side,
        token_id,
        price,
        size: adjusted_size,
        reason,
        confidence_score: confidence.overall,
        confidence_breakdown: confidence,
        team,
    })
}

/// Exit preconditions, checked in order for every open position on every
/// tick (§4.8). Returns the first matching reason.
pub fn evaluate_exit(
    entry_price: Decimal,
    current_price: Decimal,
    config: &EffectiveConfig,
    game: &TrackedGame,
    emergency_stop: bool,
) -> Option<ExitSignal> {
    if emergency_stop {
        return Some(ExitSignal {
            reason: ExitReasonKind::EmergencyStop,
        });
    }

    if entry_price.is_zero() {
        return None;
    }
    let pnl_pct = (current_price - entry_price) / entry_price;

    if pnl_pct >= config.take_profit_pct {
        return Some(ExitSignal {
            reason: ExitReasonKind::TakeProfit,
        });
    }
    if pnl_pct <= -config.stop_loss_pct {
        return Some(ExitSignal {
            reason: ExitReasonKind::StopLoss,
        });
    }
    if game.status.is_finished() {
        return Some(ExitSignal {
            reason: ExitReasonKind::GameFinished,
        });
    }
    if !config.allows_segment(&game.segment) {
        return Some(ExitSignal {
            reason: ExitReasonKind::RestrictedSegment,
        });
    }
    if game.time_remaining_seconds <= config.latest_exit_cutoff_seconds {
        return Some(ExitSignal {
            reason: ExitReasonKind::TimeExit,
        });
    }
    None
}

/// Which order action an entry/exit signal corresponds to, for the
/// execution path's bookkeeping.
pub fn action_for_entry() -> OrderAction {
    OrderAction::Buy
}

pub fn action_for_exit() -> OrderAction {
    OrderAction::Sell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameStatus, TeamSelection};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn market() -> Market {
        Market {
            condition_id: "C1".into(),
            yes_token_id: "Y1".into(),
            no_token_id: "N1".into(),
            question: "Will the Warriors win?".into(),
            sport: "nba".into(),
            home_team: "Warriors".into(),
            away_team: "Lakers".into(),
            game_start_time: Utc::now() - chrono::Duration::hours(1),
            yes_price: dec!(0.48),
            no_price: dec!(0.52),
            volume_24h: dec!(10000),
            liquidity: dec!(5000),
            spread: dec!(0.01),
        }
    }

    fn game() -> TrackedGame {
        TrackedGame {
            event_id: "E1".into(),
            sport: "nba".into(),
            home_team: "Warriors".into(),
            away_team: "Lakers".into(),
            market: market(),
            baseline_yes_price: dec!(0.60),
            current_yes_price: dec!(0.48),
            price_history: std::collections::VecDeque::from([dec!(0.48)]),
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

    fn config() -> EffectiveConfig {
        EffectiveConfig {
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
        }
    }

    fn ctx() -> DecisionContext {
        DecisionContext {
            kill_switch_active: false,
            emergency_stop: false,
            open_positions_for_market: 0,
            has_open_position_for_team: false,
            risk_gate_allows: true,
            bankroll: 1000.0,
            historical_win_rate: None,
            historical_trade_count: 0,
            losing_streak_multiplier: Decimal::ONE,
            volume_24h: None,
            recent_prices: None,
            score_differential: None,
            spread_bps: None,
        }
    }

    #[test]
    fn twenty_percent_price_drop_emits_entry_signal() {
        let signal = evaluate_entry(&game(), &config(), &ctx(), Utc::now()).expect("signal");
        assert_eq!(signal.side, Side::Yes);
        assert_eq!(signal.price, dec!(0.48));
        assert!(signal.reason.starts_with("YES price drop"));
    }

    #[test]
    fn existing_open_position_on_team_blocks_entry() {
        let mut context = ctx();
        context.has_open_position_for_team = true;
        assert!(evaluate_entry(&game(), &config(), &context, Utc::now()).is_none());
    }

    #[test]
    fn kill_switch_blocks_every_entry() {
        let mut context = ctx();
        context.kill_switch_active = true;
        assert!(evaluate_entry(&game(), &config(), &context, Utc::now()).is_none());
    }

    #[test]
    fn auto_trade_disabled_blocks_entry() {
        let mut cfg = config();
        cfg.auto_trade = false;
        assert!(evaluate_entry(&game(), &cfg, &ctx(), Utc::now()).is_none());
    }

    #[test]
    fn take_profit_threshold_emits_exit() {
        let signal = evaluate_exit(dec!(0.40), dec!(0.50), &config(), &game(), false).unwrap();
        assert_eq!(signal.reason, ExitReasonKind::TakeProfit);
    }

    #[test]
    fn emergency_stop_always_wins_exit_evaluation() {
        let signal = evaluate_exit(dec!(0.40), dec!(0.41), &config(), &game(), true).unwrap();
        assert_eq!(signal.reason, ExitReasonKind::EmergencyStop);
    }

    #[test]
    fn game_finished_triggers_exit_when_no_pnl_threshold_hit() {
        let mut finished_game = game();
        finished_game.status = GameStatus::Post;
        let signal = evaluate_exit(dec!(0.40), dec!(0.41), &config(), &finished_game, false).unwrap();
        assert_eq!(signal.reason, ExitReasonKind::GameFinished);
    }

    #[test]
    fn time_exit_fires_when_below_latest_exit_cutoff() {
        let mut late_game = game();
        late_game.time_remaining_seconds = 10;
        let signal = evaluate_exit(dec!(0.40), dec!(0.41), &config(), &late_game, false).unwrap();
        assert_eq!(signal.reason, ExitReasonKind::TimeExit);
    }
}
