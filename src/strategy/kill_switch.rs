//! Kill-Switch Monitor (§4.9, second half): a 30-second loop evaluating
//! five independent trigger conditions, backed by a persistent flag in
//! `global_settings`. Once triggered, every entry is rejected until a
//! manual reset — this module only decides *whether* to trip and what the
//! unwind price should be; persistence is the caller's job via
//! `PostgresStore`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const LOSS_STREAK_TRIGGER_RATIO_NUM: usize = 4;
const LOSS_STREAK_TRIGGER_RATIO_DEN: usize = 5;
const API_ERROR_TRIGGER_COUNT: u32 = 10;
const API_ERROR_WINDOW_SECONDS: i64 = 300;
/// Unwind price discount for a long exit forced by the kill switch: 2%
/// below the last observed price, matching the orchestrator's general
/// emergency-unwind convention (§4.10 emergency shutdown).
const UNWIND_DISCOUNT: Decimal = dec!(0.98);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitchTrigger {
    DailyLossLimit,
    LossStreak,
    ApiErrorBurst,
    OrphanedPositions,
    Manual,
}

impl KillSwitchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSwitchTrigger::DailyLossLimit => "daily_loss_limit",
            KillSwitchTrigger::LossStreak => "loss_streak",
            KillSwitchTrigger::ApiErrorBurst => "api_error_burst",
            KillSwitchTrigger::OrphanedPositions => "orphaned_positions",
            KillSwitchTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KillSwitchInputs {
    pub daily_pnl: Decimal,
    pub max_daily_loss_usdc: Decimal,
    /// Most recent trade outcome first; `true` = win.
    pub recent_trade_outcomes: Vec<bool>,
    pub api_errors_in_window: u32,
    pub orphaned_order_count: u32,
}

/// Evaluate all five triggers; returns the first one that fires.
pub fn evaluate(inputs: &KillSwitchInputs) -> Option<KillSwitchTrigger> {
    if inputs.daily_pnl <= -inputs.max_daily_loss_usdc {
        return Some(KillSwitchTrigger::DailyLossLimit);
    }

    let sample = inputs
        .recent_trade_outcomes
        .iter()
        .take(LOSS_STREAK_TRIGGER_RATIO_DEN)
        .collect::<Vec<_>>();
    if sample.len() == LOSS_STREAK_TRIGGER_RATIO_DEN {
        let losses = sample.iter().filter(|win| !**win).count();
        if losses >= LOSS_STREAK_TRIGGER_RATIO_NUM {
            return Some(KillSwitchTrigger::LossStreak);
        }
    }

    if inputs.api_errors_in_window >= API_ERROR_TRIGGER_COUNT {
        return Some(KillSwitchTrigger::ApiErrorBurst);
    }

    if inputs.orphaned_order_count > 0 {
        return Some(KillSwitchTrigger::OrphanedPositions);
    }

    None
}

/// Price to submit for a forced long-exit unwind when the kill switch
/// fires: 2% below the last observed price.
pub fn unwind_price(last_price: Decimal) -> Decimal {
    last_price * UNWIND_DISCOUNT
}

/// Whether an API error observed at `error_at` still counts toward the
/// burst trigger as of `now`.
pub fn within_error_window(error_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - error_at).num_seconds() <= API_ERROR_WINDOW_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> KillSwitchInputs {
        KillSwitchInputs {
            daily_pnl: dec!(0),
            max_daily_loss_usdc: dec!(500),
            recent_trade_outcomes: vec![],
            api_errors_in_window: 0,
            orphaned_order_count: 0,
        }
    }

    #[test]
    fn triggers_on_daily_loss_limit() {
        let mut inputs = base_inputs();
        inputs.daily_pnl = dec!(-500);
        assert_eq!(evaluate(&inputs), Some(KillSwitchTrigger::DailyLossLimit));
    }

    #[test]
    fn four_of_five_recent_losses_triggers_loss_streak() {
        // pnl = [-5,-3,-2,+1,-4] -> 4/5 losses.
        let mut inputs = base_inputs();
        inputs.recent_trade_outcomes = vec![false, false, false, true, false];
        assert_eq!(evaluate(&inputs), Some(KillSwitchTrigger::LossStreak));
    }

    #[test]
    fn does_not_trigger_on_loss_streak_below_threshold() {
        let mut inputs = base_inputs();
        inputs.recent_trade_outcomes = vec![false, false, true, true, false];
        assert_eq!(evaluate(&inputs), None);
    }

    #[test]
    fn triggers_on_api_error_burst() {
        let mut inputs = base_inputs();
        inputs.api_errors_in_window = 10;
        assert_eq!(evaluate(&inputs), Some(KillSwitchTrigger::ApiErrorBurst));
    }

    #[test]
    fn triggers_on_orphaned_positions() {
        let mut inputs = base_inputs();
        inputs.orphaned_order_count = 1;
        assert_eq!(evaluate(&inputs), Some(KillSwitchTrigger::OrphanedPositions));
    }

    #[test]
    fn unwind_price_is_two_percent_below_last() {
        assert_eq!(unwind_price(dec!(0.50)), dec!(0.4900));
    }

    #[test]
    fn no_trigger_when_everything_nominal() {
        assert_eq!(evaluate(&base_inputs()), None);
    }
}
