//! Risk Gate (§4.9, first half): per-sport and global limit checks applied
//! to every entry. Pure evaluation over numbers the caller already has;
//! persistence and kill-switch state live in `kill_switch`.

use rust_decimal::Decimal;

use crate::domain::SportStats;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub allow: bool,
    pub reason: Option<String>,
}

impl RiskDecision {
    fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalRiskLimits {
    pub max_daily_loss_usdc: Decimal,
    pub max_portfolio_exposure_usdc: Decimal,
}

/// Approve or deny one entry against per-sport and global risk limits
/// (§4.9). Kill-switch state is checked separately by the Decision Engine
/// before this runs (precondition #2), so this gate only covers loss caps
/// and exposure caps.
pub fn evaluate_entry(
    sport_stats: &SportStats,
    global: &GlobalRiskLimits,
    global_daily_pnl: Decimal,
    global_open_exposure: Decimal,
    sport_open_exposure: Decimal,
    intended_exposure_increase: Decimal,
) -> RiskDecision {
    if !sport_stats.within_daily_loss_cap() {
        return RiskDecision::deny(format!(
            "sport {} exceeded daily loss cap",
            sport_stats.sport
        ));
    }
    if sport_open_exposure + intended_exposure_increase >= sport_stats.exposure_cap {
        return RiskDecision::deny(format!(
            "sport {} exceeded exposure cap",
            sport_stats.sport
        ));
    }
    if global_daily_pnl <= -global.max_daily_loss_usdc {
        return RiskDecision::deny("global daily loss limit reached");
    }
    if global_open_exposure + intended_exposure_increase >= global.max_portfolio_exposure_usdc {
        return RiskDecision::deny("global portfolio exposure limit reached");
    }
    RiskDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> GlobalRiskLimits {
        GlobalRiskLimits {
            max_daily_loss_usdc: dec!(500),
            max_portfolio_exposure_usdc: dec!(5000),
        }
    }

    #[test]
    fn denies_when_sport_daily_loss_cap_breached() {
        let mut stats = SportStats::new("nba", dec!(100), dec!(1000));
        stats.record_trade(dec!(-150));
        let decision = evaluate_entry(&stats, &limits(), dec!(0), dec!(0), dec!(0), dec!(50));
        assert!(!decision.allow);
    }

    #[test]
    fn denies_when_sport_exposure_would_exceed_sport_cap() {
        let stats = SportStats::new("nba", dec!(1000), dec!(500));
        let decision = evaluate_entry(&stats, &limits(), dec!(0), dec!(0), dec!(470), dec!(50));
        assert!(!decision.allow);
        assert!(decision.reason.unwrap().contains("exposure cap"));
    }

    #[test]
    fn denies_when_global_daily_loss_reached() {
        let stats = SportStats::new("nba", dec!(1000), dec!(1000));
        let decision = evaluate_entry(&stats, &limits(), dec!(-600), dec!(0), dec!(0), dec!(50));
        assert!(!decision.allow);
    }

    #[test]
    fn denies_when_exposure_would_exceed_global_cap() {
        let stats = SportStats::new("nba", dec!(1000), dec!(1000));
        let decision = evaluate_entry(&stats, &limits(), dec!(0), dec!(4970), dec!(0), dec!(50));
        assert!(!decision.allow);
    }

    #[test]
    fn allows_when_all_checks_pass() {
        let stats = SportStats::new("nba", dec!(1000), dec!(1000));
        let decision = evaluate_entry(&stats, &limits(), dec!(0), dec!(0), dec!(0), dec!(50));
        assert!(decision.allow);
        assert!(decision.reason.is_none());
    }
}
