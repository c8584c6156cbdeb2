//! Kelly Sizer (§4.7): a pure function from bankroll, price, and confidence
//! to a contract count. No I/O — historical win-rate is passed in by the
//! caller, sourced from the Position Store.

use rust_decimal::Decimal;

const MIN_EDGE: f64 = 0.02;
const MAX_KELLY_FRACTION: f64 = 0.5;
const HISTORY_CUTOFF_TRADES: u32 = 20;
const BLEND_SATURATION_TRADES: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KellyInputs {
    pub bankroll: f64,
    pub price: f64,
    pub confidence: f64,
    pub historical_win_rate: Option<f64>,
    pub historical_trade_count: u32,
    pub kelly_fraction: f64,
    pub min_position_size: f64,
    pub max_position_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KellySizing {
    pub recommended_contracts: u64,
    pub dollar_size: f64,
    pub edge: f64,
    pub kelly_fraction_applied: f64,
    pub reason: String,
}

fn win_probability_from_confidence(confidence: f64) -> f64 {
    0.5 + (confidence - 0.5) * 0.3
}

fn blend_win_probability(raw: f64, inputs: &KellyInputs) -> f64 {
    let blended = match inputs.historical_win_rate {
        Some(h) if inputs.historical_trade_count >= HISTORY_CUTOFF_TRADES => {
            let w = (inputs.historical_trade_count as f64 / BLEND_SATURATION_TRADES).min(1.0);
            raw * (1.0 - w) + h * w
        }
        _ => raw,
    };
    blended.clamp(0.01, 0.99)
}

fn zero_contracts(reason: &str, edge: f64) -> KellySizing {
    KellySizing {
        recommended_contracts: 0,
        dollar_size: 0.0,
        edge,
        kelly_fraction_applied: 0.0,
        reason: reason.to_string(),
    }
}

/// Compute a Kelly-sized position. Returns zero contracts (never an error)
/// when the edge doesn't clear the floor or inputs are degenerate.
pub fn size_position(inputs: &KellyInputs) -> KellySizing {
    if inputs.price <= 0.0 || inputs.price >= 1.0 {
        return zero_contracts("invalid price", 0.0);
    }

    let raw_q = win_probability_from_confidence(inputs.confidence);
    let q_prime = blend_win_probability(raw_q, inputs);

    let edge = q_prime / inputs.price - 1.0;
    if edge <= MIN_EDGE {
        return zero_contracts("insufficient edge", edge);
    }

    let b = 1.0 / inputs.price - 1.0;
    let full_kelly = if b > 0.0 {
        ((q_prime * b) - (1.0 - q_prime)) / b
    } else {
        0.0
    }
    .max(0.0);

    let adjusted_kelly = (full_kelly * inputs.kelly_fraction).min(MAX_KELLY_FRACTION);

    let dollar_size = (inputs.bankroll * adjusted_kelly)
        .clamp(inputs.min_position_size, inputs.max_position_size);

    let contracts = (dollar_size / inputs.price).floor() as u64;
    let recommended_contracts = contracts.max(1);

    KellySizing {
        recommended_contracts,
        dollar_size,
        edge,
        kelly_fraction_applied: adjusted_kelly,
        reason: "kelly sized".to_string(),
    }
}

/// Applies the losing-streak size reduction multiplier on top of an
/// already-sized position: 75% after two consecutive losses, 50% after
/// three or more, reset to 100% on any win (§4.8 "optional losing-streak
/// reduction multiplier").
pub fn losing_streak_multiplier(consecutive_losses: u32) -> Decimal {
    match consecutive_losses {
        0 | 1 => Decimal::ONE,
        2 => Decimal::new(75, 2),
        _ => Decimal::new(50, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> KellyInputs {
        KellyInputs {
            bankroll: 1000.0,
            price: 0.48,
            confidence: 0.78,
            historical_win_rate: None,
            historical_trade_count: 0,
            kelly_fraction: 0.25,
            min_position_size: 10.0,
            max_position_size: 500.0,
        }
    }

    #[test]
    fn insufficient_edge_returns_zero_contracts() {
        let mut inputs = base_inputs();
        inputs.price = 0.95;
        inputs.confidence = 0.5;
        let result = size_position(&inputs);
        assert_eq!(result.recommended_contracts, 0);
        assert_eq!(result.reason, "insufficient edge");
        assert!(result.edge <= MIN_EDGE);
    }

    #[test]
    fn kelly_round_trip_property_zero_edge_means_zero_contracts() {
        // edge <= 0.02 => recommended_contracts = 0
        let mut inputs = base_inputs();
        inputs.price = 0.60;
        inputs.confidence = 0.55;
        let result = size_position(&inputs);
        if result.edge <= MIN_EDGE {
            assert_eq!(result.recommended_contracts, 0);
        }
    }

    #[test]
    fn sufficient_edge_sizes_at_least_one_contract() {
        let inputs = base_inputs();
        let result = size_position(&inputs);
        assert!(result.edge > MIN_EDGE);
        assert!(result.recommended_contracts >= 1);
    }

    #[test]
    fn dollar_size_respects_min_and_max_clamp() {
        let mut inputs = base_inputs();
        inputs.bankroll = 10.0;
        let result = size_position(&inputs);
        if result.recommended_contracts > 0 {
            assert!(result.dollar_size >= inputs.min_position_size - f64::EPSILON);
        }
    }

    #[test]
    fn historical_win_rate_blends_only_past_cutoff() {
        let mut below_cutoff = base_inputs();
        below_cutoff.historical_win_rate = Some(0.1);
        below_cutoff.historical_trade_count = 5;
        let mut above_cutoff = base_inputs();
        above_cutoff.historical_win_rate = Some(0.1);
        above_cutoff.historical_trade_count = 50;

        let below = size_position(&below_cutoff);
        let above = size_position(&above_cutoff);
        // Below cutoff ignores the (bad) historical rate, so edge stays high;
        // above cutoff blends it in and drags the edge down.
        assert!(below.edge > above.edge);
    }

    #[test]
    fn losing_streak_multiplier_table() {
        assert_eq!(losing_streak_multiplier(0), Decimal::ONE);
        assert_eq!(losing_streak_multiplier(1), Decimal::ONE);
        assert_eq!(losing_streak_multiplier(2), Decimal::new(75, 2));
        assert_eq!(losing_streak_multiplier(3), Decimal::new(50, 2));
        assert_eq!(losing_streak_multiplier(10), Decimal::new(50, 2));
    }
}
