//! Confidence Scorer (§4.6): six weighted factors, each a monotone
//! piecewise function into [0,1], combined into an overall score plus a
//! textual recommendation.

use serde::{Deserialize, Serialize};

const WEIGHT_PRICE_DROP: f64 = 0.30;
const WEIGHT_TIME_REMAINING: f64 = 0.20;
const WEIGHT_VOLUME: f64 = 0.15;
const WEIGHT_TREND: f64 = 0.15;
const WEIGHT_GAME_STATE: f64 = 0.10;
const WEIGHT_SPREAD: f64 = 0.10;

const NEUTRAL: f64 = 0.5;

/// Everything the scorer needs for one evaluation. Optional fields score
/// neutral (0.5) when absent rather than dragging the overall score down.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceInputs {
    pub baseline_price: f64,
    pub current_price: f64,
    pub time_remaining_seconds: Option<u64>,
    pub period: u8,
    pub total_periods: u8,
    pub volume_24h: Option<f64>,
    /// Most recent price first.
    pub recent_prices: Option<Vec<f64>>,
    pub score_differential: Option<i32>,
    pub spread_bps: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceBreakdown {
    pub price_drop: f64,
    pub time_remaining: f64,
    pub volume: f64,
    pub trend: f64,
    pub game_state: f64,
    pub spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceScore {
    pub overall: f64,
    pub breakdown: ConfidenceBreakdown,
    pub recommendation: String,
}

fn price_drop_pct(inputs: &ConfidenceInputs) -> Option<f64> {
    if inputs.baseline_price <= 0.0 {
        return None;
    }
    Some((inputs.baseline_price - inputs.current_price) / inputs.baseline_price)
}

fn score_price_drop(inputs: &ConfidenceInputs) -> f64 {
    let drop = match price_drop_pct(inputs) {
        Some(d) => d,
        None => return NEUTRAL,
    };
    if drop <= 0.0 {
        0.0
    } else if drop >= 0.20 {
        1.0
    } else if drop >= 0.15 {
        0.9
    } else if drop >= 0.10 {
        0.8
    } else if drop >= 0.07 {
        0.7
    } else if drop >= 0.05 {
        0.6
    } else if drop >= 0.03 {
        0.4
    } else {
        0.2
    }
}

fn score_time_remaining(inputs: &ConfidenceInputs) -> f64 {
    let remaining = match inputs.time_remaining_seconds {
        Some(r) => r,
        None => return NEUTRAL,
    };
    if inputs.total_periods == 0 {
        return NEUTRAL;
    }
    // Period length is derived from total game length implied by the caller;
    // in practice this is always called with a consistent sport profile, so
    // a rough total-game-seconds estimate via period count is enough here.
    let assumed_period_seconds = 12 * 60;
    let total_game_seconds = assumed_period_seconds * inputs.total_periods as u64;
    if total_game_seconds == 0 {
        return NEUTRAL;
    }
    let remaining_pct = remaining as f64 / total_game_seconds as f64;
    if remaining_pct >= 0.75 {
        0.9
    } else if remaining_pct >= 0.5 {
        0.8
    } else if remaining_pct >= 0.25 {
        0.6
    } else if remaining_pct >= 0.10 {
        0.4
    } else {
        0.2
    }
}

fn score_volume(inputs: &ConfidenceInputs) -> f64 {
    let volume = match inputs.volume_24h {
        Some(v) => v,
        None => return NEUTRAL,
    };
    if volume >= 50_000.0 {
        1.0
    } else if volume >= 20_000.0 {
        0.8
    } else if volume >= 5_000.0 {
        0.6
    } else if volume >= 1_000.0 {
        0.4
    } else {
        0.2
    }
}

/// A recent reversal (price climbing back up off the drop) scores higher
/// than a still-falling price: `recent_prices` is most-recent-first, so the
/// comparison is the newest 3 samples' average against the oldest 3 within
/// the last 10.
fn score_trend(inputs: &ConfidenceInputs) -> f64 {
    let prices = match inputs.recent_prices.as_ref() {
        Some(p) if p.len() >= 3 => p,
        _ => return NEUTRAL,
    };
    let window = &prices[..prices.len().min(10)];
    let recent_avg = window[..3].iter().sum::<f64>() / 3.0;
    let earlier_n = window.len().min(3);
    let earlier_avg = window[window.len() - earlier_n..].iter().sum::<f64>() / earlier_n as f64;
    let trend_direction = recent_avg - earlier_avg;
    if trend_direction > 0.02 {
        0.9
    } else if trend_direction > 0.0 {
        0.7
    } else if trend_direction > -0.02 {
        0.5
    } else if trend_direction > -0.05 {
        0.3
    } else {
        0.1
    }
}

/// Being behind early in the game scores higher than being behind late:
/// more periods remain to reach the eventual favorite's win, which is what
/// the entry is betting on. Being ahead, or tied, is flat regardless of
/// progress.
fn score_game_state(inputs: &ConfidenceInputs) -> f64 {
    let diff = match inputs.score_differential {
        Some(d) => d,
        None => return NEUTRAL,
    };
    if inputs.total_periods == 0 {
        return NEUTRAL;
    }
    let game_progress = inputs.period as f64 / inputs.total_periods as f64;

    if diff < 0 {
        let deficit = diff.unsigned_abs();
        if game_progress < 0.5 {
            if deficit <= 10 {
                0.9
            } else if deficit <= 15 {
                0.7
            } else {
                0.5
            }
        } else if deficit <= 5 {
            0.7
        } else if deficit <= 10 {
            0.5
        } else {
            0.3
        }
    } else if diff > 0 {
        0.6
    } else {
        0.7
    }
}

fn score_spread(inputs: &ConfidenceInputs) -> f64 {
    let spread = match inputs.spread_bps {
        Some(s) => s,
        None => return NEUTRAL,
    };
    if spread <= 50.0 {
        1.0
    } else if spread <= 150.0 {
        0.8
    } else if spread <= 300.0 {
        0.5
    } else if spread <= 600.0 {
        0.3
    } else {
        0.1
    }
}

fn recommendation_for(overall: f64, min_entry_confidence_score: f64) -> String {
    if overall >= 0.8 {
        "STRONG_ENTRY".to_string()
    } else if overall >= 0.7 {
        "GOOD_ENTRY".to_string()
    } else if overall >= min_entry_confidence_score {
        "ACCEPTABLE_ENTRY".to_string()
    } else if overall >= 0.4 {
        "WEAK_ENTRY".to_string()
    } else {
        "NO_ENTRY".to_string()
    }
}

/// Compute the overall confidence score and per-factor breakdown for one
/// entry evaluation.
pub fn score(inputs: &ConfidenceInputs, min_entry_confidence_score: f64) -> ConfidenceScore {
    let breakdown = ConfidenceBreakdown {
        price_drop: score_price_drop(inputs),
        time_remaining: score_time_remaining(inputs),
        volume: score_volume(inputs),
        trend: score_trend(inputs),
        game_state: score_game_state(inputs),
        spread: score_spread(inputs),
    };
    let overall = breakdown.price_drop * WEIGHT_PRICE_DROP
        + breakdown.time_remaining * WEIGHT_TIME_REMAINING
        + breakdown.volume * WEIGHT_VOLUME
        + breakdown.trend * WEIGHT_TREND
        + breakdown.game_state * WEIGHT_GAME_STATE
        + breakdown.spread * WEIGHT_SPREAD;
    let recommendation = recommendation_for(overall, min_entry_confidence_score);
    ConfidenceScore {
        overall,
        breakdown,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ConfidenceInputs {
        ConfidenceInputs {
            baseline_price: 0.60,
            current_price: 0.48,
            time_remaining_seconds: Some(420),
            period: 2,
            total_periods: 4,
            volume_24h: None,
            recent_prices: None,
            score_differential: None,
            spread_bps: None,
        }
    }

    #[test]
    fn missing_optional_inputs_score_neutral() {
        let inputs = base_inputs();
        let result = score(&inputs, 0.6);
        assert_eq!(result.breakdown.volume, NEUTRAL);
        assert_eq!(result.breakdown.trend, NEUTRAL);
        assert_eq!(result.breakdown.game_state, NEUTRAL);
        assert_eq!(result.breakdown.spread, NEUTRAL);
    }

    #[test]
    fn twenty_percent_drop_scores_price_drop_factor_at_maximum() {
        let inputs = base_inputs();
        assert_eq!(score_price_drop(&inputs), 1.0);
    }

    #[test]
    fn large_price_drop_clears_the_acceptable_entry_bar() {
        // baseline=0.60, current=0.48, segment q2, 420s left: the max-weight
        // price-drop factor alone clears min_entry_confidence_score=0.6.
        let inputs = base_inputs();
        let result = score(&inputs, 0.6);
        assert!(result.overall >= 0.6, "got {}", result.overall);
        assert_ne!(result.recommendation, "NO_ENTRY");
    }

    #[test]
    fn price_rise_or_flat_scores_zero() {
        let mut inputs = base_inputs();
        inputs.current_price = 0.60;
        assert_eq!(score_price_drop(&inputs), 0.0);
        inputs.current_price = 0.65;
        assert_eq!(score_price_drop(&inputs), 0.0);
    }

    #[test]
    fn seven_to_ten_percent_drop_falls_in_its_own_bucket() {
        let mut inputs = base_inputs();
        inputs.current_price = 0.552; // 8% drop from 0.60
        assert_eq!(score_price_drop(&inputs), 0.7);
    }

    #[test]
    fn being_behind_early_scores_higher_than_behind_late() {
        let mut early = base_inputs();
        early.period = 1;
        early.total_periods = 4;
        early.score_differential = Some(-8);
        let mut late = base_inputs();
        late.period = 3;
        late.total_periods = 4;
        late.score_differential = Some(-8);
        assert_eq!(score_game_state(&early), 0.9);
        assert_eq!(score_game_state(&late), 0.5);
    }

    #[test]
    fn being_ahead_scores_flat_regardless_of_margin() {
        let mut inputs = base_inputs();
        inputs.score_differential = Some(20);
        assert_eq!(score_game_state(&inputs), 0.6);
    }

    #[test]
    fn rebounding_price_scores_above_still_falling_price() {
        let mut rebounding = base_inputs();
        rebounding.recent_prices = Some(vec![0.50, 0.49, 0.48, 0.47, 0.46]);
        let mut falling = base_inputs();
        falling.recent_prices = Some(vec![0.44, 0.46, 0.48, 0.49, 0.50]);
        assert!(score_trend(&rebounding) > score_trend(&falling));
    }

    #[test]
    fn larger_price_drop_never_lowers_the_score_monotonicity() {
        let mut low_drop = base_inputs();
        low_drop.current_price = 0.58; // ~3% drop
        let mut high_drop = base_inputs();
        high_drop.current_price = 0.40; // ~33% drop
        let low = score(&low_drop, 0.6);
        let high = score(&high_drop, 0.6);
        assert!(high.overall >= low.overall);
    }

    #[test]
    fn less_time_remaining_never_raises_the_score_monotonicity() {
        let mut early = base_inputs();
        early.time_remaining_seconds = Some(2000);
        let mut late = base_inputs();
        late.time_remaining_seconds = Some(30);
        let early_score = score(&early, 0.6);
        let late_score = score(&late, 0.6);
        assert!(late_score.overall <= early_score.overall);
    }

    #[test]
    fn recommendation_buckets_match_thresholds() {
        assert_eq!(recommendation_for(0.85, 0.6), "STRONG_ENTRY");
        assert_eq!(recommendation_for(0.75, 0.6), "GOOD_ENTRY");
        assert_eq!(recommendation_for(0.65, 0.6), "ACCEPTABLE_ENTRY");
        assert_eq!(recommendation_for(0.45, 0.6), "WEAK_ENTRY");
        assert_eq!(recommendation_for(0.1, 0.6), "NO_ENTRY");
    }
}
