//! Per-sport segment normalization and period-length table (§4.2).
//!
//! Adding a league is a table entry here, not new code: `SportProfile`
//! carries everything `parse_game_state` needs to turn an ESPN period number
//! into this crate's segment vocabulary (`q1..q4`, `h1/h2`, `p1..p3`, MLB
//! innings) and to estimate `time_remaining_seconds`.

/// How a sport's period number maps onto elapsed/remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStyle {
    /// Clock counts down within a fixed-length period (basketball, football,
    /// hockey).
    CountDown,
    /// Clock counts up within the period; elapsed minutes are computed and
    /// the second half adds the first half's length (most soccer leagues).
    CountUp,
    /// No fixed clock; progress is tracked by inning/out count (MLB).
    Innings,
}

#[derive(Debug, Clone, Copy)]
pub struct SportProfile {
    pub sport: &'static str,
    pub clock_style: ClockStyle,
    pub period_length_seconds: u64,
    pub total_periods: u8,
}

const PROFILES: &[SportProfile] = &[
    SportProfile { sport: "nba", clock_style: ClockStyle::CountDown, period_length_seconds: 12 * 60, total_periods: 4 },
    SportProfile { sport: "wnba", clock_style: ClockStyle::CountDown, period_length_seconds: 10 * 60, total_periods: 4 },
    SportProfile { sport: "ncaab", clock_style: ClockStyle::CountDown, period_length_seconds: 20 * 60, total_periods: 2 },
    SportProfile { sport: "ncaaw", clock_style: ClockStyle::CountDown, period_length_seconds: 20 * 60, total_periods: 2 },
    SportProfile { sport: "nfl", clock_style: ClockStyle::CountDown, period_length_seconds: 15 * 60, total_periods: 4 },
    SportProfile { sport: "ncaaf", clock_style: ClockStyle::CountDown, period_length_seconds: 15 * 60, total_periods: 4 },
    SportProfile { sport: "nhl", clock_style: ClockStyle::CountDown, period_length_seconds: 20 * 60, total_periods: 3 },
    SportProfile { sport: "mlb", clock_style: ClockStyle::Innings, period_length_seconds: 0, total_periods: 9 },
    // Soccer leagues: clock counts up, two 45-minute halves.
    SportProfile { sport: "epl", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "laliga", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "bundesliga", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "seriea", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "ligue1", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "mls", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
    SportProfile { sport: "ucl", clock_style: ClockStyle::CountUp, period_length_seconds: 45 * 60, total_periods: 2 },
];

/// Default profile for a sport not in the table: treated like a generic
/// countdown-clock, four-period sport so the caller degrades instead of
/// panicking. Leagues should be added to `PROFILES` rather than relying on
/// this silently.
const FALLBACK: SportProfile = SportProfile {
    sport: "unknown",
    clock_style: ClockStyle::CountDown,
    period_length_seconds: 15 * 60,
    total_periods: 4,
};

pub fn sport_profile(sport: &str) -> SportProfile {
    let lower = sport.to_ascii_lowercase();
    PROFILES
        .iter()
        .find(|p| p.sport == lower)
        .copied()
        .unwrap_or(FALLBACK)
}

fn college_basketball_segment(period: u8) -> String {
    match period {
        1 => "h1".to_string(),
        2 => "h2".to_string(),
        n => format!("ot{}", n - 2),
    }
}

fn quarter_segment(period: u8, total_periods: u8) -> String {
    if period <= total_periods {
        format!("q{period}")
    } else {
        format!("ot{}", period - total_periods)
    }
}

fn half_segment(period: u8) -> String {
    match period {
        1 => "h1".to_string(),
        2 => "h2".to_string(),
        n => format!("ot{}", n - 2),
    }
}

fn period_segment(period: u8, total_periods: u8) -> String {
    if period <= total_periods {
        format!("p{period}")
    } else {
        format!("ot{}", period - total_periods)
    }
}

/// Normalize an ESPN-style period number into this crate's segment
/// vocabulary for the given sport (§4.2, glossary "Segment").
pub fn normalize_segment(period: u8, sport: &str) -> String {
    let lower = sport.to_ascii_lowercase();
    match lower.as_str() {
        "ncaab" | "ncaaw" => college_basketball_segment(period),
        "nba" | "wnba" | "nfl" | "ncaaf" => quarter_segment(period, sport_profile(&lower).total_periods),
        "nhl" => period_segment(period, 3),
        "mlb" => format!("i{period}"),
        _ if sport_profile(&lower).clock_style == ClockStyle::CountUp => half_segment(period),
        _ => period_segment(period, sport_profile(&lower).total_periods),
    }
}

/// Estimate seconds remaining in the game: remaining-in-period plus
/// full-remaining-periods times period length (§4.2). MLB has no clock, so
/// this returns `None` and callers fall back to out-count-based logic.
pub fn estimate_time_remaining(
    sport: &str,
    period: u8,
    clock_remaining_in_period_seconds: u64,
) -> Option<u64> {
    let profile = sport_profile(sport);
    match profile.clock_style {
        ClockStyle::Innings => None,
        ClockStyle::CountDown => {
            let periods_left = profile.total_periods.saturating_sub(period) as u64;
            Some(clock_remaining_in_period_seconds + periods_left * profile.period_length_seconds)
        }
        ClockStyle::CountUp => {
            // `clock_remaining_in_period_seconds` carries elapsed seconds in
            // this convention; remaining = period_length - elapsed, clamped.
            let elapsed = clock_remaining_in_period_seconds.min(profile.period_length_seconds);
            let remaining_this_period = profile.period_length_seconds - elapsed;
            let periods_left = profile.total_periods.saturating_sub(period) as u64;
            Some(remaining_this_period + periods_left * profile.period_length_seconds)
        }
    }
}

/// MLB-specific outs-remaining estimate, used in place of a clock (§4.2).
/// `outs_in_current_half` is 0-2; `is_top` distinguishes the two team's
/// batting halves of the inning.
pub fn mlb_outs_remaining(inning: u8, is_top: bool, outs_in_current_half: u8) -> u32 {
    let remaining_innings = 9u32.saturating_sub(inning as u32);
    let outs_left_this_half = 3u32.saturating_sub(outs_in_current_half as u32);
    if is_top {
        remaining_innings * 6 + outs_left_this_half + 3
    } else {
        remaining_innings * 6 + outs_left_this_half
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basketball_quarters_normalize_to_q_labels() {
        assert_eq!(normalize_segment(1, "nba"), "q1");
        assert_eq!(normalize_segment(4, "nba"), "q4");
        assert_eq!(normalize_segment(5, "nba"), "ot1");
    }

    #[test]
    fn college_basketball_normalizes_to_halves() {
        assert_eq!(normalize_segment(1, "ncaab"), "h1");
        assert_eq!(normalize_segment(2, "ncaaw"), "h2");
    }

    #[test]
    fn hockey_normalizes_to_periods() {
        assert_eq!(normalize_segment(1, "nhl"), "p1");
        assert_eq!(normalize_segment(3, "nhl"), "p3");
    }

    #[test]
    fn soccer_normalizes_to_halves() {
        assert_eq!(normalize_segment(1, "epl"), "h1");
        assert_eq!(normalize_segment(2, "epl"), "h2");
    }

    #[test]
    fn mlb_normalizes_to_inning_label() {
        assert_eq!(normalize_segment(5, "mlb"), "i5");
    }

    #[test]
    fn countdown_time_remaining_adds_full_remaining_periods() {
        // NBA: 420s left in Q2 -> 420 + 2 full quarters (Q3, Q4) * 720s
        let remaining = estimate_time_remaining("nba", 2, 420).unwrap();
        assert_eq!(remaining, 420 + 2 * 720);
    }

    #[test]
    fn countup_soccer_second_half_adds_forty_five_minutes() {
        // 10 minutes (600s) elapsed in h2 -> 35 min left in h2, 0 periods left.
        let remaining = estimate_time_remaining("epl", 2, 600).unwrap();
        assert_eq!(remaining, 45 * 60 - 600);
    }

    #[test]
    fn mlb_has_no_clock_based_time_remaining() {
        assert!(estimate_time_remaining("mlb", 5, 0).is_none());
    }

    #[test]
    fn mlb_outs_remaining_accounts_for_inning_half() {
        // Top of the 1st, 0 outs: 8 remaining innings * 6 + 3 left this half + 3 (bottom of 1st).
        assert_eq!(mlb_outs_remaining(1, true, 0), 8 * 6 + 3 + 3);
        // Bottom of the 9th, 2 outs: 0 remaining innings, 1 out left.
        assert_eq!(mlb_outs_remaining(9, false, 2), 1);
    }
}
