//! Best-effort ticker parsing, used only as a fallback when the scoreboard
//! says a game is `pre` but we suspect it actually started.
//!
//! A Kalshi-style ticker like `KXNBAGAME-26FEB07GSWLAL-LAL` encodes the game
//! date as `(YY)(MON)(DD)` in its middle segment. The parsed date defaults
//! to 00:00 UTC on game day, which is why this is only ever used to answer
//! "is this plausibly live right now?" within a sport-specific max-duration
//! window, never to derive an exact elapsed-time or pricing decision.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Maximum plausible game duration per sport, used to bound the "is this
/// still live" fallback check.
pub fn max_duration_for_sport(sport: &str) -> Duration {
    match sport.to_ascii_lowercase().as_str() {
        "nba" | "ncaab" => Duration::hours(3),
        "nfl" | "ncaaf" => Duration::hours(4),
        "nhl" => Duration::hours(3),
        "mlb" => Duration::hours(4),
        _ => Duration::hours(4),
    }
}

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Extract a best-effort game date from a ticker's `(YY)(MON)(DD)` segment.
/// Returns midnight UTC on that date, or `None` if no plausible segment is
/// found.
pub fn parse_ticker_game_date(ticker: &str) -> Option<DateTime<Utc>> {
    for segment in ticker.split('-') {
        if let Some(date) = try_parse_segment(segment) {
            return Some(date);
        }
    }
    None
}

fn try_parse_segment(segment: &str) -> Option<DateTime<Utc>> {
    let bytes = segment.as_bytes();
    if bytes.len() < 7 {
        return None;
    }
    for start in 0..=(bytes.len() - 7) {
        let candidate = &segment[start..start + 7];
        if let Some(date) = parse_yy_mon_dd(candidate) {
            return Some(date);
        }
    }
    None
}

fn parse_yy_mon_dd(s: &str) -> Option<DateTime<Utc>> {
    let bytes = s.as_bytes();
    if bytes.len() != 7 {
        return None;
    }
    let (yy, rest) = s.split_at(2);
    let (mon, dd) = rest.split_at(3);
    if !yy.chars().all(|c| c.is_ascii_digit()) || !dd.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mon_idx = MONTHS.iter().position(|m| *m == mon.to_ascii_uppercase())?;
    let year: i32 = 2000 + yy.parse::<i32>().ok()?;
    let day: u32 = dd.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, (mon_idx + 1) as u32, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Conservative "is this plausibly live" check: the parsed game date is in
/// the past but still within the sport's max-duration window.
pub fn plausibly_live_now(ticker: &str, sport: &str) -> bool {
    let Some(started_at) = parse_ticker_game_date(ticker) else {
        return false;
    };
    let now = Utc::now();
    if started_at > now {
        return false;
    }
    now - started_at <= max_duration_for_sport(sport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_kalshi_style_ticker() {
        let date = parse_ticker_game_date("KXNBAGAME-26FEB07GSWLAL-LAL").unwrap();
        assert_eq!(date.date_naive(), NaiveDate::from_ymd_opt(2026, 2, 7).unwrap());
    }

    #[test]
    fn returns_none_for_tickers_without_a_date_segment() {
        assert!(parse_ticker_game_date("SOMETHING-RANDOM").is_none());
    }

    #[test]
    fn plausibly_live_respects_sport_max_duration() {
        // A ticker dated far enough in the past that even a long game has ended.
        assert!(!plausibly_live_now("KXNBAGAME-20JAN01GSWLAL-LAL", "nba"));
    }

    #[test]
    fn max_duration_differs_by_sport() {
        assert_eq!(max_duration_for_sport("nba"), Duration::hours(3));
        assert_eq!(max_duration_for_sport("nfl"), Duration::hours(4));
    }
}
