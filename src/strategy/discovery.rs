//! Market Discovery (§4.3): enumerates tradable markets on the exchange and
//! extracts team identities where the exchange itself doesn't supply them
//! structurally. Side-effect free; the orchestrator's Discovery loop decides
//! what to do with the result.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::Market;
use crate::error::Result;
use crate::exchange::ExchangeClient;

const DISCOVERY_HORIZON_HOURS: i64 = 48;

/// Enumerate markets for one sport up to 48h ahead plus anything currently
/// live, filling in team names from the question text when the adapter
/// left them blank.
pub async fn discover_markets(exchange: &Arc<dyn ExchangeClient>, sport: &str) -> Result<Vec<Market>> {
    let max_close_time = Utc::now() + Duration::hours(DISCOVERY_HORIZON_HOURS);
    let mut markets = exchange.list_markets(Some(sport), max_close_time).await?;
    for market in markets.iter_mut() {
        if market.home_team.is_empty() || market.away_team.is_empty() {
            if let Some((home, away)) = extract_teams_from_question(&market.question) {
                if market.home_team.is_empty() {
                    market.home_team = home;
                }
                if market.away_team.is_empty() {
                    market.away_team = away;
                }
            }
        }
    }
    Ok(markets)
}

/// Best-effort team extraction from a market's question text, used only
/// when the exchange didn't supply structured team fields. Recognizes
/// "X vs Y", "X vs. Y", and "Will the X beat/defeat the Y" phrasings.
fn extract_teams_from_question(question: &str) -> Option<(String, String)> {
    let lower = question.to_ascii_lowercase();
    for sep in [" vs. ", " vs ", " @ ", " v. "] {
        if let Some(idx) = lower.find(sep) {
            let left = question[..idx].trim();
            let right = question[idx + sep.len()..].trim().trim_end_matches('?');
            if !left.is_empty() && !right.is_empty() {
                return Some((left.to_string(), right.to_string()));
            }
        }
    }
    for verb in [" beat ", " defeat ", " over "] {
        if let Some(idx) = lower.find(verb) {
            let before = &question[..idx];
            let after = question[idx + verb.len()..].trim().trim_end_matches('?');
            let home = before
                .rsplit(' ')
                .take(2)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            if !home.is_empty() && !after.is_empty() {
                return Some((home, after.to_string()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_teams_from_vs_phrasing() {
        let (home, away) = extract_teams_from_question("Lakers vs Warriors").unwrap();
        assert_eq!(home, "Lakers");
        assert_eq!(away, "Warriors");
    }

    #[test]
    fn extracts_teams_from_beat_phrasing() {
        let (home, away) = extract_teams_from_question("Will the Lakers beat the Warriors?").unwrap();
        assert_eq!(away, "Warriors");
        assert!(home.contains("Lakers"));
    }

    #[test]
    fn returns_none_for_unrecognized_phrasing() {
        assert!(extract_teams_from_question("Will it rain tomorrow?").is_none());
    }
}
