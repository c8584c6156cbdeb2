//! Market Matcher (§4.4): binds a scoreboard game to a discovered market by
//! team-name token overlap, or by an exact pinned ticker when the user has
//! configured one. Deterministic and side-effect free.

use std::collections::HashSet;

use crate::domain::Market;
use crate::scoreboard::GameSnapshot;

fn tokenize(text: &str) -> HashSet<String> {
    text.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|tok| tok.len() >= 3) // drop articles/short noise tokens
        .map(str::to_string)
        .collect()
}

fn significant_tokens(team: &str) -> HashSet<String> {
    tokenize(team)
}

/// Does at least one significant token of `team` appear among `haystack`'s
/// tokens?
fn team_present(team_tokens: &HashSet<String>, haystack: &HashSet<String>) -> bool {
    team_tokens.iter().any(|tok| haystack.contains(tok))
}

fn overlap_count(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// Find the best market match for one scoreboard game among `candidates`.
/// If `pinned_condition_id` is set (the user has pinned a ticker to this
/// game), it bypasses text matching entirely.
pub fn match_market<'a>(
    game: &GameSnapshot,
    candidates: &'a [Market],
    pinned_condition_id: Option<&str>,
) -> Option<&'a Market> {
    if let Some(condition_id) = pinned_condition_id {
        return candidates.iter().find(|m| m.condition_id == condition_id);
    }

    let home_tokens = significant_tokens(&game.home_team);
    let away_tokens = significant_tokens(&game.away_team);

    let mut best: Option<(&Market, usize)> = None;
    for market in candidates {
        let question_tokens = tokenize(&market.question);
        let combined = question_tokens
            .union(&significant_tokens(&market.home_team))
            .cloned()
            .collect::<HashSet<_>>()
            .union(&significant_tokens(&market.away_team))
            .cloned()
            .collect::<HashSet<_>>();

        let home_hit = team_present(&home_tokens, &combined);
        let away_hit = team_present(&away_tokens, &combined);
        if !(home_hit && away_hit) {
            continue;
        }

        let score = overlap_count(&home_tokens, &combined) + overlap_count(&away_tokens, &combined);
        match best {
            Some((_, best_score)) if best_score > score => {}
            Some((best_market, best_score)) if best_score == score => {
                if market.volume_24h > best_market.volume_24h {
                    best = Some((market, score));
                }
            }
            _ => best = Some((market, score)),
        }
    }

    best.map(|(m, _)| m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn game() -> GameSnapshot {
        GameSnapshot {
            event_id: "E1".to_string(),
            sport: "nba".to_string(),
            home_team: "Los Angeles Lakers".to_string(),
            away_team: "Golden State Warriors".to_string(),
            status: GameStatus::In,
            period: 2,
            total_periods: 4,
            clock: "5:00".to_string(),
            segment: "q2".to_string(),
            time_remaining_seconds: 420,
            home_score: 50,
            away_score: 48,
            scheduled_start: Utc::now(),
        }
    }

    fn market(question: &str, volume: i64, condition_id: &str) -> Market {
        Market {
            condition_id: condition_id.to_string(),
            yes_token_id: "Y".to_string(),
            no_token_id: "N".to_string(),
            question: question.to_string(),
            sport: "nba".to_string(),
            home_team: String::new(),
            away_team: String::new(),
            game_start_time: Utc::now(),
            yes_price: dec!(0.5),
            no_price: dec!(0.5),
            volume_24h: rust_decimal::Decimal::from(volume),
            liquidity: dec!(1000),
            spread: dec!(0.01),
        }
    }

    #[test]
    fn matches_market_whose_question_mentions_both_teams() {
        let candidates = vec![
            market("Will the Lakers beat the Warriors?", 1000, "COND1"),
            market("Will the Celtics beat the Heat?", 2000, "COND2"),
        ];
        let matched = match_market(&game(), &candidates, None).unwrap();
        assert_eq!(matched.condition_id, "COND1");
    }

    #[test]
    fn pinned_condition_id_bypasses_text_matching() {
        let candidates = vec![market("Unrelated question entirely", 1000, "COND9")];
        let matched = match_market(&game(), &candidates, Some("COND9")).unwrap();
        assert_eq!(matched.condition_id, "COND9");
    }

    #[test]
    fn ties_break_by_higher_volume() {
        let candidates = vec![
            market("Lakers vs Warriors game 1", 1000, "LOW"),
            market("Lakers vs Warriors game 2", 5000, "HIGH"),
        ];
        let matched = match_market(&game(), &candidates, None).unwrap();
        assert_eq!(matched.condition_id, "HIGH");
    }

    #[test]
    fn no_match_when_only_one_team_mentioned() {
        let candidates = vec![market("Will the Lakers win their next game?", 1000, "COND1")];
        assert!(match_market(&game(), &candidates, None).is_none());
    }
}
