//! ESPN-style scoreboard client: cached schedule/summary fetch plus
//! game-state parsing (§4.2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::domain::GameStatus;
use crate::error::{Result, TraderError};

use super::segments::{estimate_time_remaining, normalize_segment};
use super::traits::{GameSnapshot, ScoreboardClient};

const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";
const CACHE_TTL: Duration = Duration::from_secs(30);

fn sport_path(sport: &str) -> &'static str {
    match sport.to_ascii_lowercase().as_str() {
        "nba" => "basketball/nba",
        "wnba" => "basketball/wnba",
        "ncaab" => "basketball/mens-college-basketball",
        "ncaaw" => "basketball/womens-college-basketball",
        "nfl" => "football/nfl",
        "ncaaf" => "football/college-football",
        "nhl" => "hockey/nhl",
        "mlb" => "baseball/mlb",
        "epl" => "soccer/eng.1",
        "laliga" => "soccer/esp.1",
        "bundesliga" => "soccer/ger.1",
        "seriea" => "soccer/ita.1",
        "ligue1" => "soccer/fra.1",
        "mls" => "soccer/usa.1",
        "ucl" => "soccer/uefa.champions",
        _ => "basketball/nba",
    }
}

fn is_soccer(sport: &str) -> bool {
    matches!(
        sport.to_ascii_lowercase().as_str(),
        "epl" | "laliga" | "bundesliga" | "seriea" | "ligue1" | "mls" | "ucl"
    )
}

fn is_mlb(sport: &str) -> bool {
    sport.eq_ignore_ascii_case("mlb")
}

struct CacheEntry {
    fetched_at: Instant,
    events: Vec<GameSnapshot>,
}

/// Scoreboard client backed by an ESPN-style public JSON API, with a
/// per-sport 30s TTL cache and a "group id" knob for college sports so
/// unranked teams are included too.
pub struct EspnScoreboardClient {
    http: Client,
    base_url: String,
    college_group_ids: HashMap<String, String>,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl EspnScoreboardClient {
    pub fn new(base_url: Option<String>, college_group_ids: HashMap<String, String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("espn http client"),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            college_group_ids,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn scoreboard_url(&self, sport: &str) -> String {
        let mut url = format!("{}/{}/scoreboard", self.base_url, sport_path(sport));
        if let Some(group) = self.college_group_ids.get(&sport.to_ascii_lowercase()) {
            url.push_str("?groups=");
            url.push_str(group);
        }
        url
    }

    fn summary_url(&self, sport: &str, event_id: &str) -> String {
        format!(
            "{}/{}/summary?event={}",
            self.base_url,
            sport_path(sport),
            event_id
        )
    }

    #[instrument(skip(self), fields(sport = %sport))]
    async fn fetch_scoreboard(&self, sport: &str) -> Result<Vec<GameSnapshot>> {
        let url = self.scoreboard_url(sport);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(TraderError::TransientNetworkError(format!(
                "espn scoreboard {} returned {}",
                sport,
                resp.status()
            )));
        }
        let body: Value = resp.json().await?;
        let events = body
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(events
            .iter()
            .filter_map(|event| parse_event(event, sport))
            .collect())
    }
}

#[async_trait]
impl ScoreboardClient for EspnScoreboardClient {
    #[instrument(skip(self), fields(sport = %sport))]
    async fn get_scoreboard(&self, sport: &str) -> Result<Vec<GameSnapshot>> {
        let key = sport.to_ascii_lowercase();
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < CACHE_TTL {
                    return Ok(entry.events.clone());
                }
            }
        }
        let events = self.fetch_scoreboard(&key).await?;
        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                events: events.clone(),
            },
        );
        Ok(events)
    }

    #[instrument(skip(self), fields(sport = %sport, event_id = %event_id))]
    async fn get_game_summary(&self, sport: &str, event_id: &str) -> Result<GameSnapshot> {
        let url = self.summary_url(sport, event_id);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(TraderError::TransientNetworkError(format!(
                "espn summary {} returned {}",
                event_id,
                resp.status()
            )));
        }
        let body: Value = resp.json().await?;
        let header = body.get("header").cloned().unwrap_or(Value::Null);
        parse_event(&header, sport)
            .ok_or_else(|| TraderError::MatchNotFound(format!("no summary for event {event_id}")))
    }
}

/// Parse one ESPN `event` JSON node into a `GameSnapshot`. ESPN's scoreboard
/// and summary endpoints nest the same shape differently (`competitions[0]`
/// vs `header.competitions[0]`); both are covered by the same field lookups.
fn parse_event(event: &Value, sport: &str) -> Option<GameSnapshot> {
    let event_id = event
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| event.get("uid").and_then(Value::as_str).map(str::to_string))?;

    let competition = event
        .get("competitions")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .cloned()
        .unwrap_or_else(|| event.clone());

    let competitors = competition
        .get("competitors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let home = competitors
        .iter()
        .find(|c| c.get("homeAway").and_then(Value::as_str) == Some("home"))?;
    let away = competitors
        .iter()
        .find(|c| c.get("homeAway").and_then(Value::as_str) == Some("away"))?;

    let home_team = team_name(home)?;
    let away_team = team_name(away)?;
    let home_score = team_score(home);
    let away_score = team_score(away);

    let status_node = competition
        .get("status")
        .or_else(|| event.get("status"))
        .cloned()
        .unwrap_or(Value::Null);

    let state = status_node
        .get("type")
        .and_then(|t| t.get("state"))
        .and_then(Value::as_str)
        .unwrap_or("pre");
    let status = match state {
        "in" => GameStatus::In,
        "post" => GameStatus::Post,
        _ => GameStatus::Pre,
    };

    let period = status_node
        .get("period")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u8;
    let clock_display = status_node
        .get("displayClock")
        .and_then(Value::as_str)
        .unwrap_or("0:00")
        .to_string();

    let clock_seconds = if is_soccer(sport) {
        parse_elapsed_minutes(&clock_display)
    } else {
        parse_clock_to_seconds(&clock_display)
    };

    let segment = normalize_segment(period.max(1), sport);
    let time_remaining_seconds = if is_mlb(sport) {
        0
    } else {
        estimate_time_remaining(sport, period.max(1), clock_seconds).unwrap_or(0)
    };

    let scheduled_start = event
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    Some(GameSnapshot {
        event_id,
        sport: sport.to_string(),
        home_team,
        away_team,
        status,
        period,
        total_periods: super::segments::sport_profile(sport).total_periods,
        clock: clock_display,
        segment,
        time_remaining_seconds,
        home_score,
        away_score,
        scheduled_start,
    })
}

fn team_name(competitor: &Value) -> Option<String> {
    competitor
        .get("team")
        .and_then(|t| {
            t.get("displayName")
                .or_else(|| t.get("name"))
                .or_else(|| t.get("shortDisplayName"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn team_score(competitor: &Value) -> i32 {
    competitor
        .get("score")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i32>().ok())
        .or_else(|| competitor.get("score").and_then(Value::as_i64).map(|v| v as i32))
        .unwrap_or(0)
}

/// Parse an `mm:ss` countdown clock into remaining seconds within the
/// current period.
fn parse_clock_to_seconds(display: &str) -> u64 {
    let parts: Vec<&str> = display.split(':').collect();
    if parts.len() == 2 {
        let minutes: u64 = parts[0].trim().parse().unwrap_or(0);
        let seconds: u64 = parts[1].trim().parse().unwrap_or(0);
        minutes * 60 + seconds
    } else {
        0
    }
}

/// Soccer's clock counts up in elapsed minutes, sometimes with stoppage time
/// like `45+2'`. Only the base minutes are used for estimation purposes.
fn parse_elapsed_minutes(display: &str) -> u64 {
    let trimmed = display.trim_end_matches('\'');
    let base = trimmed.split('+').next().unwrap_or(trimmed);
    base.trim().parse::<u64>().unwrap_or(0) * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sport_path_maps_known_leagues() {
        assert_eq!(sport_path("nba"), "basketball/nba");
        assert_eq!(sport_path("epl"), "soccer/eng.1");
    }

    #[test]
    fn parse_clock_handles_mmss() {
        assert_eq!(parse_clock_to_seconds("7:32"), 7 * 60 + 32);
        assert_eq!(parse_clock_to_seconds("garbage"), 0);
    }

    #[test]
    fn parse_elapsed_minutes_strips_stoppage_time() {
        assert_eq!(parse_elapsed_minutes("45+2'"), 45 * 60);
        assert_eq!(parse_elapsed_minutes("23'"), 23 * 60);
    }

    #[test]
    fn scoreboard_url_appends_college_group() {
        let mut groups = HashMap::new();
        groups.insert("ncaab".to_string(), "50".to_string());
        let client = EspnScoreboardClient::new(None, groups);
        assert!(client.scoreboard_url("ncaab").ends_with("?groups=50"));
        assert!(!client.scoreboard_url("nba").contains("groups"));
    }

    #[test]
    fn parse_event_extracts_teams_and_score() {
        let event = serde_json::json!({
            "id": "401584669",
            "date": "2026-02-07T00:00Z",
            "competitions": [{
                "status": {"type": {"state": "in"}, "period": 2, "displayClock": "5:12"},
                "competitors": [
                    {"homeAway": "home", "score": "58", "team": {"displayName": "Golden State Warriors"}},
                    {"homeAway": "away", "score": "61", "team": {"displayName": "Los Angeles Lakers"}}
                ]
            }]
        });
        let snapshot = parse_event(&event, "nba").expect("snapshot");
        assert_eq!(snapshot.home_team, "Golden State Warriors");
        assert_eq!(snapshot.away_score, 61);
        assert_eq!(snapshot.segment, "q2");
        assert_eq!(snapshot.status, GameStatus::In);
    }
}
