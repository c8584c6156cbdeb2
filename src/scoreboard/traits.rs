use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::GameStatus;
use crate::error::Result;

/// One game's live state as reported by the scoreboard, already normalized
/// into this crate's segment vocabulary (see [`super::normalize_segment`]).
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub event_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub status: GameStatus,
    pub period: u8,
    pub total_periods: u8,
    pub clock: String,
    pub segment: String,
    pub time_remaining_seconds: u64,
    pub home_score: i32,
    pub away_score: i32,
    pub scheduled_start: DateTime<Utc>,
}

/// The capability set Market Matcher and Game Tracker need from a live
/// scores provider. Implementations own their own caching.
#[async_trait]
pub trait ScoreboardClient: Send + Sync {
    /// All of today's games for one sport.
    async fn get_scoreboard(&self, sport: &str) -> Result<Vec<GameSnapshot>>;

    /// A single game by its scoreboard event id, bypassing the scoreboard
    /// cache when the caller specifically needs the freshest read (used by
    /// the 5s Scoreboard Poll loop for already-tracked games).
    async fn get_game_summary(&self, sport: &str, event_id: &str) -> Result<GameSnapshot>;
}
