//! Game Tracker (§4.5): the in-memory map of games currently being
//! followed. Refresh is driven by whatever `ScoreboardClient` the caller
//! passes in; this module owns only the map and the finished-transition
//! bookkeeping, not the network call itself.

use std::collections::HashMap;

use chrono::Utc;

use crate::domain::{GameStatus, TrackedGame};
use crate::error::Result;
use crate::scoreboard::{GameSnapshot, ScoreboardClient};

/// In-memory map of tracked games, keyed by scoreboard event id (or, before
/// Discovery resolves it, by condition id as a temporary key — see
/// `migrate_key`).
#[derive(Default)]
pub struct GameTracker {
    games: HashMap<String, TrackedGame>,
}

impl GameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, game: TrackedGame) {
        self.games.insert(key.into(), game);
    }

    pub fn remove(&mut self, key: &str) -> Option<TrackedGame> {
        self.games.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&TrackedGame> {
        self.games.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TrackedGame> {
        self.games.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.games.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &TrackedGame> {
        self.games.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut TrackedGame> {
        self.games.values_mut()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.games.contains_key(key)
    }

    /// Position recovery upgrades a synthetic condition-id key to the real
    /// scoreboard event id once Discovery resolves it, preserving
    /// `has_position`/`position_id` in place.
    pub fn migrate_key(&mut self, old_key: &str, new_key: impl Into<String>) {
        let new_key = new_key.into();
        if old_key == new_key {
            return;
        }
        if let Some(game) = self.games.remove(old_key) {
            self.games.insert(new_key, game);
        }
    }

    fn apply_snapshot(game: &mut TrackedGame, snapshot: &GameSnapshot) {
        game.status = snapshot.status;
        game.period = snapshot.period;
        game.total_periods = snapshot.total_periods;
        game.clock = snapshot.clock.clone();
        game.segment = snapshot.segment.clone();
        game.time_remaining_seconds = snapshot.time_remaining_seconds;
        game.home_score = snapshot.home_score;
        game.away_score = snapshot.away_score;
        game.last_update = Utc::now();
    }

    /// Refresh every tracked game via the scoreboard client, grouped by
    /// sport to minimize redundant scoreboard fetches (the client itself
    /// caches per-sport for 30s, so this is mostly about avoiding N
    /// redundant lookups within a single pass). Returns the keys of games
    /// that transitioned into `post` this cycle.
    pub async fn update_all(
        &mut self,
        scoreboard: &dyn ScoreboardClient,
    ) -> Result<Vec<String>> {
        let mut sports: Vec<String> = self
            .games
            .values()
            .map(|g| g.sport.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        sports.sort();

        let mut by_sport: HashMap<String, Vec<GameSnapshot>> = HashMap::new();
        for sport in &sports {
            let snapshots = scoreboard.get_scoreboard(sport).await?;
            by_sport.insert(sport.clone(), snapshots);
        }

        let mut finished = Vec::new();
        for (key, game) in self.games.iter_mut() {
            let was_post = game.status == GameStatus::Post;
            let snapshots = by_sport.get(&game.sport);
            let found = snapshots
                .and_then(|snaps| snaps.iter().find(|s| s.event_id == game.event_id));
            if let Some(snapshot) = found {
                Self::apply_snapshot(game, snapshot);
                if !was_post && game.status == GameStatus::Post {
                    finished.push(key.clone());
                }
            }
        }
        Ok(finished)
    }

    /// Games eligible for cleanup: finished with no open position, or stale
    /// (no update in `max_age`) with no open position (§4.10 Cleanup loop).
    pub fn evictable(&self, max_age: chrono::Duration) -> Vec<String> {
        let now = Utc::now();
        self.games
            .iter()
            .filter(|(_, g)| {
                !g.has_position()
                    && (g.status == GameStatus::Post || now - g.last_update > max_age)
            })
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Build a fresh `TrackedGame` from a matched market and its baseline
/// price, ready to be inserted into the tracker.
pub fn new_tracked_game(
    event_id: String,
    market: crate::domain::Market,
    snapshot: &GameSnapshot,
    selection: crate::domain::TeamSelection,
    is_user_selected: bool,
) -> TrackedGame {
    let baseline = market.yes_price;
    TrackedGame {
        event_id,
        sport: snapshot.sport.clone(),
        home_team: snapshot.home_team.clone(),
        away_team: snapshot.away_team.clone(),
        market: market.clone(),
        baseline_yes_price: baseline,
        current_yes_price: market.yes_price,
        price_history: std::collections::VecDeque::from([market.yes_price]),
        status: snapshot.status,
        period: snapshot.period,
        total_periods: snapshot.total_periods,
        clock: snapshot.clock.clone(),
        segment: snapshot.segment.clone(),
        time_remaining_seconds: snapshot.time_remaining_seconds,
        home_score: snapshot.home_score,
        away_score: snapshot.away_score,
        last_update: Utc::now(),
        selection,
        position_id: None,
        is_user_selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameStatus, Market, TeamSelection};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn sample_market() -> Market {
        Market {
            condition_id: "COND1".to_string(),
            yes_token_id: "Y1".to_string(),
            no_token_id: "N1".to_string(),
            question: "Will the Lakers win?".to_string(),
            sport: "nba".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Warriors".to_string(),
            game_start_time: Utc::now(),
            yes_price: dec!(0.60),
            no_price: dec!(0.40),
            volume_24h: dec!(10000),
            liquidity: dec!(5000),
            spread: dec!(0.01),
        }
    }

    fn sample_snapshot(event_id: &str, status: GameStatus) -> GameSnapshot {
        GameSnapshot {
            event_id: event_id.to_string(),
            sport: "nba".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Warriors".to_string(),
            status,
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

    struct StubScoreboard {
        snapshots: Vec<GameSnapshot>,
    }

    #[async_trait]
    impl ScoreboardClient for StubScoreboard {
        async fn get_scoreboard(&self, _sport: &str) -> Result<Vec<GameSnapshot>> {
            Ok(self.snapshots.clone())
        }
        async fn get_game_summary(&self, _sport: &str, event_id: &str) -> Result<GameSnapshot> {
            self.snapshots
                .iter()
                .find(|s| s.event_id == event_id)
                .cloned()
                .ok_or_else(|| crate::error::TraderError::MatchNotFound(event_id.to_string()))
        }
    }

    #[test]
    fn migrate_key_preserves_position_id() {
        let mut tracker = GameTracker::new();
        let mut game = new_tracked_game(
            "COND1".to_string(),
            sample_market(),
            &sample_snapshot("COND1", GameStatus::Pre),
            TeamSelection::Home,
            true,
        );
        game.position_id = Some(42);
        tracker.add("COND1", game);

        tracker.migrate_key("COND1", "E123");

        assert!(!tracker.contains_key("COND1"));
        let migrated = tracker.get("E123").expect("migrated game");
        assert_eq!(migrated.position_id, Some(42));
        assert!(migrated.has_position());
    }

    #[tokio::test]
    async fn update_all_detects_finished_transition() {
        let mut tracker = GameTracker::new();
        let game = new_tracked_game(
            "E123".to_string(),
            sample_market(),
            &sample_snapshot("E123", GameStatus::In),
            TeamSelection::Home,
            true,
        );
        tracker.add("E123", game);

        let scoreboard = StubScoreboard {
            snapshots: vec![sample_snapshot("E123", GameStatus::Post)],
        };
        let finished = tracker.update_all(&scoreboard).await.unwrap();
        assert_eq!(finished, vec!["E123".to_string()]);
    }

    #[test]
    fn evictable_skips_games_with_open_positions() {
        let mut tracker = GameTracker::new();
        let mut finished_with_position = new_tracked_game(
            "E1".to_string(),
            sample_market(),
            &sample_snapshot("E1", GameStatus::Post),
            TeamSelection::Home,
            true,
        );
        finished_with_position.position_id = Some(1);
        tracker.add("E1", finished_with_position);

        let finished_without_position = new_tracked_game(
            "E2".to_string(),
            sample_market(),
            &sample_snapshot("E2", GameStatus::Post),
            TeamSelection::Home,
            true,
        );
        tracker.add("E2", finished_without_position);

        let evictable = tracker.evictable(chrono::Duration::hours(6));
        assert_eq!(evictable, vec!["E2".to_string()]);
    }
}
