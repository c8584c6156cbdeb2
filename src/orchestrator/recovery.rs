//! Position Recovery (§4.10 startup step): on every `start()`, rebuild the
//! in-memory `GameTracker` from the Position Store's open positions rather
//! than trusting anything left over from a previous process. A position
//! with no matching `tracked_markets` row is logged and left untracked —
//! the cleanup/health loops surface it rather than risking a guess at its
//! market identity.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{GameStatus, Market, TeamSelection, TrackedGame};
use crate::error::Result;

use super::core::Orchestrator;

/// Load the layered config overrides and rebuild tracked games for every
/// currently open position. Must run before `start()` spawns any loop.
pub async fn initialize(orch: &Orchestrator) -> Result<()> {
    let global = orch.store.load_global_settings(&orch.user_id).await?;
    let sports = orch.store.load_sport_configs(&orch.user_id).await?;
    let market_overrides = orch.store.load_market_overrides(&orch.user_id).await?;

    {
        let mut config = orch.config.write().await;
        if let Some(g) = global {
            config.global = g;
        }
        config.sports = sports;
        config.market_overrides = market_overrides;
    }

    let open_positions = orch.store.get_open_positions(&orch.user_id).await?;
    let records = orch.store.list_tracked_markets(&orch.user_id).await?;
    let by_condition: HashMap<String, _> = records
        .into_iter()
        .map(|r| (r.condition_id.clone(), r))
        .collect();

    let mut tracker = orch.state.tracked_games.write().await;
    for position in &open_positions {
        let Some(record) = by_condition.get(&position.condition_id) else {
            tracing::warn!(
                condition_id = %position.condition_id,
                position_id = ?position.id,
                "open position has no tracked_markets row; recovering without a live key, cleanup will not evict it"
            );
            continue;
        };

        let key = record
            .espn_event_id
            .clone()
            .unwrap_or_else(|| record.condition_id.clone());

        let market = Market {
            condition_id: record.condition_id.clone(),
            yes_token_id: record.yes_token_id.clone(),
            no_token_id: record.no_token_id.clone(),
            question: record.question.clone(),
            sport: record.sport.clone(),
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            game_start_time: Utc::now(),
            yes_price: record.current_yes_price,
            no_price: Decimal::ONE - record.current_yes_price,
            volume_24h: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            spread: Decimal::ZERO,
        };

        let game = TrackedGame {
            event_id: key.clone(),
            sport: record.sport.clone(),
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            market,
            baseline_yes_price: record.baseline_yes_price,
            current_yes_price: record.current_yes_price,
            price_history: std::collections::VecDeque::from([record.current_yes_price]),
            // Unknown until the Scoreboard Poll loop's first tick resolves it;
            // `In` is the conservative choice so the Trading loop evaluates
            // exits immediately rather than waiting on a live status.
            status: GameStatus::In,
            period: 0,
            total_periods: 0,
            clock: String::new(),
            segment: String::new(),
            time_remaining_seconds: u64::MAX,
            home_score: 0,
            away_score: 0,
            last_update: Utc::now(),
            selection: TeamSelection::Auto,
            position_id: position.id,
            is_user_selected: record.is_user_selected,
        };

        tracing::info!(key = %key, condition_id = %position.condition_id, "recovered open position");
        tracker.add(key, game);
    }

    Ok(())
}
