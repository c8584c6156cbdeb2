//! The six supervised loops plus the kill-switch monitor (§4.10). Each loop
//! owns one `tokio::time::interval` and races it against a `ShutdownToken`
//! so `stop()` never waits longer than the current tick for any of them to
//! notice.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;

use crate::coordination::shutdown::ShutdownToken;
use crate::coordination::ComponentState;
use crate::domain::{ExitReason, OrchestratorState, TeamSelection};
use crate::error::Result;
use crate::strategy::{decision, discover_markets, kelly, kill_switch, match_market, new_tracked_game, risk_gate};
use crate::strategy::{DecisionContext, GlobalRiskLimits, KillSwitchInputs};

use super::core::Orchestrator;
use super::execution;

const SUPPORTED_SPORTS: &[&str] = &["nba", "nfl", "nhl", "mlb", "ncaab", "ncaaf"];
const STALE_GAME_MAX_AGE_HOURS: i64 = 6;

macro_rules! loop_body {
    ($name:expr, $orch:expr, $token:expr, $period:expr, $tick:expr) => {{
        let mut interval = tokio::time::interval(Duration::from_secs($period));
        $orch.lifecycle.set_state($name, ComponentState::Running, None).await;
        loop {
            tokio::select! {
                _ = interval.tick() => { $tick }
                _ = $token.wait_for_shutdown() => break,
            }
        }
        $orch.lifecycle.set_state($name, ComponentState::Stopped, None).await;
    }};
}

pub async fn discovery_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("discovery", orch, token, 10, {
        if let Err(e) = run_discovery_tick(&orch).await {
            tracing::warn!(error = %e, "discovery tick failed");
            orch.state.record_api_error().await;
        }
    });
}

async fn run_discovery_tick(orch: &Arc<Orchestrator>) -> Result<()> {
    let global = orch.config.read().await.global.clone();
    let sports: Vec<String> = {
        let config = orch.config.read().await;
        SUPPORTED_SPORTS
            .iter()
            .filter(|s| config.sports.get(**s).map(|c| c.enabled).unwrap_or(true))
            .map(|s| s.to_string())
            .collect()
    };

    for sport in sports {
        let markets = discover_markets(&orch.exchange, &sport).await?;
        let scoreboard_games = orch.scoreboard.get_scoreboard(&sport).await?;

        for snapshot in &scoreboard_games {
            let is_selected = global.selected_event_ids.iter().any(|id| id == &snapshot.event_id);
            if !is_selected && !global.auto_trade_all {
                continue;
            }

            let existing_key = {
                let tracked = orch.state.tracked_games.read().await;
                tracked
                    .keys()
                    .find(|k| tracked.get(k).map(|g| g.event_id == snapshot.event_id).unwrap_or(false))
                    .cloned()
            };
            if existing_key.as_deref() == Some(snapshot.event_id.as_str()) {
                continue;
            }

            let Some(market) = match_market(snapshot, &markets, None) else {
                continue;
            };

            // A recovered position may still be keyed by its synthetic
            // condition-id key (no espn_event_id was on record); migrate it
            // to the real event id now that Discovery has resolved one.
            let synthetic_key = {
                let tracked = orch.state.tracked_games.read().await;
                tracked
                    .keys()
                    .find(|k| {
                        tracked
                            .get(k)
                            .map(|g| g.market.condition_id == market.condition_id && g.event_id != snapshot.event_id)
                            .unwrap_or(false)
                    })
                    .cloned()
            };
            if let Some(old_key) = synthetic_key {
                let mut tracked = orch.state.tracked_games.write().await;
                tracked.migrate_key(&old_key, snapshot.event_id.clone());
                if let Some(game) = tracked.get_mut(&snapshot.event_id) {
                    game.event_id = snapshot.event_id.clone();
                }
                tracing::info!(old_key, new_key = %snapshot.event_id, "migrated recovered position to live event id");
                continue;
            }

            let tracked_len = orch.state.tracked_games.read().await.len();
            if tracked_len >= global.max_tracked_games {
                tracing::warn!(sport = %sport, max = global.max_tracked_games, "max_tracked_games reached; dropping further discovery this tick");
                break;
            }

            let game = new_tracked_game(
                snapshot.event_id.clone(),
                market.clone(),
                snapshot,
                TeamSelection::Auto,
                is_selected,
            );
            orch.store.upsert_tracked_market(&orch.user_id, &game).await?;
            orch.state.tracked_games.write().await.add(snapshot.event_id.clone(), game);
            tracing::info!(event_id = %snapshot.event_id, sport = %sport, "tracking new game");
        }
    }
    Ok(())
}

pub async fn scoreboard_poll_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("scoreboard_poll", orch, token, 5, {
        let mut tracked = orch.state.tracked_games.write().await;
        match tracked.update_all(orch.scoreboard.as_ref()).await {
            Ok(finished) if !finished.is_empty() => {
                tracing::info!(?finished, "games finished");
            }
            Ok(_) => {}
            Err(e) => {
                drop(tracked);
                tracing::warn!(error = %e, "scoreboard refresh failed");
                orch.state.record_api_error().await;
            }
        }
    });
}

pub async fn price_poll_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("price_poll", orch, token, 10, {
        let keys: Vec<String> = orch.state.tracked_games.read().await.keys().cloned().collect();
        for key in keys {
            let condition_id = {
                let tracked = orch.state.tracked_games.read().await;
                tracked.get(&key).map(|g| g.market.condition_id.clone())
            };
            let Some(condition_id) = condition_id else { continue };

            match orch.exchange.get_market(&condition_id).await {
                Ok(market) => {
                    let mut tracked = orch.state.tracked_games.write().await;
                    if let Some(game) = tracked.get_mut(&key) {
                        game.current_yes_price = market.yes_price;
                        game.record_price(market.yes_price);
                        game.market = market;
                    }
                }
                Err(e) => {
                    tracing::warn!(condition_id = %condition_id, error = %e, "price refresh failed");
                    orch.state.record_api_error().await;
                }
            }
        }
    });
}

pub async fn trading_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("trading", orch, token, 1, {
        if let Err(e) = run_trading_tick(&orch).await {
            tracing::warn!(error = %e, "trading tick failed");
        }
    });
}

async fn run_trading_tick(orch: &Arc<Orchestrator>) -> Result<()> {
    let orchestrator_state = *orch.state.orchestrator_state.read().await;
    let tradeable = orchestrator_state.is_tradeable();
    let emergency_stop = orch.state.emergency_stop.load(Ordering::SeqCst);
    let kill_switch_active = orch.state.kill_switch.read().await.is_some();

    let keys: Vec<String> = orch.state.tracked_games.read().await.keys().cloned().collect();
    for key in keys {
        let game = { orch.state.tracked_games.read().await.get(&key).cloned() };
        let Some(game) = game else { continue };

        let runtime = orch.state.runtime_overrides.read().await.get(&game.market.condition_id).cloned();
        let config = orch
            .config
            .read()
            .await
            .effective_config(&game.sport, &game.market.condition_id, runtime.as_ref());

        if game.has_position() {
            let Some(position) = orch
                .store
                .get_open_position_for_condition(&orch.user_id, &game.market.condition_id)
                .await?
            else {
                continue;
            };
            let current_price = match position.side {
                crate::domain::Side::Yes => game.current_yes_price,
                crate::domain::Side::No => rust_decimal::Decimal::ONE - game.current_yes_price,
            };
            if let Some(signal) = decision::evaluate_exit(position.entry_price, current_price, &config, &game, emergency_stop) {
                let reason = execution::map_exit_reason(signal.reason);
                execution::execute_exit(orch, &key, reason).await?;
            }
            continue;
        }

        if !tradeable || kill_switch_active {
            continue;
        }

        let global = orch.config.read().await.global.clone();
        let (daily_loss_cap, exposure_cap) = execution::sport_caps(orch, &game.sport).await;
        let sport_stats = {
            let mut stats = orch.state.sport_stats.write().await;
            stats
                .entry(game.sport.clone())
                .or_insert_with(|| crate::domain::SportStats::new(game.sport.clone(), daily_loss_cap, exposure_cap))
                .clone()
        };

        let daily_pnl = orch.store.get_daily_realized_pnl(&orch.user_id, Utc::now().date_naive()).await?;
        let open_exposure = orch.store.get_open_exposure(&orch.user_id).await?;
        let sport_open_exposure = orch.store.get_open_exposure_for_sport(&orch.user_id, &game.sport).await?;
        let limits = GlobalRiskLimits {
            max_daily_loss_usdc: global.max_daily_loss_usdc,
            max_portfolio_exposure_usdc: global.max_portfolio_exposure_usdc,
        };
        let intended_exposure = game.current_yes_price * rust_decimal::Decimal::from(config.default_position_size);
        let risk_decision = risk_gate::evaluate_entry(
            &sport_stats,
            &limits,
            daily_pnl,
            open_exposure,
            sport_open_exposure,
            intended_exposure,
        );

        let open_positions_for_market = orch
            .store
            .get_open_position_for_condition(&orch.user_id, &game.market.condition_id)
            .await?
            .is_some() as u32;
        let has_team_position = orch.store.has_open_position_for_team(&orch.user_id, &game.home_team).await?
            || orch.store.has_open_position_for_team(&orch.user_id, &game.away_team).await?;

        let balance = orch.exchange.get_balance().await?;
        let consecutive_losses = orch.store.get_consecutive_losses(&orch.user_id).await?;
        let recent_outcomes = orch.store.get_recent_trade_outcomes(&orch.user_id, 20).await?;
        let win_rate = if recent_outcomes.is_empty() {
            None
        } else {
            Some(recent_outcomes.iter().filter(|w| **w).count() as f64 / recent_outcomes.len() as f64)
        };

        let ctx = DecisionContext {
            kill_switch_active,
            emergency_stop,
            open_positions_for_market,
            has_open_position_for_team: has_team_position,
            risk_gate_allows: risk_decision.allow,
            bankroll: balance.available.to_f64().unwrap_or(0.0),
            historical_win_rate: win_rate,
            historical_trade_count: recent_outcomes.len() as u32,
            losing_streak_multiplier: kelly::losing_streak_multiplier(consecutive_losses),
            volume_24h: game.market.volume_24h.to_f64(),
            recent_prices: Some(game.price_history.iter().filter_map(|p| p.to_f64()).collect()),
            score_differential: Some(game.home_score - game.away_score),
            spread_bps: game.market.spread.to_f64().map(|s| s * 10_000.0),
        };

        if let Some(signal) = decision::evaluate_entry(&game, &config, &ctx, Utc::now()) {
            execution::execute_entry(orch, &key, signal).await?;
        }
    }
    Ok(())
}

pub async fn health_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("health", orch, token, 60, {
        let tracked_count = orch.state.tracked_games.read().await.len();
        match orch.exchange.get_balance().await {
            Ok(balance) => {
                tracing::info!(tracked_games = tracked_count, balance = %balance.available, "health check");
            }
            Err(e) => {
                tracing::warn!(error = %e, "health check: exchange unreachable");
                orch.alert_sink
                    .send(crate::supervisor::Alert::new(
                        crate::supervisor::AlertLevel::Warning,
                        "health",
                        format!("exchange unreachable: {e}"),
                    ))
                    .await;
            }
        }
        maybe_reset_day(&orch).await;
    });
}

async fn maybe_reset_day(orch: &Arc<Orchestrator>) {
    let today = Utc::now().date_naive();
    let needs_reset = *orch.state.last_reset_date.read().await != today;
    if !needs_reset {
        return;
    }
    *orch.state.last_reset_date.write().await = today;

    let mut stats = orch.state.sport_stats.write().await;
    for s in stats.values_mut() {
        s.reset_day();
    }
    drop(stats);

    let mut state = orch.state.orchestrator_state.write().await;
    if *state == OrchestratorState::Paused {
        *state = OrchestratorState::Running;
        tracing::info!("day rollover: resuming trading from paused state");
    }
}

pub async fn cleanup_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("cleanup", orch, token, 120, {
        let evictable = orch
            .state
            .tracked_games
            .read()
            .await
            .evictable(chrono::Duration::hours(STALE_GAME_MAX_AGE_HOURS));
        if !evictable.is_empty() {
            let mut tracked = orch.state.tracked_games.write().await;
            let mut condition_ids = Vec::with_capacity(evictable.len());
            for key in &evictable {
                if let Some(game) = tracked.remove(key) {
                    condition_ids.push(game.market.condition_id);
                }
            }
            drop(tracked);
            for condition_id in &condition_ids {
                let _ = orch.store.delete_tracked_market(condition_id).await;
            }
            tracing::info!(count = evictable.len(), "cleaned up stale/finished tracked games");
        }
    });
}

pub async fn kill_switch_monitor_loop(orch: Arc<Orchestrator>, mut token: ShutdownToken) {
    loop_body!("kill_switch_monitor", orch, token, 30, {
        if let Err(e) = run_kill_switch_tick(&orch).await {
            tracing::warn!(error = %e, "kill switch tick failed");
        }
    });
}

async fn run_kill_switch_tick(orch: &Arc<Orchestrator>) -> Result<()> {
    if orch.state.kill_switch.read().await.is_some() {
        return Ok(());
    }

    let global = orch.config.read().await.global.clone();
    let daily_pnl = orch.store.get_daily_realized_pnl(&orch.user_id, Utc::now().date_naive()).await?;
    let recent = orch.store.get_recent_trade_outcomes(&orch.user_id, 5).await?;
    let api_errors = orch.state.api_errors_in_window().await;
    let orphaned = *orch.state.orphaned_order_count.read().await;

    let inputs = KillSwitchInputs {
        daily_pnl,
        max_daily_loss_usdc: global.max_daily_loss_usdc,
        recent_trade_outcomes: recent,
        api_errors_in_window: api_errors,
        orphaned_order_count: orphaned,
    };

    if let Some(trigger) = kill_switch::evaluate(&inputs) {
        orch.trip_kill_switch(trigger).await?;
    }
    Ok(())
}

/// Used by `Orchestrator::trip_kill_switch` and `emergency_shutdown` to
/// unwind every open position. Kept here so both call through the same exit
/// path as the Trading loop.
pub async fn unwind_all_positions(orch: &Arc<Orchestrator>, reason: ExitReason, discount: bool) {
    let keys: Vec<String> = orch.state.tracked_games.read().await.keys().cloned().collect();
    for key in keys {
        let has_position = orch
            .state
            .tracked_games
            .read()
            .await
            .get(&key)
            .map(|g| g.has_position())
            .unwrap_or(false);
        if !has_position {
            continue;
        }

        if let Err(e) = execution::execute_exit_at(orch, &key, reason, discount).await {
            tracing::error!(key = %key, error = %e, "forced unwind failed");
        }
    }
}
