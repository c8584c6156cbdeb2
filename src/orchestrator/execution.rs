//! Order execution (§4.10): turns an `EntrySignal`/exit decision into a
//! placed order, waits for a terminal fill, and persists the result. Both
//! entry points take the per-token entry lock so a racing kill-switch
//! unwind and a normal Trading-loop tick can never both act on the same
//! token in the same instant.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::adapters::postgres::CreatePositionOutcome;
use crate::domain::{
    ExitReason, OrderAction, OrderRequest, PendingOrder, Position, PositionStatus, Side, SportStats,
};
use crate::error::{Result, TraderError};
use crate::exchange::FillOutcome;
use crate::strategy::decision::ExitReasonKind;
use crate::strategy::EntrySignal;
use crate::supervisor::{Alert, AlertLevel};

use super::core::Orchestrator;
use super::state::SharedState;

/// Per-sport loss/exposure caps for `SportStats`: the configured sport layer
/// if present, otherwise the global limits (a sport with no explicit caps is
/// still bound by the account-wide ones).
pub(super) async fn sport_caps(orch: &Orchestrator, sport: &str) -> (Decimal, Decimal) {
    let config = orch.config.read().await;
    match config.sports.get(sport) {
        Some(cfg) => (cfg.daily_loss_cap, cfg.exposure_cap),
        None => (config.global.max_daily_loss_usdc, config.global.max_portfolio_exposure_usdc),
    }
}

/// Map a decision-time exit reason to the persisted one. `ExitReason::KillSwitch`
/// has no `ExitReasonKind` counterpart — the kill switch bypasses the Decision
/// Engine entirely and is applied directly by `Orchestrator::trip_kill_switch`.
pub fn map_exit_reason(kind: ExitReasonKind) -> ExitReason {
    match kind {
        ExitReasonKind::EmergencyStop => ExitReason::EmergencyStop,
        ExitReasonKind::TakeProfit => ExitReason::TakeProfit,
        ExitReasonKind::StopLoss => ExitReason::StopLoss,
        ExitReasonKind::GameFinished => ExitReason::GameFinished,
        ExitReasonKind::RestrictedSegment => ExitReason::SegmentExit,
        ExitReasonKind::TimeExit => ExitReason::TimeExit,
    }
}

/// Execute an entry signal for the tracked game at `key`. A no-op if
/// another tick already holds the token's entry lock, the game has since
/// gained a position, or a position already exists for its condition id.
pub async fn execute_entry(orch: &Arc<Orchestrator>, key: &str, signal: EntrySignal) -> Result<()> {
    let Some(_guard) = SharedState::try_acquire_entry_lock(&orch.state, &signal.token_id) else {
        return Ok(());
    };

    let condition_id = {
        let tracked = orch.state.tracked_games.read().await;
        match tracked.get(key) {
            Some(game) if game.has_position() => return Ok(()),
            Some(game) => game.market.condition_id.clone(),
            None => return Ok(()),
        }
    };

    if orch
        .store
        .get_open_position_for_condition(&orch.user_id, &condition_id)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let (max_slippage, fill_timeout) = {
        let config = orch.config.read().await;
        (config.global.max_slippage_pct, config.global.order_fill_timeout_seconds)
    };

    let slippage = orch
        .exchange
        .check_slippage(&condition_id, signal.price, max_slippage)
        .await?;
    if !slippage.ok {
        tracing::info!(condition_id = %condition_id, "entry skipped: slippage check failed");
        return Ok(());
    }

    let request = OrderRequest::entry(
        condition_id.clone(),
        signal.token_id.clone(),
        signal.side,
        signal.size,
        signal.price,
    );
    let order_id = orch.exchange.place_order(&request).await?;

    orch.state.pending_orders.write().await.insert(
        order_id.clone(),
        PendingOrder {
            order_id: order_id.clone(),
            condition_id: condition_id.clone(),
            token_id: signal.token_id.clone(),
            side: signal.side,
            action: OrderAction::Buy,
            price: signal.price,
            size: signal.size,
            placed_at: Utc::now(),
        },
    );

    let outcome = orch.exchange.wait_for_fill(&order_id, fill_timeout).await?;
    orch.state.pending_orders.write().await.remove(&order_id);

    if outcome != FillOutcome::Filled {
        let _ = orch.exchange.cancel_order(&order_id).await;
        tracing::info!(condition_id = %condition_id, order_id = %order_id, ?outcome, "entry order did not fill");
        return Ok(());
    }

    let entry_cost = signal.price * Decimal::from(signal.size);
    let position = Position {
        id: None,
        user_id: orch.user_id.clone(),
        condition_id: condition_id.clone(),
        token_id: signal.token_id.clone(),
        side: signal.side,
        status: PositionStatus::Open,
        team_name: signal.team.clone(),
        entry_price: signal.price,
        entry_size: signal.size,
        entry_cost,
        entry_reason: signal.reason.clone(),
        entry_order_id: order_id.clone(),
        entry_confidence_score: signal.confidence_score,
        entry_timestamp: Utc::now(),
        exit_price: None,
        exit_size: None,
        exit_proceeds: None,
        exit_reason: None,
        exit_order_id: None,
        realized_pnl: None,
        close_timestamp: None,
    };

    match orch.store.position_create_if_absent(&position).await {
        Ok(CreatePositionOutcome::Created(created)) => {
            let mut tracked = orch.state.tracked_games.write().await;
            let sport = tracked.get(key).map(|g| g.sport.clone());
            if let Some(game) = tracked.get_mut(key) {
                game.position_id = created.id;
            }
            drop(tracked);

            if let Some(sport) = sport {
                let (daily_loss_cap, exposure_cap) = sport_caps(orch, &sport).await;
                let mut stats = orch.state.sport_stats.write().await;
                stats
                    .entry(sport.clone())
                    .or_insert_with(|| SportStats::new(sport, daily_loss_cap, exposure_cap))
                    .open_positions += 1;
            }

            orch.alert_sink
                .send(Alert::new(
                    AlertLevel::Info,
                    "execution",
                    format!("entered {} {} @ {} x{}", signal.team, signal.side, signal.price, signal.size),
                ))
                .await;
            let _ = orch
                .store
                .append_activity_log(&orch.user_id, "info", "entry", &signal.reason, None)
                .await;
            Ok(())
        }
        Ok(CreatePositionOutcome::AlreadyExists) => {
            tracing::warn!(
                condition_id = %condition_id,
                order_id = %order_id,
                "fill landed but a position already existed for this market/team; leaving the fill unreconciled"
            );
            Ok(())
        }
        Err(e) => {
            orch.state.increment_orphaned().await;
            orch.alert_sink
                .send(Alert::new(
                    AlertLevel::Critical,
                    "execution",
                    format!("order {order_id} filled but position write failed: {e}"),
                ))
                .await;
            Err(TraderError::OrphanedOrder {
                order_id,
                reason: e.to_string(),
            })
        }
    }
}

/// Execute an exit for the tracked game at `key` at the live market price.
pub async fn execute_exit(orch: &Arc<Orchestrator>, key: &str, reason: ExitReason) -> Result<()> {
    execute_exit_at(orch, key, reason, false).await
}

/// Execute an exit. When `discount` is set (the kill-switch unwind path),
/// the order is priced 2% below the last observed price on the position's
/// side rather than at the live price, to clear the book faster.
pub async fn execute_exit_at(orch: &Arc<Orchestrator>, key: &str, reason: ExitReason, discount: bool) -> Result<()> {
    let condition_id = {
        let tracked = orch.state.tracked_games.read().await;
        match tracked.get(key) {
            Some(game) if game.has_position() => game.market.condition_id.clone(),
            _ => return Ok(()),
        }
    };

    let Some(position) = orch
        .store
        .get_open_position_for_condition(&orch.user_id, &condition_id)
        .await?
    else {
        let mut tracked = orch.state.tracked_games.write().await;
        if let Some(game) = tracked.get_mut(key) {
            game.position_id = None;
        }
        return Ok(());
    };

    let Some(_guard) = SharedState::try_acquire_entry_lock(&orch.state, &position.token_id) else {
        return Ok(());
    };

    let live_price = {
        let tracked = orch.state.tracked_games.read().await;
        tracked.get(key).map(|g| match position.side {
            Side::Yes => g.current_yes_price,
            Side::No => Decimal::ONE - g.current_yes_price,
        })
    }
    .unwrap_or(position.entry_price);
    let exit_price = if discount {
        crate::strategy::kill_switch::unwind_price(live_price)
    } else {
        live_price
    };

    let request = OrderRequest::exit(
        condition_id.clone(),
        position.token_id.clone(),
        position.side,
        position.entry_size,
        exit_price,
    );
    let order_id = orch.exchange.place_order(&request).await?;

    orch.state.pending_orders.write().await.insert(
        order_id.clone(),
        PendingOrder {
            order_id: order_id.clone(),
            condition_id: condition_id.clone(),
            token_id: position.token_id.clone(),
            side: position.side,
            action: OrderAction::Sell,
            price: exit_price,
            size: position.entry_size,
            placed_at: Utc::now(),
        },
    );

    let fill_timeout = orch.config.read().await.global.order_fill_timeout_seconds;
    let outcome = orch.exchange.wait_for_fill(&order_id, fill_timeout).await?;
    orch.state.pending_orders.write().await.remove(&order_id);

    if outcome != FillOutcome::Filled {
        let _ = orch.exchange.cancel_order(&order_id).await;
        tracing::warn!(condition_id = %condition_id, order_id = %order_id, ?outcome, "exit order did not fill; retrying next tick");
        return Ok(());
    }

    let exit_proceeds = exit_price * Decimal::from(position.entry_size);
    let position_id = position
        .id
        .expect("a position read back from the store always has an id");
    let closed = orch
        .store
        .position_close(position_id, exit_price, position.entry_size, exit_proceeds, reason, &order_id)
        .await?;

    {
        let mut tracked = orch.state.tracked_games.write().await;
        if let Some(game) = tracked.get_mut(key) {
            game.position_id = None;
        }
    }

    if let Some(pnl) = closed.realized_pnl {
        let sport = {
            let tracked = orch.state.tracked_games.read().await;
            tracked.get(key).map(|g| g.sport.clone())
        };
        if let Some(sport) = sport {
            let (daily_loss_cap, exposure_cap) = sport_caps(orch, &sport).await;
            let mut stats = orch.state.sport_stats.write().await;
            let entry = stats
                .entry(sport.clone())
                .or_insert_with(|| SportStats::new(sport, daily_loss_cap, exposure_cap));
            entry.record_trade(pnl);
            entry.open_positions = entry.open_positions.saturating_sub(1);
        }
    }

    orch.alert_sink
        .send(Alert::new(
            AlertLevel::Info,
            "execution",
            format!("exited {} @ {} ({})", position.team_name, exit_price, reason),
        ))
        .await;
    let _ = orch
        .store
        .append_activity_log(&orch.user_id, "info", "exit", reason.as_str(), None)
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_exit_reason_covers_every_decision_time_kind() {
        assert_eq!(map_exit_reason(ExitReasonKind::EmergencyStop), ExitReason::EmergencyStop);
        assert_eq!(map_exit_reason(ExitReasonKind::TakeProfit), ExitReason::TakeProfit);
        assert_eq!(map_exit_reason(ExitReasonKind::StopLoss), ExitReason::StopLoss);
        assert_eq!(map_exit_reason(ExitReasonKind::GameFinished), ExitReason::GameFinished);
        assert_eq!(map_exit_reason(ExitReasonKind::RestrictedSegment), ExitReason::SegmentExit);
        assert_eq!(map_exit_reason(ExitReasonKind::TimeExit), ExitReason::TimeExit);
    }
}
