//! The Position Store: the only authoritative record of open and closed
//! positions. Every mutation goes through row-level locking or a unique
//! partial index so that racing callers cannot both open a position on the
//! same market or the same team.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as Json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{info, instrument, warn};

use crate::config::{GlobalSettings, MarketOverride, SportConfig};
use crate::domain::{ExitReason, Position, PositionStatus, Side, TrackedGame};
use crate::error::{Result, TraderError};

/// Durable identity of a tracked game, read back during orchestrator
/// recovery; live game state is re-fetched from the scoreboard rather than
/// stored here.
#[derive(Debug, Clone)]
pub struct TrackedMarketRecord {
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub question: String,
    pub baseline_yes_price: Decimal,
    pub current_yes_price: Decimal,
    pub espn_event_id: Option<String>,
    pub is_user_selected: bool,
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Outcome of a `position_create_if_absent` call: distinguishes "this call
/// created the row" from "another call already had, or just won a race for,
/// the same market/team key".
#[derive(Debug)]
pub enum CreatePositionOutcome {
    Created(Position),
    AlreadyExists,
}

fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
    let side_str: String = row.try_get("side")?;
    let status_str: String = row.try_get("status")?;
    let exit_reason_str: Option<String> = row.try_get("exit_reason")?;

    Ok(Position {
        id: Some(row.try_get::<i64, _>("id")?),
        user_id: row.try_get("user_id")?,
        condition_id: row.try_get("condition_id")?,
        token_id: row.try_get("token_id")?,
        side: if side_str.eq_ignore_ascii_case("yes") {
            Side::Yes
        } else {
            Side::No
        },
        status: if status_str == "open" {
            PositionStatus::Open
        } else {
            PositionStatus::Closed
        },
        team_name: row.try_get("team_name")?,
        entry_price: row.try_get("entry_price")?,
        entry_size: row.try_get::<i64, _>("entry_size")? as u64,
        entry_cost: row.try_get("entry_cost")?,
        entry_reason: row.try_get("entry_reason")?,
        entry_order_id: row.try_get("entry_order_id")?,
        entry_confidence_score: row.try_get("entry_confidence_score")?,
        entry_timestamp: row.try_get("entry_timestamp")?,
        exit_price: row.try_get("exit_price")?,
        exit_size: row
            .try_get::<Option<i64>, _>("exit_size")?
            .map(|v| v as u64),
        exit_proceeds: row.try_get("exit_proceeds")?,
        exit_reason: exit_reason_str.and_then(|s| match s.as_str() {
            "take_profit" => Some(ExitReason::TakeProfit),
            "stop_loss" => Some(ExitReason::StopLoss),
            "game_finished" => Some(ExitReason::GameFinished),
            "time_exit" => Some(ExitReason::TimeExit),
            "segment_exit" => Some(ExitReason::SegmentExit),
            "emergency_stop" => Some(ExitReason::EmergencyStop),
            "kill_switch" => Some(ExitReason::KillSwitch),
            _ => None,
        }),
        exit_order_id: row.try_get("exit_order_id")?,
        realized_pnl: row.try_get("realized_pnl")?,
        close_timestamp: row.try_get("close_timestamp")?,
    })
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Positions ====================

    /// Atomically create an open position unless one already exists for this
    /// (user, condition_id) or for this (user, team_name) — whichever unique
    /// index the insert collides with tells us which invariant held. Relies
    /// on the partial unique indexes in migrations/0001_init.sql rather than
    /// an explicit `SELECT ... FOR UPDATE`, so the database itself is the
    /// single point of truth for the race.
    #[instrument(skip(self, position))]
    pub async fn position_create_if_absent(
        &self,
        position: &Position,
    ) -> Result<CreatePositionOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp
            )
            VALUES ($1, $2, $3, $4, 'open', $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT DO NOTHING
            RETURNING id, user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp,
                exit_price, exit_size, exit_proceeds, exit_reason, exit_order_id,
                realized_pnl, close_timestamp
            "#,
        )
        .bind(&position.user_id)
        .bind(&position.condition_id)
        .bind(&position.token_id)
        .bind(position.side.as_str())
        .bind(&position.team_name)
        .bind(position.entry_price)
        .bind(position.entry_size as i64)
        .bind(position.entry_cost)
        .bind(&position.entry_reason)
        .bind(&position.entry_order_id)
        .bind(position.entry_confidence_score)
        .bind(position.entry_timestamp)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(CreatePositionOutcome::Created(row_to_position(&row)?)),
            None => {
                warn!(
                    condition_id = %position.condition_id,
                    team = %position.team_name,
                    "position_create_if_absent lost the race or a position already exists"
                );
                Ok(CreatePositionOutcome::AlreadyExists)
            }
        }
    }

    /// Close a position and record realized P&L in one statement. A second
    /// call on an already-closed id is a no-op: the `WHERE status = 'open'`
    /// guard means the UPDATE matches zero rows and the existing row is
    /// returned unchanged.
    #[instrument(skip(self))]
    pub async fn position_close(
        &self,
        id: i64,
        exit_price: Decimal,
        exit_size: u64,
        exit_proceeds: Decimal,
        reason: ExitReason,
        exit_order_id: &str,
    ) -> Result<Position> {
        let updated = sqlx::query(
            r#"
            UPDATE positions SET
                status = 'closed',
                exit_price = $1,
                exit_size = $2,
                exit_proceeds = $3,
                exit_reason = $4,
                exit_order_id = $5,
                realized_pnl = $3 - entry_cost,
                close_timestamp = NOW()
            WHERE id = $6 AND status = 'open'
            RETURNING id, user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp,
                exit_price, exit_size, exit_proceeds, exit_reason, exit_order_id,
                realized_pnl, close_timestamp
            "#,
        )
        .bind(exit_price)
        .bind(exit_size as i64)
        .bind(exit_proceeds)
        .bind(reason.as_str())
        .bind(exit_order_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return row_to_position(&row);
        }

        let existing = sqlx::query(
            r#"
            SELECT id, user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp,
                exit_price, exit_size, exit_proceeds, exit_reason, exit_order_id,
                realized_pnl, close_timestamp
            FROM positions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| TraderError::ValidationError(format!("position {} not found", id)))?;

        row_to_position(&existing)
    }

    pub async fn get_open_position_for_condition(
        &self,
        user_id: &str,
        condition_id: &str,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp,
                exit_price, exit_size, exit_proceeds, exit_reason, exit_order_id,
                realized_pnl, close_timestamp
            FROM positions WHERE user_id = $1 AND condition_id = $2 AND status = 'open'
            "#,
        )
        .bind(user_id)
        .bind(condition_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_position).transpose()
    }

    pub async fn get_open_positions(&self, user_id: &str) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, condition_id, token_id, side, status, team_name,
                entry_price, entry_size, entry_cost, entry_reason, entry_order_id,
                entry_confidence_score, entry_timestamp,
                exit_price, exit_size, exit_proceeds, exit_reason, exit_order_id,
                realized_pnl, close_timestamp
            FROM positions WHERE user_id = $1 AND status = 'open'
            ORDER BY entry_timestamp
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_position).collect()
    }

    pub async fn has_open_position_for_team(&self, user_id: &str, team_name: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM positions WHERE user_id = $1 AND team_name = $2 AND status = 'open'",
        )
        .bind(user_id)
        .bind(team_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Realized P&L for positions closed today, used by the Risk Gate's
    /// daily-loss check.
    pub async fn get_daily_realized_pnl(&self, user_id: &str, date: NaiveDate) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) AS total
            FROM positions
            WHERE user_id = $1 AND status = 'closed' AND close_timestamp::date = $2
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    /// Total entry cost across open positions, used as the portfolio
    /// exposure figure against `max_portfolio_exposure_usdc`.
    pub async fn get_open_exposure(&self, user_id: &str) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(entry_cost), 0) AS total FROM positions WHERE user_id = $1 AND status = 'open'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    /// Entry cost across open positions for one sport, used against
    /// `SportStats::exposure_cap`.
    pub async fn get_open_exposure_for_sport(&self, user_id: &str, sport: &str) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(p.entry_cost), 0) AS total
            FROM positions p
            JOIN tracked_markets m ON m.condition_id = p.condition_id AND m.user_id = p.user_id
            WHERE p.user_id = $1 AND p.status = 'open' AND m.sport = $2
            "#,
        )
        .bind(user_id)
        .bind(sport)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    /// Outcomes of the last `n` closed positions, most recent first, used by
    /// the Kill-Switch Monitor's "≥4 losses in last 5 trades" trigger.
    pub async fn get_recent_trade_outcomes(&self, user_id: &str, n: i64) -> Result<Vec<bool>> {
        let rows = sqlx::query(
            r#"
            SELECT realized_pnl > 0 AS is_win
            FROM positions
            WHERE user_id = $1 AND status = 'closed'
            ORDER BY close_timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| Ok(r.try_get::<bool, _>("is_win")?)).collect()
    }

    // ==================== Global settings ====================

    pub async fn get_kill_switch_state(&self, user_id: &str) -> Result<Option<(DateTime<Utc>, String)>> {
        let row = sqlx::query(
            "SELECT kill_switch_triggered_at, kill_switch_reason FROM global_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| {
            let at: Option<DateTime<Utc>> = r.try_get("kill_switch_triggered_at").ok()?;
            let reason: Option<String> = r.try_get("kill_switch_reason").ok()?;
            at.zip(reason)
        }))
    }

    #[instrument(skip(self))]
    pub async fn trigger_kill_switch(&self, user_id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_settings (user_id, max_daily_loss_usdc, max_portfolio_exposure_usdc,
                max_slippage_pct, order_fill_timeout_seconds, kill_switch_triggered_at, kill_switch_reason)
            VALUES ($1, 0, 0, 0, 60, NOW(), $2)
            ON CONFLICT (user_id) DO UPDATE SET
                kill_switch_triggered_at = NOW(),
                kill_switch_reason = $2,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        warn!(user_id, reason, "kill switch triggered");
        Ok(())
    }

    pub async fn reset_kill_switch(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE global_settings SET kill_switch_triggered_at = NULL, kill_switch_reason = NULL, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_emergency_stop(&self, user_id: &str, value: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_settings (user_id, max_daily_loss_usdc, max_portfolio_exposure_usdc,
                max_slippage_pct, order_fill_timeout_seconds, emergency_stop)
            VALUES ($1, 0, 0, 0, 60, $2)
            ON CONFLICT (user_id) DO UPDATE SET emergency_stop = $2, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Global settings, sport/market configs ====================

    /// Loads the full `GlobalSettings` row, or `None` if the user has never
    /// had one written (the caller falls back to file/env defaults).
    pub async fn load_global_settings(&self, user_id: &str) -> Result<Option<GlobalSettings>> {
        let row = sqlx::query(
            r#"
            SELECT bot_enabled, max_daily_loss_usdc, max_portfolio_exposure_usdc,
                max_slippage_pct, order_fill_timeout_seconds, auto_trade_all, bot_config_json
            FROM global_settings WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let bot_config: Json = row.try_get("bot_config_json")?;
        let selected_event_ids = bot_config
            .get("selected_event_ids")
            .and_then(Json::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let max_tracked_games = bot_config
            .get("max_tracked_games")
            .and_then(Json::as_u64)
            .map(|v| v as usize)
            .unwrap_or(100);

        Ok(Some(GlobalSettings {
            bot_enabled: row.try_get("bot_enabled")?,
            max_daily_loss_usdc: row.try_get("max_daily_loss_usdc")?,
            max_portfolio_exposure_usdc: row.try_get("max_portfolio_exposure_usdc")?,
            max_slippage_pct: row.try_get("max_slippage_pct")?,
            order_fill_timeout_seconds: row.try_get::<i32, _>("order_fill_timeout_seconds")? as u64,
            auto_trade_all: row.try_get("auto_trade_all")?,
            selected_event_ids,
            max_tracked_games,
        }))
    }

    pub async fn save_global_settings(&self, user_id: &str, settings: &GlobalSettings) -> Result<()> {
        let bot_config = serde_json::json!({
            "selected_event_ids": settings.selected_event_ids,
            "max_tracked_games": settings.max_tracked_games,
        });
        sqlx::query(
            r#"
            INSERT INTO global_settings (
                user_id, bot_enabled, max_daily_loss_usdc, max_portfolio_exposure_usdc,
                max_slippage_pct, order_fill_timeout_seconds, auto_trade_all, bot_config_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                bot_enabled = $2,
                max_daily_loss_usdc = $3,
                max_portfolio_exposure_usdc = $4,
                max_slippage_pct = $5,
                order_fill_timeout_seconds = $6,
                auto_trade_all = $7,
                bot_config_json = $8,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(settings.bot_enabled)
        .bind(settings.max_daily_loss_usdc)
        .bind(settings.max_portfolio_exposure_usdc)
        .bind(settings.max_slippage_pct)
        .bind(settings.order_fill_timeout_seconds as i32)
        .bind(settings.auto_trade_all)
        .bind(bot_config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count of consecutive losing trades, maintained by the Kill-Switch
    /// Monitor's loss-streak trigger and the position-size reduction table.
    pub async fn get_consecutive_losses(&self, user_id: &str) -> Result<u32> {
        let row = sqlx::query("SELECT consecutive_losses FROM global_settings WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<i32, _>("consecutive_losses").unwrap_or(0) as u32).unwrap_or(0))
    }

    pub async fn set_consecutive_losses(&self, user_id: &str, value: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_settings (user_id, max_daily_loss_usdc, max_portfolio_exposure_usdc,
                max_slippage_pct, order_fill_timeout_seconds, consecutive_losses)
            VALUES ($1, 0, 0, 0, 60, $2)
            ON CONFLICT (user_id) DO UPDATE SET consecutive_losses = $2, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(value as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_sport_configs(&self, user_id: &str) -> Result<HashMap<String, SportConfig>> {
        let rows = sqlx::query(
            "SELECT sport, enabled, priority, daily_loss_cap, exposure_cap, config_json FROM sport_configs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let sport: String = row.try_get("sport")?;
            let config_json: Json = row.try_get("config_json")?;
            let mut cfg: SportConfig = serde_json::from_value(config_json).unwrap_or_default();
            cfg.enabled = row.try_get("enabled")?;
            cfg.priority = row.try_get::<i16, _>("priority")? as u8;
            cfg.daily_loss_cap = row.try_get("daily_loss_cap")?;
            cfg.exposure_cap = row.try_get("exposure_cap")?;
            out.insert(sport, cfg);
        }
        Ok(out)
    }

    pub async fn save_sport_config(&self, user_id: &str, sport: &str, cfg: &SportConfig) -> Result<()> {
        let config_json = serde_json::to_value(cfg).unwrap_or(Json::Null);
        sqlx::query(
            r#"
            INSERT INTO sport_configs (user_id, sport, enabled, priority, daily_loss_cap, exposure_cap, config_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, sport) DO UPDATE SET
                enabled = $3, priority = $4, daily_loss_cap = $5, exposure_cap = $6, config_json = $7
            "#,
        )
        .bind(user_id)
        .bind(sport)
        .bind(cfg.enabled)
        .bind(cfg.priority as i16)
        .bind(cfg.daily_loss_cap)
        .bind(cfg.exposure_cap)
        .bind(config_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_market_overrides(&self, user_id: &str) -> Result<HashMap<String, MarketOverride>> {
        let rows = sqlx::query("SELECT condition_id, config_json FROM market_configs WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let condition_id: String = row.try_get("condition_id")?;
            let config_json: Json = row.try_get("config_json")?;
            out.insert(condition_id, serde_json::from_value(config_json).unwrap_or_default());
        }
        Ok(out)
    }

    pub async fn save_market_override(&self, user_id: &str, condition_id: &str, cfg: &MarketOverride) -> Result<()> {
        let config_json = serde_json::to_value(cfg).unwrap_or(Json::Null);
        sqlx::query(
            r#"
            INSERT INTO market_configs (user_id, condition_id, config_json)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, condition_id) DO UPDATE SET config_json = $3
            "#,
        )
        .bind(user_id)
        .bind(condition_id)
        .bind(config_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Tracked markets (recovery) ====================

    /// Upserts the durable identity of a tracked game: the scoreboard/market
    /// pairing and baseline price survive a restart; live game state
    /// (period, clock, score) is re-fetched from the scoreboard instead of
    /// round-tripping through here.
    #[instrument(skip(self, game))]
    pub async fn upsert_tracked_market(&self, user_id: &str, game: &TrackedGame) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_markets (
                condition_id, user_id, yes_token_id, no_token_id, sport, home_team, away_team,
                question, baseline_yes_price, current_yes_price, espn_event_id,
                is_live, is_finished, is_user_selected, last_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
            ON CONFLICT (condition_id) DO UPDATE SET
                user_id = $2,
                current_yes_price = $10,
                espn_event_id = $11,
                is_live = $12,
                is_finished = $13,
                is_user_selected = $14,
                last_updated_at = NOW()
            "#,
        )
        .bind(&game.market.condition_id)
        .bind(user_id)
        .bind(&game.market.yes_token_id)
        .bind(&game.market.no_token_id)
        .bind(&game.sport)
        .bind(&game.home_team)
        .bind(&game.away_team)
        .bind(&game.market.question)
        .bind(game.baseline_yes_price)
        .bind(game.current_yes_price)
        .bind(&game.event_id)
        .bind(game.status.is_live())
        .bind(game.status.is_finished())
        .bind(game.is_user_selected)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rows surviving from a prior run, keyed initially by condition id
    /// (the only key guaranteed stable across a restart) until Discovery
    /// resolves the real scoreboard event id (§4.10 recovery).
    pub async fn list_tracked_markets(&self, user_id: &str) -> Result<Vec<TrackedMarketRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT condition_id, yes_token_id, no_token_id, sport, home_team, away_team, question,
                baseline_yes_price, current_yes_price, espn_event_id, is_finished, is_user_selected
            FROM tracked_markets WHERE user_id = $1 AND is_finished = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TrackedMarketRecord {
                    condition_id: row.try_get("condition_id")?,
                    yes_token_id: row.try_get("yes_token_id")?,
                    no_token_id: row.try_get("no_token_id")?,
                    sport: row.try_get("sport")?,
                    home_team: row.try_get("home_team")?,
                    away_team: row.try_get("away_team")?,
                    question: row.try_get("question")?,
                    baseline_yes_price: row.try_get("baseline_yes_price")?,
                    current_yes_price: row.try_get("current_yes_price")?,
                    espn_event_id: row.try_get("espn_event_id")?,
                    is_user_selected: row.try_get("is_user_selected")?,
                })
            })
            .collect()
    }

    pub async fn delete_tracked_market(&self, condition_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tracked_markets WHERE condition_id = $1")
            .bind(condition_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Activity log ====================

    pub async fn append_activity_log(
        &self,
        user_id: &str,
        level: &str,
        category: &str,
        message: &str,
        details: Option<Json>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_log (user_id, level, category, message, details) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(level)
        .bind(category)
        .bind(message)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_as_str_round_trips_through_row_mapping() {
        assert_eq!(Side::Yes.as_str(), "YES");
        assert_eq!(Side::No.as_str(), "NO");
    }
}
