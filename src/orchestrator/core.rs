//! The `Orchestrator`: owns configuration, the exchange/scoreboard clients,
//! the Position Store, and the shared state the six loops and the
//! kill-switch monitor operate on. `new()` wires collaborators; `start()`
//! spawns the loops; `stop()` runs the same `GracefulShutdown` phased
//! sequence regardless of whether it was triggered by a signal or by
//! `emergency_shutdown`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::adapters::postgres::PostgresStore;
use crate::config::AppConfig;
use crate::coordination::lifecycle::LifecycleManager;
use crate::coordination::shutdown::{GracefulShutdown, ShutdownConfig};
use crate::coordination::shutdown::ShutdownSignal;
use crate::domain::{ExitReason, OrchestratorState};
use crate::error::{Result, TraderError};
use crate::exchange::ExchangeClient;
use crate::scoreboard::ScoreboardClient;
use crate::strategy::KillSwitchTrigger;
use crate::supervisor::{Alert, AlertLevel, AlertSink};

use super::loops;
use super::recovery;
use super::state::{KillSwitchState, SharedState};

const DRAIN_POLL_INTERVAL_MS: u64 = 500;

/// One user's running bot: the six loops (discovery, scoreboard poll, price
/// poll, trading, health, cleanup) plus the kill-switch monitor, all sharing
/// one `SharedState` and reporting into one `LifecycleManager`.
pub struct Orchestrator {
    pub user_id: String,
    pub config: tokio::sync::RwLock<AppConfig>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub scoreboard: Arc<dyn ScoreboardClient>,
    pub store: Arc<PostgresStore>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub state: Arc<SharedState>,
    pub lifecycle: Arc<LifecycleManager>,
    shutdown: Arc<GracefulShutdown>,
    handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

const LOOP_NAMES: [(&str, u8); 7] = [
    ("discovery", 0),
    ("scoreboard_poll", 1),
    ("price_poll", 2),
    ("trading", 3),
    ("kill_switch_monitor", 3),
    ("health", 4),
    ("cleanup", 5),
];

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        config: AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        scoreboard: Arc<dyn ScoreboardClient>,
        store: Arc<PostgresStore>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            config: tokio::sync::RwLock::new(config),
            exchange,
            scoreboard,
            store,
            alert_sink,
            state: Arc::new(SharedState::new()),
            lifecycle: Arc::new(LifecycleManager::with_defaults()),
            shutdown: Arc::new(GracefulShutdown::new(ShutdownConfig::default())),
            handles: AsyncMutex::new(Vec::new()),
        })
    }

    /// Convenience constructor using the always-available tracing alert sink.
    pub fn with_defaults(
        user_id: String,
        config: AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        scoreboard: Arc<dyn ScoreboardClient>,
        store: Arc<PostgresStore>,
    ) -> Arc<Self> {
        Self::new(user_id, config, exchange, scoreboard, store, Arc::new(crate::supervisor::TracingAlertSink))
    }

    pub fn shutdown_handle(&self) -> Arc<GracefulShutdown> {
        self.shutdown.clone()
    }

    /// Rebuild in-memory state from the Position Store. Must be called once
    /// before `start()`.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        recovery::initialize(self).await
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.orchestrator_state.write().await;
            if !state.can_transition_to(OrchestratorState::Starting) {
                return Err(TraderError::InvalidStateTransition {
                    from: state.to_string(),
                    to: OrchestratorState::Starting.to_string(),
                });
            }
            *state = OrchestratorState::Starting;
        }

        for (name, priority) in LOOP_NAMES {
            self.lifecycle.register(name, priority).await;
        }

        {
            let mut handles = self.handles.lock().await;
            handles.push(tokio::spawn(loops::discovery_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::scoreboard_poll_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::price_poll_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::trading_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::kill_switch_monitor_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::health_loop(self.clone(), self.shutdown.token())));
            handles.push(tokio::spawn(loops::cleanup_loop(self.clone(), self.shutdown.token())));
        }

        let initial = if self.config.read().await.global.bot_enabled {
            OrchestratorState::Running
        } else {
            OrchestratorState::Paused
        };
        *self.state.orchestrator_state.write().await = initial;
        tracing::info!(state = %initial, "orchestrator started");
        Ok(())
    }

    /// Run the six-phase graceful shutdown (§4.10): stop accepting new
    /// entries, drain pending orders, checkpoint tracked markets, close
    /// WebSockets (none held here), flush the database (handled by sqlx's
    /// own pool drain on drop), then abort the loop tasks.
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        *self.state.orchestrator_state.write().await = OrchestratorState::Stopping;
        self.shutdown.request_shutdown(ShutdownSignal::Graceful);

        let drain_state = self.state.clone();
        let checkpoint_orch = self.clone();

        let outcome = self
            .shutdown
            .execute(
                || Box::pin(async move {}),
                move || {
                    Box::pin(async move {
                        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
                        loop {
                            if drain_state.pending_orders.read().await.is_empty() {
                                return true;
                            }
                            if tokio::time::Instant::now() >= deadline {
                                return false;
                            }
                            tokio::time::sleep(Duration::from_millis(DRAIN_POLL_INTERVAL_MS)).await;
                        }
                    })
                },
                move || {
                    Box::pin(async move {
                        let tracked = checkpoint_orch.state.tracked_games.read().await;
                        for game in tracked.values() {
                            if let Err(e) = checkpoint_orch.store.upsert_tracked_market(&checkpoint_orch.user_id, game).await {
                                return Err(e.to_string());
                            }
                        }
                        Ok(())
                    })
                },
                || Box::pin(async move {}),
                || Box::pin(async move { Ok::<(), String>(()) }),
            )
            .await;

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "graceful shutdown did not complete cleanly");
        }

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        drop(handles);

        *self.state.orchestrator_state.write().await = OrchestratorState::Stopped;
        tracing::info!("orchestrator stopped");
        Ok(())
    }

    /// Immediately stop trading and, if requested, unwind every open
    /// position at a 2%-discounted price before running the normal shutdown
    /// sequence.
    pub async fn emergency_shutdown(self: &Arc<Self>, close_positions: bool) -> Result<()> {
        self.state.emergency_stop.store(true, Ordering::SeqCst);
        self.alert_sink
            .send(Alert::new(AlertLevel::Critical, "orchestrator", "emergency shutdown requested"))
            .await;

        if close_positions {
            loops::unwind_all_positions(self, ExitReason::EmergencyStop, true).await;
        }

        self.stop().await
    }

    /// Trip the kill switch: persist it, raise an alert, and unwind every
    /// open position at a 2% discount. Entries stay blocked until a manual
    /// reset clears `global_settings.kill_switch_triggered`.
    pub async fn trip_kill_switch(self: &Arc<Self>, trigger: KillSwitchTrigger) -> Result<()> {
        let reason = trigger.as_str();
        self.store.trigger_kill_switch(&self.user_id, reason).await?;
        *self.state.kill_switch.write().await = Some(KillSwitchState {
            triggered_at: chrono::Utc::now(),
            reason: reason.to_string(),
        });

        self.alert_sink
            .send(Alert::new(AlertLevel::Critical, "kill_switch", format!("kill switch tripped: {reason}")))
            .await;
        let _ = self.store.append_activity_log(&self.user_id, "critical", "kill_switch", reason, None).await;

        loops::unwind_all_positions(self, ExitReason::KillSwitch, true).await;
        Ok(())
    }

    /// Clear a kill-switch trip. Does not resume trading by itself if the
    /// orchestrator is `Paused` for an unrelated reason (e.g. daily loss).
    pub async fn reset_kill_switch(self: &Arc<Self>) -> Result<()> {
        self.store.reset_kill_switch(&self.user_id).await?;
        *self.state.kill_switch.write().await = None;
        *self.state.orphaned_order_count.write().await = 0;
        tracing::info!("kill switch reset");
        Ok(())
    }
}
