//! Shared mutable state for the orchestrator's loops (§4.10). Every field is
//! locked independently so one loop's tick never blocks another's; the entry
//! lock is the one exception, guarding a single token across both the
//! Trading loop and any concurrent unwind triggered by the kill switch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::config::RuntimeOverride;
use crate::domain::{OrchestratorState, PendingOrder, SportStats};
use crate::strategy::GameTracker;

const API_ERROR_WINDOW_SECONDS: i64 = 300;

/// Kill-switch trip record kept in memory alongside the persisted row in
/// `global_settings` so every loop can check it without a database round
/// trip.
#[derive(Debug, Clone)]
pub struct KillSwitchState {
    pub triggered_at: DateTime<Utc>,
    pub reason: String,
}

pub struct SharedState {
    pub orchestrator_state: RwLock<OrchestratorState>,
    pub tracked_games: RwLock<GameTracker>,
    pub sport_stats: RwLock<HashMap<String, SportStats>>,
    pub pending_orders: RwLock<HashMap<String, PendingOrder>>,
    entry_locks: StdMutex<HashSet<String>>,
    pub kill_switch: RwLock<Option<KillSwitchState>>,
    pub emergency_stop: AtomicBool,
    api_error_log: RwLock<Vec<DateTime<Utc>>>,
    pub orphaned_order_count: RwLock<u32>,
    pub runtime_overrides: RwLock<HashMap<String, RuntimeOverride>>,
    pub last_reset_date: RwLock<NaiveDate>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            orchestrator_state: RwLock::new(OrchestratorState::Stopped),
            tracked_games: RwLock::new(GameTracker::new()),
            sport_stats: RwLock::new(HashMap::new()),
            pending_orders: RwLock::new(HashMap::new()),
            entry_locks: StdMutex::new(HashSet::new()),
            kill_switch: RwLock::new(None),
            emergency_stop: AtomicBool::new(false),
            api_error_log: RwLock::new(Vec::new()),
            orphaned_order_count: RwLock::new(0),
            runtime_overrides: RwLock::new(HashMap::new()),
            last_reset_date: RwLock::new(Utc::now().date_naive()),
        }
    }

    /// Acquire the per-token entry/exit lock used by `execution::execute_entry`
    /// and `execution::execute_exit`; `None` means another tick (or the
    /// kill-switch unwind) already holds it for this token this cycle.
    pub fn try_acquire_entry_lock(state: &Arc<SharedState>, token_id: &str) -> Option<EntryLockGuard> {
        let mut locks = state.entry_locks.lock().unwrap();
        if !locks.insert(token_id.to_string()) {
            return None;
        }
        Some(EntryLockGuard {
            state: state.clone(),
            token_id: token_id.to_string(),
        })
    }

    pub async fn record_api_error(&self) {
        let mut log = self.api_error_log.write().await;
        log.push(Utc::now());
        let cutoff = Utc::now() - Duration::seconds(API_ERROR_WINDOW_SECONDS);
        log.retain(|t| *t > cutoff);
    }

    pub async fn api_errors_in_window(&self) -> u32 {
        let cutoff = Utc::now() - Duration::seconds(API_ERROR_WINDOW_SECONDS);
        self.api_error_log.read().await.iter().filter(|t| **t > cutoff).count() as u32
    }

    pub async fn increment_orphaned(&self) {
        *self.orphaned_order_count.write().await += 1;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard releasing a token's entry lock when the holding call returns,
/// including on early exit via `?`.
pub struct EntryLockGuard {
    state: Arc<SharedState>,
    token_id: String,
}

impl Drop for EntryLockGuard {
    fn drop(&mut self) {
        self.state.entry_locks.lock().unwrap().remove(&self.token_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_lock_blocks_a_second_acquire_until_the_guard_drops() {
        let state = Arc::new(SharedState::new());
        let guard = SharedState::try_acquire_entry_lock(&state, "tok-1");
        assert!(guard.is_some());
        assert!(SharedState::try_acquire_entry_lock(&state, "tok-1").is_none());

        drop(guard);
        assert!(SharedState::try_acquire_entry_lock(&state, "tok-1").is_some());
    }

    #[test]
    fn entry_lock_is_independent_per_token() {
        let state = Arc::new(SharedState::new());
        let _a = SharedState::try_acquire_entry_lock(&state, "tok-a").unwrap();
        assert!(SharedState::try_acquire_entry_lock(&state, "tok-b").is_some());
    }

    #[tokio::test]
    async fn api_error_window_drops_entries_older_than_the_window() {
        let state = SharedState::new();
        state.record_api_error().await;
        assert_eq!(state.api_errors_in_window().await, 1);

        {
            let mut log = state.api_error_log.write().await;
            for t in log.iter_mut() {
                *t = Utc::now() - Duration::seconds(API_ERROR_WINDOW_SECONDS + 1);
            }
        }
        assert_eq!(state.api_errors_in_window().await, 0);
    }

    #[tokio::test]
    async fn increment_orphaned_accumulates() {
        let state = SharedState::new();
        state.increment_orphaned().await;
        state.increment_orphaned().await;
        assert_eq!(*state.orphaned_order_count.read().await, 2);
    }
}
