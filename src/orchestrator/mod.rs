//! The trading orchestrator (§4.10): one `Orchestrator` per user, running the
//! discovery/scoreboard/price/trading/health/cleanup loops and the
//! kill-switch monitor against a shared, lock-partitioned `SharedState`.

mod core;
mod execution;
mod loops;
mod recovery;
mod state;

pub use core::Orchestrator;
pub use execution::map_exit_reason;
pub use state::{KillSwitchState, SharedState};
