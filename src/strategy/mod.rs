//! Trading strategy: everything between "we have a live game and a price"
//! and "here is a signal" (§4.3-4.9). Nothing in this module places an
//! order — that is the orchestrator's job, once the Risk Gate has spoken.

pub mod confidence;
pub mod decision;
pub mod discovery;
pub mod kelly;
pub mod kill_switch;
pub mod matcher;
pub mod risk_gate;
pub mod tracker;

pub use confidence::{ConfidenceBreakdown, ConfidenceInputs, ConfidenceScore};
pub use decision::{DecisionContext, EntrySignal, ExitReasonKind, ExitSignal};
pub use discovery::discover_markets;
pub use kelly::{KellyInputs, KellySizing};
pub use kill_switch::{KillSwitchInputs, KillSwitchTrigger};
pub use matcher::match_market;
pub use risk_gate::{GlobalRiskLimits, RiskDecision};
pub use tracker::{new_tracked_game, GameTracker};
