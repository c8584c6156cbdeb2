//! Scoreboard Client: the source of live game state (period, clock, score)
//! that Game Tracker and the Decision Engine reason about. Speaks a
//! provider-neutral `ScoreboardClient` trait so the orchestrator never
//! depends on the concrete upstream API, mirroring how `ExchangeClient`
//! decouples trading from a specific exchange.

mod espn;
mod segments;
mod traits;

pub use espn::EspnScoreboardClient;
pub use segments::normalize_segment;
pub use traits::{GameSnapshot, ScoreboardClient};
