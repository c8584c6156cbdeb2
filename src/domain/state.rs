use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator lifecycle state machine.
///
/// `Paused` is entered automatically when the per-sport or global daily-loss
/// limit is hit, and persists until day rollover or a manual resume; it is
/// not the same as `Stopping`, which is a one-way trip to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Error,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Stopped => "STOPPED",
            OrchestratorState::Starting => "STARTING",
            OrchestratorState::Running => "RUNNING",
            OrchestratorState::Paused => "PAUSED",
            OrchestratorState::Stopping => "STOPPING",
            OrchestratorState::Error => "ERROR",
        }
    }

    pub fn can_transition_to(&self, target: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, target),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Paused)
                | (Running, Stopping)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Stopping)
                | (Paused, Error)
                | (Stopping, Stopped)
                | (Error, Stopping)
                | (Error, Stopped)
        )
    }

    pub fn valid_transitions(&self) -> Vec<OrchestratorState> {
        use OrchestratorState::*;
        match self {
            Stopped => vec![Starting],
            Starting => vec![Running, Error],
            Running => vec![Paused, Stopping, Error],
            Paused => vec![Running, Stopping, Error],
            Stopping => vec![Stopped],
            Error => vec![Stopping, Stopped],
        }
    }

    /// Whether the trading loop should actively evaluate entries/exits.
    pub fn is_tradeable(&self) -> bool {
        matches!(self, OrchestratorState::Running)
    }

    pub fn is_terminal_for_shutdown(&self) -> bool {
        matches!(self, OrchestratorState::Stopped)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrchestratorState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "STOPPED" => Ok(OrchestratorState::Stopped),
            "STARTING" => Ok(OrchestratorState::Starting),
            "RUNNING" => Ok(OrchestratorState::Running),
            "PAUSED" => Ok(OrchestratorState::Paused),
            "STOPPING" => Ok(OrchestratorState::Stopping),
            "ERROR" => Ok(OrchestratorState::Error),
            _ => Err(format!("unknown orchestrator state: {s}")),
        }
    }
}

/// State transition event, kept for the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: OrchestratorState, to: OrchestratorState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Kill-switch state, separate from the orchestrator lifecycle: the bot can
/// be `Running` with the kill switch active, in which case every entry is
/// rejected but exits, health, and cleanup loops keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    Normal,
    Elevated,
    Halted,
}

impl RiskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskState::Normal => "NORMAL",
            RiskState::Elevated => "ELEVATED",
            RiskState::Halted => "HALTED",
        }
    }

    pub fn can_trade(&self) -> bool {
        !matches!(self, RiskState::Halted)
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use OrchestratorState::*;
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));

        assert!(!Stopped.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Starting));
    }

    #[test]
    fn state_round_trips_through_display_and_try_from() {
        for state in [
            OrchestratorState::Stopped,
            OrchestratorState::Starting,
            OrchestratorState::Running,
            OrchestratorState::Paused,
            OrchestratorState::Stopping,
            OrchestratorState::Error,
        ] {
            let s = state.to_string();
            assert_eq!(OrchestratorState::try_from(s.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn only_running_is_tradeable() {
        assert!(OrchestratorState::Running.is_tradeable());
        assert!(!OrchestratorState::Paused.is_tradeable());
        assert!(!OrchestratorState::Starting.is_tradeable());
    }
}
