//! Execution engine lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle of an [`Executor`](super::Executor).
///
/// # State Machine
///
/// ```text
/// Idle ──run/launch──> Running ──active() == false──> Stopped
///                        │                              ▲
///                        ├──kill flag──────────────────>│
///                        └──execute() error────────────>┘
/// ```
///
/// A stopped engine can be run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// Never run
    #[default]
    Idle,
    /// Inside the start/execute/stop sequence
    Running,
    /// Finished, killed or failed
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Running => write!(f, "Running"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

impl EngineState {
    /// Check if the state allows starting a run.
    pub fn can_start(&self) -> bool {
        matches!(self, EngineState::Idle | EngineState::Stopped)
    }

    /// Check if the engine is inside its loop.
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(EngineState::Idle.can_start());
        assert!(EngineState::Stopped.can_start());
        assert!(!EngineState::Running.can_start());
        assert!(EngineState::Running.is_running());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EngineState::default().to_string(), "Idle");
        assert_eq!(EngineState::Stopped.to_string(), "Stopped");
    }
}
