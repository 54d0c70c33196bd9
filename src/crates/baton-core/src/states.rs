//! Execution states and the allowed transition matrix
//!
//! One state set governs both task activations and the workflow as a
//! whole. States serialize lowercase (`"running"`, `"succeeded"`, ...),
//! matching the strings hosts report through the conductor API.
//!
//! The matrix is a fixed table. The empty pseudo-state (`None`) is what a
//! fresh flow entry has before its first update; it may only move into one
//! of the start states. Terminal states admit no further transition within
//! a single activation — re-running a finished task means opening a new
//! activation, never mutating the old one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConductorError;

/// Execution state of a task activation or of the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Requested,
    Scheduled,
    Running,
    Pausing,
    Paused,
    Resuming,
    Canceling,
    Canceled,
    Succeeded,
    Failed,
    Expired,
    Abandoned,
}

impl ExecutionState {
    /// Every state, in declaration order
    pub const ALL: [ExecutionState; 12] = [
        Self::Requested,
        Self::Scheduled,
        Self::Running,
        Self::Pausing,
        Self::Paused,
        Self::Resuming,
        Self::Canceling,
        Self::Canceled,
        Self::Succeeded,
        Self::Failed,
        Self::Expired,
        Self::Abandoned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
        }
    }

    /// Whether this state ends an activation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Expired | Self::Canceled | Self::Abandoned
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "pausing" => Ok(Self::Pausing),
            "paused" => Ok(Self::Paused),
            "resuming" => Ok(Self::Resuming),
            "canceling" => Ok(Self::Canceling),
            "canceled" => Ok(Self::Canceled),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(ConductorError::InvalidState(other.to_string())),
        }
    }
}

/// Whether `from → to` is in the allowed transition matrix
///
/// `from == None` is the empty pseudo-state of a fresh entry.
pub fn is_transition_valid(from: Option<ExecutionState>, to: ExecutionState) -> bool {
    use ExecutionState::*;

    match from {
        None => matches!(to, Requested | Scheduled | Running),
        Some(Requested) => matches!(
            to,
            Scheduled | Running | Canceling | Canceled | Failed | Expired | Abandoned
        ),
        Some(Scheduled) => {
            matches!(to, Running | Canceling | Canceled | Failed | Expired | Abandoned)
        }
        Some(Running) => matches!(to, Pausing | Canceling | Succeeded | Failed | Expired),
        Some(Pausing) => matches!(to, Paused | Canceling | Failed),
        Some(Paused) => matches!(to, Resuming | Canceling),
        Some(Resuming) => matches!(to, Running),
        Some(Canceling) => matches!(to, Canceled | Failed),
        Some(Succeeded) | Some(Failed) | Some(Expired) | Some(Canceled) | Some(Abandoned) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_value(ExecutionState::Succeeded).unwrap(),
            serde_json::json!("succeeded")
        );
        assert_eq!(
            serde_json::from_value::<ExecutionState>(serde_json::json!("pausing")).unwrap(),
            ExecutionState::Pausing
        );
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("running".parse::<ExecutionState>().is_ok());
        assert!(matches!(
            "foobar".parse::<ExecutionState>(),
            Err(ConductorError::InvalidState(s)) if s == "foobar"
        ));
    }

    #[test]
    fn test_empty_state_starts() {
        use ExecutionState::*;
        for to in ExecutionState::ALL {
            let allowed = matches!(to, Requested | Scheduled | Running);
            assert_eq!(is_transition_valid(None, to), allowed, "empty -> {to}");
        }
    }

    #[test]
    fn test_running_transitions() {
        use ExecutionState::*;
        assert!(is_transition_valid(Some(Running), Succeeded));
        assert!(is_transition_valid(Some(Running), Pausing));
        assert!(!is_transition_valid(Some(Running), Paused));
        assert!(!is_transition_valid(Some(Running), Requested));
    }

    #[test]
    fn test_pause_resume_loop() {
        use ExecutionState::*;
        assert!(is_transition_valid(Some(Pausing), Paused));
        assert!(is_transition_valid(Some(Paused), Resuming));
        assert!(is_transition_valid(Some(Resuming), Running));
        assert!(!is_transition_valid(Some(Paused), Running));
    }

    proptest! {
        #[test]
        fn terminal_states_admit_no_transition(
            from in prop::sample::select(ExecutionState::ALL.to_vec()),
            to in prop::sample::select(ExecutionState::ALL.to_vec()),
        ) {
            if from.is_terminal() {
                prop_assert!(!is_transition_valid(Some(from), to));
            }
        }

        #[test]
        fn as_str_round_trips(state in prop::sample::select(ExecutionState::ALL.to_vec())) {
            prop_assert_eq!(state.as_str().parse::<ExecutionState>().unwrap(), state);
        }
    }
}
