//! Issuance process states and the legal transitions between them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use vci_model::IssuanceError;

use super::TerminalState;

/// Issuance process state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuanceProcessState {
    /// Accepted by intake, not yet picked up
    Created,
    /// Attestations, rules and mappings are being evaluated
    Pending,
    /// Eligible; final claims are fixed, credential not yet written
    Approved,
    /// Last attempt failed; waiting for retry or termination
    Error,
    /// Credential generated and delivered
    Issued,
    /// Permanently failed
    Terminated,
}

impl TerminalState for IssuanceProcessState {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Issued | Self::Terminated)
    }
}

impl IssuanceProcessState {
    /// Every state, in lifecycle order
    pub const ALL: [IssuanceProcessState; 6] = [
        Self::Created,
        Self::Pending,
        Self::Approved,
        Self::Error,
        Self::Issued,
        Self::Terminated,
    ];

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: IssuanceProcessState) -> bool {
        use IssuanceProcessState::*;
        match (self, target) {
            (Created, Pending) => true,

            (Pending, Approved) => true,
            (Pending, Error) => true,

            (Approved, Issued) => true,
            (Approved, Error) => true, // writer failed

            (Error, Pending) => true, // retry
            (Error, Terminated) => true,

            // ISSUED and TERMINATED are final
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Error => "ERROR",
            Self::Issued => "ISSUED",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for IssuanceProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssuanceProcessState {
    type Err = ProcessStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProcessStateError::UnknownState(s.to_string()))
    }
}

/// Errors for issuance process state operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessStateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: IssuanceProcessState,
        to: IssuanceProcessState,
    },

    #[error("Claims are immutable in terminal state {0}")]
    ClaimsLocked(IssuanceProcessState),

    #[error("Unknown issuance process state: {0}")]
    UnknownState(String),
}

impl From<ProcessStateError> for IssuanceError {
    fn from(e: ProcessStateError) -> Self {
        IssuanceError::validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IssuanceProcessState::*;

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Created, Pending),
            (Pending, Approved),
            (Pending, Error),
            (Approved, Issued),
            (Approved, Error),
            (Error, Pending),
            (Error, Terminated),
        ];

        for from in IssuanceProcessState::ALL {
            for to in IssuanceProcessState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(Issued.is_terminal());
        assert!(Terminated.is_terminal());
        assert!(!Error.is_terminal());
        assert!(!Created.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for to in IssuanceProcessState::ALL {
            assert!(!Issued.can_transition_to(to));
            assert!(!Terminated.can_transition_to(to));
        }
    }

    #[test]
    fn test_serialization_matches_display() {
        for state in IssuanceProcessState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("pending".parse::<IssuanceProcessState>(), Ok(Pending));
        assert_eq!("TERMINATED".parse::<IssuanceProcessState>(), Ok(Terminated));
        assert!(matches!(
            "DONE".parse::<IssuanceProcessState>(),
            Err(ProcessStateError::UnknownState(_))
        ));
    }

    #[test]
    fn test_state_error_is_validation() {
        let err: IssuanceError = ProcessStateError::ClaimsLocked(Issued).into();
        assert_eq!(err.kind, vci_model::FailureKind::Validation);
    }
}
