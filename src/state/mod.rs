//! Issuance process state machine
//!
//! CREATED → PENDING → APPROVED → ISSUED, with ERROR as the retry hub:
//! PENDING/APPROVED → ERROR → {PENDING | TERMINATED}

mod process_state;

pub use process_state::{IssuanceProcessState, ProcessStateError};

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
