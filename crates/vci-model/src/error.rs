//! Failure taxonomy for issuance operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure kinds reported by engine operations.
///
/// These codes are stable and drive the manager's retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Bad attestation, rule or mapping configuration, or otherwise invalid
    /// input. Never retried.
    Validation,
    /// Network, source or storage failure. Retried up to the policy limit.
    Transient,
    /// Lease conflict. The caller retries the claim cycle, not the business
    /// logic.
    Concurrency,
    /// Unknown attestation, credential definition or process id. Never retried.
    NotFound,
}

impl FailureKind {
    /// Whether a failure of this kind may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Concurrency => write!(f, "CONCURRENCY"),
            Self::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// Error value returned by every fallible engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceError {
    /// Failure kind.
    pub kind: FailureKind,
    /// Human-readable, single-line message.
    pub message: String,
    /// Optional machine-readable details (offending id, path, owner).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IssuanceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(kind: FailureKind, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Concurrency, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    /// Attestation id has no stored definition.
    pub fn unknown_attestation(id: &str) -> Self {
        Self::with_data(
            FailureKind::NotFound,
            format!("attestation definition '{}' not found", id),
            serde_json::json!({ "attestation_id": id }),
        )
    }

    /// Attestation type has no registered source factory.
    pub fn unregistered_type(attestation_type: &str) -> Self {
        Self::with_data(
            FailureKind::Validation,
            format!("no attestation source factory registered for type '{}'", attestation_type),
            serde_json::json!({ "attestation_type": attestation_type }),
        )
    }

    /// Credential definition id has no stored definition.
    pub fn unknown_credential_definition(id: &str) -> Self {
        Self::with_data(
            FailureKind::NotFound,
            format!("credential definition '{}' not found", id),
            serde_json::json!({ "credential_definition_id": id }),
        )
    }

    /// Issuance process id is unknown to the store.
    pub fn process_not_found(id: &str) -> Self {
        Self::with_data(
            FailureKind::NotFound,
            format!("issuance process '{}' not found", id),
            serde_json::json!({ "process_id": id }),
        )
    }

    /// A process with this id already exists.
    pub fn already_exists(id: &str) -> Self {
        Self::with_data(
            FailureKind::Validation,
            format!("issuance process '{}' already exists", id),
            serde_json::json!({ "process_id": id }),
        )
    }

    /// Process is leased by another owner.
    pub fn lease_conflict(id: &str, holder: &str) -> Self {
        Self::with_data(
            FailureKind::Concurrency,
            format!("issuance process '{}' is leased by '{}'", id, holder),
            serde_json::json!({ "process_id": id, "lease_owner": holder }),
        )
    }

    /// Caller's lease has expired, been released, or was never held.
    pub fn lease_lost(id: &str, owner: &str) -> Self {
        Self::with_data(
            FailureKind::Concurrency,
            format!("lease on issuance process '{}' is no longer held by '{}'", id, owner),
            serde_json::json!({ "process_id": id, "owner": owner }),
        )
    }

    /// A required claim path could not be resolved.
    pub fn missing_claim(path: &str, segment: &str) -> Self {
        Self::with_data(
            FailureKind::Validation,
            format!("required claim '{}' not found (missing segment '{}')", path, segment),
            serde_json::json!({ "path": path, "segment": segment }),
        )
    }

    /// Backend storage failure (I/O, SQL, poisoned lock).
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, format!("storage error: {}", message.into()))
    }

    /// Whether this failure may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_concurrency(&self) -> bool {
        self.kind == FailureKind::Concurrency
    }
}

impl fmt::Display for IssuanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for IssuanceError {}

impl From<serde_json::Error> for IssuanceError {
    fn from(e: serde_json::Error) -> Self {
        Self::validation(format!("invalid JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(IssuanceError::transient("timeout").is_retryable());
        assert!(!IssuanceError::validation("bad").is_retryable());
        assert!(!IssuanceError::unknown_attestation("a1").is_retryable());
        assert!(!IssuanceError::lease_conflict("p1", "w2").is_retryable());
    }

    #[test]
    fn test_unknown_attestation_and_unregistered_type_are_distinct() {
        let unknown = IssuanceError::unknown_attestation("a1");
        let unregistered = IssuanceError::unregistered_type("membership");
        assert_eq!(unknown.kind, FailureKind::NotFound);
        assert_eq!(unregistered.kind, FailureKind::Validation);
        assert_eq!(unregistered.data.unwrap()["attestation_type"], "membership");
    }

    #[test]
    fn test_display_includes_code() {
        let err = IssuanceError::lease_lost("p1", "worker-a");
        assert_eq!(
            err.to_string(),
            "CONCURRENCY: lease on issuance process 'p1' is no longer held by 'worker-a'"
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&FailureKind::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
    }
}
