//! The issuance process record
//!
//! One process tracks a single holder's request for one or more credentials
//! from intake to ISSUED or TERMINATED. State only changes through the
//! `transition_to_*` methods, which enforce the table in
//! [`IssuanceProcessState::can_transition_to`].

mod lease;

pub use lease::Lease;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use vci_model::{validate_identifier, Claims, CredentialFormat, IssuanceError};

use crate::state::{IssuanceProcessState, ProcessStateError, TerminalState};

/// Generate a new process id using ULID (sortable, identifier-safe)
pub fn generate_process_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuanceProcess {
    pub(crate) id: String,
    pub(crate) participant_context_id: String,
    pub(crate) holder_id: String,
    pub(crate) holder_pid: String,
    pub(crate) claims: Claims,
    pub(crate) credential_definitions: Vec<String>,
    pub(crate) credential_formats: BTreeMap<String, CredentialFormat>,
    pub(crate) state: IssuanceProcessState,
    pub(crate) retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_detail: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) state_timestamp: DateTime<Utc>,
    /// Earliest time an ERROR process may be leased for a retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) lease: Option<Lease>,
}

impl IssuanceProcess {
    /// Create a new process in CREATED state
    pub fn new(
        id: impl Into<String>,
        participant_context_id: impl Into<String>,
        holder_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            participant_context_id: participant_context_id.into(),
            holder_id: holder_id.into(),
            holder_pid: String::new(),
            claims: Claims::new(),
            credential_definitions: Vec::new(),
            credential_formats: BTreeMap::new(),
            state: IssuanceProcessState::Created,
            retry_count: 0,
            error_detail: None,
            created_at: now,
            updated_at: now,
            state_timestamp: now,
            next_attempt_at: None,
            lease: None,
        }
    }

    pub fn with_holder_pid(mut self, holder_pid: impl Into<String>) -> Self {
        self.holder_pid = holder_pid.into();
        self
    }

    /// Intake claims, handed to attestation sources.
    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_credential_definition(
        mut self,
        definition_id: impl Into<String>,
        format: CredentialFormat,
    ) -> Self {
        let definition_id = definition_id.into();
        self.credential_formats.insert(definition_id.clone(), format);
        if !self.credential_definitions.contains(&definition_id) {
            self.credential_definitions.push(definition_id);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participant_context_id(&self) -> &str {
        &self.participant_context_id
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn holder_pid(&self) -> &str {
        &self.holder_pid
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn credential_definitions(&self) -> &[String] {
        &self.credential_definitions
    }

    pub fn credential_formats(&self) -> &BTreeMap<String, CredentialFormat> {
        &self.credential_formats
    }

    pub fn state(&self) -> IssuanceProcessState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// When the process entered its current state.
    pub fn state_timestamp(&self) -> DateTime<Utc> {
        self.state_timestamp
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    /// Whether stores may hand this process out at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// The lease this copy was handed by the store, if any.
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    pub(crate) fn set_lease(&mut self, lease: Option<Lease>) {
        self.lease = lease;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Replace the claims. Fails once the process is terminal.
    pub fn set_claims(&mut self, claims: Claims) -> Result<(), ProcessStateError> {
        if self.state.is_terminal() {
            return Err(ProcessStateError::ClaimsLocked(self.state));
        }
        self.claims = claims;
        Ok(())
    }

    fn transition(
        &mut self,
        target: IssuanceProcessState,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessStateError> {
        if !self.state.can_transition_to(target) {
            return Err(ProcessStateError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }

        self.state = target;
        self.updated_at = now;
        self.state_timestamp = now;
        self.next_attempt_at = None;
        Ok(())
    }

    /// Hold an ERROR process back from leasing until `at`.
    pub fn schedule_retry(&mut self, at: DateTime<Utc>) -> Result<(), ProcessStateError> {
        if self.state != IssuanceProcessState::Error {
            return Err(ProcessStateError::InvalidTransition {
                from: self.state,
                to: IssuanceProcessState::Pending,
            });
        }
        self.next_attempt_at = Some(at);
        Ok(())
    }

    /// CREATED → PENDING, or ERROR → PENDING for a retry
    pub fn transition_to_pending(&mut self, now: DateTime<Utc>) -> Result<(), ProcessStateError> {
        self.transition(IssuanceProcessState::Pending, now)
    }

    /// PENDING → APPROVED, fixing the final credential claims
    pub fn transition_to_approved(
        &mut self,
        final_claims: Claims,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessStateError> {
        self.transition(IssuanceProcessState::Approved, now)?;
        self.claims = final_claims;
        self.error_detail = None;
        Ok(())
    }

    /// PENDING/APPROVED → ERROR. Counts the failed attempt.
    pub fn transition_to_error(
        &mut self,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessStateError> {
        self.transition(IssuanceProcessState::Error, now)?;
        self.retry_count = self.retry_count.saturating_add(1);
        self.error_detail = Some(detail.into());
        Ok(())
    }

    /// ERROR → TERMINATED. Keeps the last error detail unless one is given.
    pub fn transition_to_terminated(
        &mut self,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessStateError> {
        self.transition(IssuanceProcessState::Terminated, now)?;
        if detail.is_some() {
            self.error_detail = detail;
        }
        Ok(())
    }

    /// APPROVED → ISSUED
    pub fn transition_to_issued(&mut self, now: DateTime<Utc>) -> Result<(), ProcessStateError> {
        self.transition(IssuanceProcessState::Issued, now)
    }
}

/// Intake payload for a new process, as accepted by `vci submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuanceRequest {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub participant_context_id: String,
    pub holder_id: String,
    #[serde(default)]
    pub holder_pid: String,
    #[serde(default)]
    pub claims: Claims,
    pub credential_definitions: Vec<String>,
    #[serde(default)]
    pub credential_formats: BTreeMap<String, CredentialFormat>,
}

impl IssuanceRequest {
    pub fn into_process(self, now: DateTime<Utc>) -> Result<IssuanceProcess, IssuanceError> {
        let id = self.id.unwrap_or_else(generate_process_id);
        validate_identifier(&id)
            .map_err(|e| IssuanceError::validation(format!("process id '{}': {}", id, e)))?;

        if self.credential_definitions.is_empty() {
            return Err(IssuanceError::validation(format!(
                "process '{}' requests no credential definitions",
                id
            )));
        }

        let mut process = IssuanceProcess::new(id, self.participant_context_id, self.holder_id, now)
            .with_holder_pid(self.holder_pid)
            .with_claims(self.claims);
        for definition_id in self.credential_definitions {
            if !process.credential_definitions.contains(&definition_id) {
                process.credential_definitions.push(definition_id);
            }
        }
        process.credential_formats = self.credential_formats;
        Ok(process)
    }
}
