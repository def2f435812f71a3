//! Evaluation context handed to attestation sources.

use vci_model::Claims;

/// What a source knows about the request it is attesting.
#[derive(Debug, Clone, Default)]
pub struct AttestationContext {
    /// Issuer-side participant context the process belongs to.
    pub participant_context_id: String,
    /// Holder the credential is issued to.
    pub holder_id: String,
    /// Holder-side process id.
    pub holder_pid: String,
    /// Claims supplied at intake.
    pub claims: Claims,
}

impl AttestationContext {
    pub fn new(participant_context_id: impl Into<String>, holder_id: impl Into<String>) -> Self {
        Self {
            participant_context_id: participant_context_id.into(),
            holder_id: holder_id.into(),
            ..Default::default()
        }
    }

    pub fn with_holder_pid(mut self, holder_pid: impl Into<String>) -> Self {
        self.holder_pid = holder_pid.into();
        self
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = claims;
        self
    }
}
