//! Credential writer seam

use tracing::info;
use vci_model::{CredentialDefinition, IssuanceError};

use crate::process::IssuanceProcess;

/// Generates, signs and delivers the credentials of an approved process.
///
/// `definitions` are the process's credential definitions in request order.
/// A returned error sends the process to ERROR; transient errors are retried.
pub trait CredentialWriter: Send + Sync {
    fn write(
        &self,
        process: &IssuanceProcess,
        definitions: &[CredentialDefinition],
    ) -> Result<(), IssuanceError>;
}

/// Writer that records the credentials it would issue in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCredentialWriter;

impl CredentialWriter for LoggingCredentialWriter {
    fn write(
        &self,
        process: &IssuanceProcess,
        definitions: &[CredentialDefinition],
    ) -> Result<(), IssuanceError> {
        for definition in definitions {
            let format = process
                .credential_formats()
                .get(&definition.id)
                .copied()
                .unwrap_or(definition.format);
            let claims = serde_json::to_string(process.claims())?;
            info!(
                process_id = %process.id(),
                holder_id = %process.holder_id(),
                credential_type = %definition.credential_type,
                format = %format,
                claims = %claims,
                "credential issued"
            );
        }
        Ok(())
    }
}
