//! Definitions file loading
//!
//! ```json
//! {
//!   "attestations": [{"id": "...", "attestation_type": "static", ...}],
//!   "credential_definitions": [{"id": "...", "credential_type": "...", ...}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use vci_attestation::InMemoryAttestationDefinitionStore;
use vci_model::{AttestationDefinition, CredentialDefinition, IssuanceError};

use super::InMemoryCredentialDefinitionStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionCatalog {
    #[serde(default)]
    pub attestations: Vec<AttestationDefinition>,
    #[serde(default)]
    pub credential_definitions: Vec<CredentialDefinition>,
}

impl DefinitionCatalog {
    pub fn from_file(path: &Path) -> Result<Self, IssuanceError> {
        let json = fs::read_to_string(path).map_err(|e| {
            IssuanceError::validation(format!("cannot read definitions {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load into fresh in-memory stores. Duplicate or malformed ids fail.
    pub fn into_stores(
        self,
    ) -> Result<(InMemoryAttestationDefinitionStore, InMemoryCredentialDefinitionStore), IssuanceError> {
        let attestations = InMemoryAttestationDefinitionStore::new();
        for definition in self.attestations {
            attestations.create(definition)?;
        }

        let credentials = InMemoryCredentialDefinitionStore::new();
        for definition in self.credential_definitions {
            credentials.create(definition)?;
        }

        Ok((attestations, credentials))
    }
}
