//! Credential definition lookup and credential writing
//!
//! The manager resolves credential definitions through
//! [`CredentialDefinitionStore`] and hands approved processes to a
//! [`CredentialWriter`], which generates, signs and delivers the credential.

mod catalog;
mod writer;

pub use catalog::DefinitionCatalog;
pub use writer::{CredentialWriter, LoggingCredentialWriter};

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use vci_model::{validate_identifier, CredentialDefinition, IssuanceError};

pub trait CredentialDefinitionStore: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Option<CredentialDefinition>, IssuanceError>;
}

/// Thread-safe in-memory credential definition store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialDefinitionStore {
    inner: Arc<RwLock<BTreeMap<String, CredentialDefinition>>>,
}

impl InMemoryCredentialDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, definition: CredentialDefinition) -> Result<(), IssuanceError> {
        validate_identifier(&definition.id).map_err(|e| {
            IssuanceError::validation(format!("credential definition id '{}': {}", definition.id, e))
        })?;

        let mut definitions = self
            .inner
            .write()
            .map_err(|_| IssuanceError::storage("credential definition lock poisoned"))?;
        if definitions.contains_key(&definition.id) {
            return Err(IssuanceError::validation(format!(
                "credential definition '{}' already exists",
                definition.id
            )));
        }
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn list(&self) -> Vec<CredentialDefinition> {
        self.inner
            .read()
            .map(|definitions| definitions.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl CredentialDefinitionStore for InMemoryCredentialDefinitionStore {
    fn resolve(&self, id: &str) -> Result<Option<CredentialDefinition>, IssuanceError> {
        let definitions = self
            .inner
            .read()
            .map_err(|_| IssuanceError::storage("credential definition lock poisoned"))?;
        Ok(definitions.get(id).cloned())
    }
}
