//! Attestation definition lookup.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use vci_model::{validate_identifier, AttestationDefinition, IssuanceError};

/// Resolves attestation definitions by id.
pub trait AttestationDefinitionStore: Send + Sync {
    /// `Ok(None)` when no definition has this id.
    fn resolve_definition(&self, id: &str) -> Result<Option<AttestationDefinition>, IssuanceError>;
}

/// Thread-safe in-memory definition store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttestationDefinitionStore {
    inner: Arc<RwLock<BTreeMap<String, AttestationDefinition>>>,
}

impl InMemoryAttestationDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new definition. Fails if the id is invalid or already taken.
    pub fn create(&self, definition: AttestationDefinition) -> Result<(), IssuanceError> {
        validate_identifier(&definition.id)
            .map_err(|e| IssuanceError::validation(format!("attestation id: {}", e)))?;
        let mut inner = self
            .inner
            .write()
            .map_err(|e| IssuanceError::storage(format!("lock poisoned: {}", e)))?;
        if inner.contains_key(&definition.id) {
            return Err(IssuanceError::validation(format!(
                "attestation definition '{}' already exists",
                definition.id
            )));
        }
        inner.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Remove a definition, returning it if present.
    pub fn delete(&self, id: &str) -> Result<Option<AttestationDefinition>, IssuanceError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| IssuanceError::storage(format!("lock poisoned: {}", e)))?;
        Ok(inner.remove(id))
    }

    /// All definitions, ordered by id.
    pub fn list(&self) -> Result<Vec<AttestationDefinition>, IssuanceError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| IssuanceError::storage(format!("lock poisoned: {}", e)))?;
        Ok(inner.values().cloned().collect())
    }
}

impl AttestationDefinitionStore for InMemoryAttestationDefinitionStore {
    fn resolve_definition(&self, id: &str) -> Result<Option<AttestationDefinition>, IssuanceError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| IssuanceError::storage(format!("lock poisoned: {}", e)))?;
        Ok(inner.get(id).cloned())
    }
}
