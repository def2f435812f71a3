//! Attestation type → source factory registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;
use vci_model::{AttestationDefinition, IssuanceError};

use crate::{AttestationSource, AttestationSourceFactory};

/// Maps attestation type names to source factories.
///
/// Built once at startup, then shared read-only (typically behind an `Arc`)
/// by every pipeline that needs it.
#[derive(Default, Clone)]
pub struct AttestationSourceRegistry {
    factories: BTreeMap<String, Arc<dyn AttestationSourceFactory>>,
}

impl AttestationSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `attestation_type` with `factory`, replacing any previous one.
    pub fn register_factory(
        &mut self,
        attestation_type: impl Into<String>,
        factory: Arc<dyn AttestationSourceFactory>,
    ) {
        let attestation_type = attestation_type.into();
        if self.factories.insert(attestation_type.clone(), factory).is_some() {
            warn!(attestation_type = %attestation_type, "replaced attestation source factory");
        }
    }

    pub fn is_registered(&self, attestation_type: &str) -> bool {
        self.factories.contains_key(attestation_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a source for `definition` using the factory for its type.
    pub fn create_source(
        &self,
        definition: &AttestationDefinition,
    ) -> Result<Box<dyn AttestationSource>, IssuanceError> {
        let factory = self
            .factories
            .get(&definition.attestation_type)
            .ok_or_else(|| IssuanceError::unregistered_type(&definition.attestation_type))?;
        factory.create_source(definition)
    }
}

impl std::fmt::Debug for AttestationSourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSourceRegistry")
            .field("types", &self.types())
            .finish()
    }
}
