//! Fail-fast attestation evaluation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use vci_model::{Claims, IssuanceError};

use crate::{AttestationContext, AttestationDefinitionStore, AttestationSourceRegistry};

/// Resolves attestation ids, executes their sources and merges the results.
#[derive(Clone)]
pub struct AttestationPipeline {
    definitions: Arc<dyn AttestationDefinitionStore>,
    registry: Arc<AttestationSourceRegistry>,
}

impl AttestationPipeline {
    pub fn new(
        definitions: Arc<dyn AttestationDefinitionStore>,
        registry: Arc<AttestationSourceRegistry>,
    ) -> Self {
        Self {
            definitions,
            registry,
        }
    }

    pub fn registry(&self) -> &AttestationSourceRegistry {
        &self.registry
    }

    /// Evaluate attestations in the given order and merge their claims.
    ///
    /// Duplicate ids are evaluated once, at their first position. On key
    /// collisions the later source wins. The first failure is returned as-is
    /// and no further source is created or executed. An unknown id fails with
    /// `NotFound`, an unregistered type with `Validation`; both are distinct
    /// from whatever a source itself reports.
    pub fn evaluate<I>(&self, attestation_ids: I, context: &AttestationContext) -> Result<Claims, IssuanceError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut aggregate = Claims::new();

        for id in attestation_ids {
            let id = id.as_ref();
            if !seen.insert(id.to_string()) {
                continue;
            }

            let definition = self
                .definitions
                .resolve_definition(id)?
                .ok_or_else(|| IssuanceError::unknown_attestation(id))?;

            let source = self.registry.create_source(&definition)?;

            let claims = source.execute(context).map_err(|e| {
                warn!(
                    attestation_id = %id,
                    attestation_type = %definition.attestation_type,
                    error = %e,
                    "attestation source failed"
                );
                e
            })?;

            debug!(
                attestation_id = %id,
                attestation_type = %definition.attestation_type,
                keys = claims.len(),
                "attestation source succeeded"
            );
            aggregate.extend(claims);
        }

        Ok(aggregate)
    }
}

impl std::fmt::Debug for AttestationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationPipeline")
            .field("registry", &self.registry)
            .finish()
    }
}
