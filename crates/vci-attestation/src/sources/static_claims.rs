//! Source returning claims fixed in its definition.
//!
//! Configuration: `{ "claims": { ... } }`.

use vci_model::{AttestationDefinition, Claims, IssuanceError};

use crate::{AttestationContext, AttestationSource, AttestationSourceFactory};

#[derive(Debug, Clone)]
pub struct StaticSource {
    claims: Claims,
}

impl AttestationSource for StaticSource {
    fn execute(&self, _context: &AttestationContext) -> Result<Claims, IssuanceError> {
        Ok(self.claims.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSourceFactory;

impl AttestationSourceFactory for StaticSourceFactory {
    fn create_source(
        &self,
        definition: &AttestationDefinition,
    ) -> Result<Box<dyn AttestationSource>, IssuanceError> {
        let claims = definition
            .configuration
            .get("claims")
            .and_then(|v| v.as_object())
            .cloned()
            .ok_or_else(|| {
                IssuanceError::validation(format!(
                    "attestation '{}': configuration.claims must be an object",
                    definition.id
                ))
            })?;
        Ok(Box::new(StaticSource { claims }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vci_model::FailureKind;

    #[test]
    fn test_returns_configured_claims() {
        let def = AttestationDefinition::new("a1", "static", "issuer").with_configuration(
            json!({"claims": {"tier": "gold"}}).as_object().cloned().unwrap(),
        );
        let source = StaticSourceFactory.create_source(&def).unwrap();
        let claims = source.execute(&AttestationContext::default()).unwrap();
        assert_eq!(claims["tier"], "gold");
    }

    #[test]
    fn test_missing_claims_rejected() {
        let def = AttestationDefinition::new("a1", "static", "issuer");
        let err = StaticSourceFactory.create_source(&def).err().unwrap();
        assert_eq!(err.kind, FailureKind::Validation);
    }
}
