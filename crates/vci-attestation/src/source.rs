//! Source and factory traits.

use std::fmt;

use vci_model::{AttestationDefinition, Claims, IssuanceError};

use crate::AttestationContext;

/// Executable evidence check.
///
/// Sources are observers: executing one must not change state the pipeline
/// would need to roll back if a later source fails.
pub trait AttestationSource: Send {
    fn execute(&self, context: &AttestationContext) -> Result<Claims, IssuanceError>;
}

/// Builds a source for one attestation definition of a given type.
///
/// Rejecting the definition's configuration is a validation failure.
pub trait AttestationSourceFactory: Send + Sync {
    fn create_source(
        &self,
        definition: &AttestationDefinition,
    ) -> Result<Box<dyn AttestationSource>, IssuanceError>;
}

impl<F> AttestationSourceFactory for F
where
    F: Fn(&AttestationDefinition) -> Result<Box<dyn AttestationSource>, IssuanceError> + Send + Sync,
{
    fn create_source(
        &self,
        definition: &AttestationDefinition,
    ) -> Result<Box<dyn AttestationSource>, IssuanceError> {
        self(definition)
    }
}

/// Source backed by a closure.
pub struct FnSource<F>(pub F);

impl<F> AttestationSource for FnSource<F>
where
    F: Fn(&AttestationContext) -> Result<Claims, IssuanceError> + Send,
{
    fn execute(&self, context: &AttestationContext) -> Result<Claims, IssuanceError> {
        (self.0)(context)
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSource")
    }
}
