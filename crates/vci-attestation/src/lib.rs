//! Attestation sources and the attestation pipeline.
//!
//! An attestation is pluggable evidence about a holder. Each
//! [`AttestationDefinition`](vci_model::AttestationDefinition) names a type;
//! the [`AttestationSourceRegistry`] maps that type to a factory which builds
//! an executable [`AttestationSource`]. The [`AttestationPipeline`] resolves a
//! list of attestation ids, executes their sources in order and merges the
//! claims they return, stopping at the first failure.

mod context;
mod pipeline;
mod registry;
mod source;
pub mod sources;
mod store;

pub use context::AttestationContext;
pub use pipeline::AttestationPipeline;
pub use registry::AttestationSourceRegistry;
pub use source::{AttestationSource, AttestationSourceFactory, FnSource};
pub use store::{AttestationDefinitionStore, InMemoryAttestationDefinitionStore};

/// Registry with the built-in `static` and `database` factories registered.
pub fn default_registry() -> AttestationSourceRegistry {
    let mut registry = AttestationSourceRegistry::new();
    registry.register_factory(
        sources::STATIC_TYPE,
        std::sync::Arc::new(sources::StaticSourceFactory),
    );
    registry.register_factory(
        sources::DATABASE_TYPE,
        std::sync::Arc::new(sources::DatabaseSourceFactory),
    );
    registry
}
