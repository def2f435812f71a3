//! VCI model types
//!
//! Definitions shared by the issuance engine and its attestation layer:
//! attestation, credential, mapping and rule definitions, credential format
//! labels, and the failure taxonomy every engine operation reports with.

pub mod definition;
pub mod error;
pub mod ids;

pub use definition::{
    AttestationDefinition, CredentialDefinition, CredentialFormat, CredentialRuleDefinition,
    MappingDefinition,
};
pub use error::{FailureKind, IssuanceError};
pub use ids::{validate_identifier, IdError};

/// Nested claims data: a JSON object keyed by claim name.
pub type Claims = serde_json::Map<String, serde_json::Value>;
