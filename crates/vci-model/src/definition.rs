//! Attestation, credential, mapping and rule definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Claims;

/// Identifies a pluggable evidence check.
///
/// `attestation_type` selects the source factory; `configuration` is handed
/// to that factory unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationDefinition {
    pub id: String,
    pub attestation_type: String,
    pub participant_context_id: String,
    #[serde(default)]
    pub configuration: Claims,
}

impl AttestationDefinition {
    pub fn new(
        id: impl Into<String>,
        attestation_type: impl Into<String>,
        participant_context_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            attestation_type: attestation_type.into(),
            participant_context_id: participant_context_id.into(),
            configuration: Claims::new(),
        }
    }

    pub fn with_configuration(mut self, configuration: Claims) -> Self {
        self.configuration = configuration;
        self
    }
}

/// Relocates one claim from `input` to `output` (dot-separated paths).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDefinition {
    pub input: String,
    pub output: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl MappingDefinition {
    pub fn new(input: impl Into<String>, output: impl Into<String>, required: bool) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            required,
        }
    }
}

/// Eligibility rule attached to a credential definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRuleDefinition {
    pub rule_type: String,
    #[serde(default)]
    pub configuration: Claims,
}

/// Credential format label passed through to the credential writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CredentialFormat {
    #[serde(rename = "VC1_0_JWT")]
    Vc1Jwt,
    #[serde(rename = "VC2_0_JOSE")]
    Vc2Jose,
    #[serde(rename = "VC2_0_SD_JWT")]
    Vc2SdJwt,
    #[serde(rename = "VC2_0_COSE")]
    Vc2Cose,
}

impl CredentialFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vc1Jwt => "VC1_0_JWT",
            Self::Vc2Jose => "VC2_0_JOSE",
            Self::Vc2SdJwt => "VC2_0_SD_JWT",
            Self::Vc2Cose => "VC2_0_COSE",
        }
    }
}

impl fmt::Display for CredentialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VC1_0_JWT" => Ok(Self::Vc1Jwt),
            "VC2_0_JOSE" => Ok(Self::Vc2Jose),
            "VC2_0_SD_JWT" => Ok(Self::Vc2SdJwt),
            "VC2_0_COSE" => Ok(Self::Vc2Cose),
            other => Err(format!("unknown credential format: {}", other)),
        }
    }
}

/// A credential type the issuer can issue, with the attestations, rules and
/// mappings that decide eligibility and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    pub id: String,
    pub credential_type: String,
    pub participant_context_id: String,
    /// Attestation ids, evaluated in this order.
    #[serde(default)]
    pub attestations: Vec<String>,
    #[serde(default)]
    pub rules: Vec<CredentialRuleDefinition>,
    #[serde(default)]
    pub mappings: Vec<MappingDefinition>,
    pub format: CredentialFormat,
    /// Validity of issued credentials, in seconds.
    #[serde(default)]
    pub validity_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema_url: Option<String>,
}

impl CredentialDefinition {
    pub fn new(
        id: impl Into<String>,
        credential_type: impl Into<String>,
        participant_context_id: impl Into<String>,
        format: CredentialFormat,
    ) -> Self {
        Self {
            id: id.into(),
            credential_type: credential_type.into(),
            participant_context_id: participant_context_id.into(),
            attestations: Vec::new(),
            rules: Vec::new(),
            mappings: Vec::new(),
            format,
            validity_seconds: 0,
            json_schema_url: None,
        }
    }

    pub fn with_attestation(mut self, attestation_id: impl Into<String>) -> Self {
        self.attestations.push(attestation_id.into());
        self
    }

    pub fn with_mapping(mut self, mapping: MappingDefinition) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn with_rule(mut self, rule: CredentialRuleDefinition) -> Self {
        self.rules.push(rule);
        self
    }
}
