//! Identifier validation.

use thiserror::Error;

/// Maximum identifier length.
pub const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier must be 1-{max} characters, got {0}", max = MAX_IDENTIFIER_LEN)]
    Length(usize),

    #[error("identifier must start with alphanumeric character")]
    Start,

    #[error("identifier contains invalid character: {0:?}")]
    Character(char),

    #[error("identifier contains forbidden pattern '..'")]
    ForbiddenPattern,
}

/// Validate a process or definition identifier.
///
/// Identifiers match `^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$` and never contain
/// `..`. ULIDs, UUIDs and `did:` style ids satisfy this.
pub fn validate_identifier(id: &str) -> Result<(), IdError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        return Err(IdError::Length(id.len()));
    }

    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return Err(IdError::Start),
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.' | ':') {
            return Err(IdError::Character(c));
        }
    }

    if id.contains("..") {
        return Err(IdError::ForbiddenPattern);
    }

    Ok(())
}
