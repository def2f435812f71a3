//! Claims mapping
//!
//! A [`MappingDefinition`] copies the value found at a dot-separated input
//! path into a fresh claims object at the output path. The source claims are
//! never modified.

use serde_json::Value;
use vci_model::{Claims, IssuanceError, MappingDefinition};

use crate::config::merge_objects;

/// Walk `path` through nested objects.
///
/// On failure returns the first segment that could not be resolved, either
/// because the key is absent or because the value before it is not an object.
pub fn lookup<'c, 'p>(claims: &'c Claims, path: &'p str) -> Result<&'c Value, &'p str> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or(path);
    let mut current = claims.get(first).ok_or(first)?;

    for segment in segments {
        current = current
            .as_object()
            .and_then(|object| object.get(segment))
            .ok_or(segment)?;
    }
    Ok(current)
}

/// Build `{a: {b: {c: value}}}` for the path `a.b.c`.
fn nest(path: &str, value: Value) -> Claims {
    let mut segments: Vec<&str> = path.split('.').collect();
    let mut claims = Claims::new();
    let Some(last) = segments.pop() else {
        return claims;
    };
    claims.insert(last.to_string(), value);

    for segment in segments.into_iter().rev() {
        let mut parent = Claims::new();
        parent.insert(segment.to_string(), Value::Object(claims));
        claims = parent;
    }
    claims
}

/// Apply one mapping.
///
/// Returns a new object holding only the mapped value. A missing input is a
/// validation failure naming the path and the unresolved segment when the
/// mapping is required, and an empty object otherwise.
pub fn apply(mapping: &MappingDefinition, claims: &Claims) -> Result<Claims, IssuanceError> {
    match lookup(claims, &mapping.input) {
        Ok(value) => Ok(nest(&mapping.output, value.clone())),
        Err(segment) if mapping.required => Err(IssuanceError::missing_claim(&mapping.input, segment)),
        Err(_) => Ok(Claims::new()),
    }
}

/// Apply mappings as a sequential fold: each mapping reads the output of the
/// one before it. The first mapping reads `claims`.
///
/// Later mappings only see their predecessor's single output field. Use
/// [`apply_all`] to read every mapping from the original claims.
pub fn apply_chained(mappings: &[MappingDefinition], claims: &Claims) -> Result<Claims, IssuanceError> {
    let mut current = claims.clone();
    for mapping in mappings {
        current = apply(mapping, &current)?;
    }
    Ok(current)
}

/// Apply every mapping to the original `claims` and deep-merge the outputs,
/// later mappings winning on conflicting leaves. Fails on the first missing
/// required input.
pub fn apply_all(mappings: &[MappingDefinition], claims: &Claims) -> Result<Claims, IssuanceError> {
    let mut output = Claims::new();
    for mapping in mappings {
        merge_objects(&mut output, apply(mapping, claims)?);
    }
    Ok(output)
}
