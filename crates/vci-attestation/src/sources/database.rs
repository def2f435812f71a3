//! Source resolving claims from one row of a SQLite table.
//!
//! Configuration:
//!
//! ```json
//! {
//!   "path": "/var/lib/issuer/members.db",
//!   "table": "members",
//!   "id_column": "holder_id",
//!   "key": "holder",
//!   "required": true
//! }
//! ```
//!
//! Runs `SELECT * FROM <table> WHERE <id_column> = ?` with the holder id
//! (`key = "holder"`, the default) or the participant context id
//! (`key = "participant"`). Each column of the first matching row becomes a
//! claim. No row yields empty claims, or a transient failure when `required`.

use std::path::PathBuf;

use regex_lite::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::debug;
use vci_model::{AttestationDefinition, Claims, IssuanceError};

use crate::{AttestationContext, AttestationSource, AttestationSourceFactory};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,63}$";

/// Which context value selects the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    Holder,
    Participant,
}

#[derive(Debug, Clone)]
pub struct DatabaseSource {
    path: PathBuf,
    table: String,
    id_column: String,
    key: LookupKey,
    required: bool,
}

impl DatabaseSource {
    fn query(&self, key: &str) -> Result<Option<Claims>, rusqlite::Error> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = ?1 LIMIT 1",
            self.table, self.id_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([key])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut claims = Claims::new();
        for (i, name) in columns.iter().enumerate() {
            claims.insert(name.clone(), column_to_json(row.get_ref(i)?));
        }
        Ok(Some(claims))
    }
}

fn column_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

impl AttestationSource for DatabaseSource {
    fn execute(&self, context: &AttestationContext) -> Result<Claims, IssuanceError> {
        let key = match self.key {
            LookupKey::Holder => &context.holder_id,
            LookupKey::Participant => &context.participant_context_id,
        };

        let row = self
            .query(key)
            .map_err(|e| IssuanceError::storage(format!("attestation table '{}': {}", self.table, e)))?;

        match row {
            Some(claims) => {
                debug!(table = %self.table, columns = claims.len(), "attestation row found");
                Ok(claims)
            }
            None if self.required => Err(IssuanceError::transient(format!(
                "no row in '{}' where {} = '{}'",
                self.table, self.id_column, key
            ))),
            None => Ok(Claims::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseSourceFactory;

impl DatabaseSourceFactory {
    fn identifier(definition: &AttestationDefinition, field: &str) -> Result<String, IssuanceError> {
        let pattern = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| IssuanceError::validation(format!("identifier pattern: {}", e)))?;
        let value = definition
            .configuration
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                IssuanceError::validation(format!(
                    "attestation '{}': configuration.{} is required",
                    definition.id, field
                ))
            })?;
        if !pattern.is_match(value) {
            return Err(IssuanceError::validation(format!(
                "attestation '{}': configuration.{} '{}' is not a valid SQL identifier",
                definition.id, field, value
            )));
        }
        Ok(value.to_string())
    }
}

impl AttestationSourceFactory for DatabaseSourceFactory {
    fn create_source(
        &self,
        definition: &AttestationDefinition,
    ) -> Result<Box<dyn AttestationSource>, IssuanceError> {
        let config = &definition.configuration;

        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| {
                IssuanceError::validation(format!(
                    "attestation '{}': configuration.path is required",
                    definition.id
                ))
            })?;

        let key = match config.get("key").and_then(|v| v.as_str()) {
            None | Some("holder") => LookupKey::Holder,
            Some("participant") => LookupKey::Participant,
            Some(other) => {
                return Err(IssuanceError::validation(format!(
                    "attestation '{}': configuration.key must be 'holder' or 'participant', got '{}'",
                    definition.id, other
                )))
            }
        };

        Ok(Box::new(DatabaseSource {
            path,
            table: Self::identifier(definition, "table")?,
            id_column: Self::identifier(definition, "id_column")?,
            key,
            required: config.get("required").and_then(|v| v.as_bool()).unwrap_or(true),
        }))
    }
}
