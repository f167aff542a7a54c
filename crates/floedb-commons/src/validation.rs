//! Identifier validation shared by the envelope layer.

use crate::errors::{EngineError, Result};

const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate a tenant, namespace, table or column identifier.
///
/// Identifiers are non-empty, at most 255 bytes, start with a letter or
/// underscore and contain only letters, digits, underscores and hyphens.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EngineError::invalid_request(format!("{} must not be empty", kind)));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::invalid_request(format!(
            "{} '{}' exceeds {} characters",
            kind, value, MAX_IDENTIFIER_LEN
        )));
    }
    let mut chars = value.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(EngineError::invalid_request(format!(
            "{} '{}' must start with a letter or underscore",
            kind, value
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(EngineError::invalid_request(format!(
            "{} '{}' contains invalid character '{}'",
            kind, value, bad
        )));
    }
    Ok(())
}
