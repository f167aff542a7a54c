//! Record envelope.
//!
//! Attaches the six system columns to every incoming write payload. The
//! record id is a 16-char hex digest over the canonical JSON form of the
//! user fields, so writing the same payload twice yields the same logical
//! row identity.

use chrono::{DateTime, SecondsFormat, Utc};
use floedb_commons::constants::{
    is_system_column, COL_DELETED, COL_DELETED_AT, COL_RECORD_ID, COL_TENANT_ID, COL_TIMESTAMP,
    COL_VERSION,
};
use floedb_commons::schema::TableSchema;
use floedb_commons::{EngineError, Result, TenantId};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Canonical JSON form: object keys sorted recursively, arrays in place,
/// numbers in serde_json's canonical rendering.
pub fn canonical_json(value: &Value) -> String {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());
                let mut out = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), normalize(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            other => other.clone(),
        }
    }
    normalize(value).to_string()
}

/// Stable logical-row identifier: first 16 hex chars of the SHA-256 digest
/// over the canonical user payload.
pub fn record_id(user_fields: &Map<String, Value>) -> String {
    let canonical = canonical_json(&Value::Object(user_fields.clone()));
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Wire rendering of a version timestamp (microsecond-precision UTC).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Validate a write payload row against the table schema: system columns
/// are reserved, unknown columns and missing required columns are schema
/// mismatches.
pub fn validate_record(schema: &TableSchema, record: &Map<String, Value>) -> Result<()> {
    for key in record.keys() {
        if is_system_column(key) {
            return Err(EngineError::invalid_request(format!(
                "'{}' is a system column and cannot be written directly",
                key
            )));
        }
        if schema.field(key).is_none() {
            return Err(EngineError::schema_mismatch(format!(
                "unknown column '{}'",
                key
            )));
        }
    }
    for field in schema.user_fields() {
        if field.required {
            match record.get(&field.name) {
                None | Some(Value::Null) => {
                    return Err(EngineError::schema_mismatch(format!(
                        "required column '{}' is missing",
                        field.name
                    )))
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Enrich fresh write payloads with system columns (`_version = 1`).
pub fn enrich_for_write(
    schema: &TableSchema,
    records: &[Map<String, Value>],
    tenant: &TenantId,
    now: DateTime<Utc>,
) -> Result<Vec<Map<String, Value>>> {
    let timestamp = format_timestamp(now);
    let mut enriched = Vec::with_capacity(records.len());
    for record in records {
        validate_record(schema, record)?;
        let mut row = record.clone();
        row.insert(COL_TENANT_ID.into(), Value::String(tenant.as_str().to_string()));
        row.insert(COL_RECORD_ID.into(), Value::String(record_id(record)));
        row.insert(COL_TIMESTAMP.into(), Value::String(timestamp.clone()));
        row.insert(COL_VERSION.into(), Value::Number(1.into()));
        row.insert(COL_DELETED.into(), Value::Bool(false));
        row.insert(COL_DELETED_AT.into(), Value::Null);
        enriched.push(row);
    }
    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use floedb_commons::schema::UserSchema;
    use serde_json::json;

    fn schema() -> TableSchema {
        let user: UserSchema = serde_json::from_str(
            r#"{"fields": {
                "id": {"type": "long", "required": true},
                "name": {"type": "string"},
                "price": {"type": "double"}
            }}"#,
        )
        .unwrap();
        crate::schema_mapper::map_user_schema(&user).unwrap()
    }

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [3, {"y": 2, "x": 1}]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"m":[3,{"x":1,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_record_id_is_deterministic() {
        let a = row(json!({"id": 1, "name": "A", "price": 10.0}));
        let b = row(json!({"price": 10.0, "name": "A", "id": 1}));
        assert_eq!(record_id(&a), record_id(&b));
        assert_eq!(record_id(&a).len(), 16);
        assert!(record_id(&a).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_record_id_differs_for_different_payloads() {
        let a = row(json!({"id": 1, "name": "A"}));
        let b = row(json!({"id": 2, "name": "A"}));
        assert_ne!(record_id(&a), record_id(&b));
    }

    #[test]
    fn test_enrich_sets_system_columns() {
        let schema = schema();
        let now = Utc::now();
        let records = vec![row(json!({"id": 1, "name": "A", "price": 10.0}))];
        let enriched = enrich_for_write(&schema, &records, &TenantId::new("acme"), now).unwrap();

        let record = &enriched[0];
        assert_eq!(record["_tenant_id"], json!("acme"));
        assert_eq!(record["_version"], json!(1));
        assert_eq!(record["_deleted"], json!(false));
        assert_eq!(record["_deleted_at"], Value::Null);
        assert_eq!(record["_timestamp"], json!(format_timestamp(now)));
        assert_eq!(record["_record_id"].as_str().unwrap().len(), 16);
        // User fields untouched
        assert_eq!(record["id"], json!(1));
    }

    #[test]
    fn test_write_payload_may_not_carry_system_columns() {
        let schema = schema();
        let records = vec![row(json!({"id": 1, "_version": 7}))];
        let err =
            enrich_for_write(&schema, &records, &TenantId::new("acme"), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "InvalidRequest");
    }

    #[test]
    fn test_unknown_column_is_schema_mismatch() {
        let schema = schema();
        let records = vec![row(json!({"id": 1, "colour": "red"}))];
        let err =
            enrich_for_write(&schema, &records, &TenantId::new("acme"), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "SchemaMismatch");
    }

    #[test]
    fn test_missing_required_column_is_schema_mismatch() {
        let schema = schema();
        let records = vec![row(json!({"name": "A"}))];
        let err =
            enrich_for_write(&schema, &records, &TenantId::new("acme"), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "SchemaMismatch");
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_timestamp_format_is_rfc3339_micros() {
        let ts = DateTime::parse_from_rfc3339("2026-02-01T08:30:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(ts), "2026-02-01T08:30:00.123456Z");
    }
}
