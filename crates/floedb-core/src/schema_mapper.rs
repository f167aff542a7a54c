//! Schema mapper.
//!
//! Translates the user-facing JSON schema into the typed physical schema
//! (stable field ids, system columns appended) and from there into the Arrow
//! schema used by the scan and write paths.
//!
//! Field ids are assigned in depth-first declaration order starting at 1 and
//! never change for the lifetime of the table; the six system columns take
//! the next ids after the user fields.

use arrow::datatypes::{DataType, Field, Fields, Schema as ArrowSchema, SchemaRef, TimeUnit};
use floedb_commons::constants::{
    is_system_column, COL_DELETED, COL_DELETED_AT, COL_RECORD_ID, COL_TENANT_ID, COL_TIMESTAMP,
    COL_VERSION,
};
use floedb_commons::schema::{
    FieldDefinition, FieldType, PrimitiveType, SchemaField, TableSchema, UserSchema,
};
use floedb_commons::validation::validate_identifier;
use floedb_commons::{EngineError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Field metadata key carrying the stable field id into Parquet.
const FIELD_ID_META_KEY: &str = "PARQUET:field_id";

/// Nesting depth beyond which a declaration is accepted but logged.
const NESTING_WARN_DEPTH: usize = 3;

/// Translate a user schema into the physical table schema.
pub fn map_user_schema(user: &UserSchema) -> Result<TableSchema> {
    let mut next_id: i32 = 1;
    let mut fields = Vec::with_capacity(user.fields.len() + 6);

    for (name, def) in user.fields.iter() {
        validate_identifier("field name", name)?;
        if is_system_column(name) {
            return Err(EngineError::invalid_schema(format!(
                "'{}' is a reserved system column",
                name
            )));
        }
        fields.push(map_field(name, def, &mut next_id, 1)?);
    }

    // System columns close out the id space.
    for (name, primitive, required) in [
        (COL_TENANT_ID, PrimitiveType::String, true),
        (COL_RECORD_ID, PrimitiveType::String, true),
        (COL_TIMESTAMP, PrimitiveType::Timestamp, true),
        (COL_VERSION, PrimitiveType::Integer, true),
        (COL_DELETED, PrimitiveType::Boolean, false),
        (COL_DELETED_AT, PrimitiveType::Timestamp, false),
    ] {
        fields.push(SchemaField {
            id: next_id,
            name: name.to_string(),
            required,
            field_type: FieldType::primitive(primitive),
        });
        next_id += 1;
    }

    Ok(TableSchema {
        fields,
        last_field_id: next_id - 1,
    })
}

fn map_field(
    name: &str,
    def: &FieldDefinition,
    next_id: &mut i32,
    depth: usize,
) -> Result<SchemaField> {
    if depth > NESTING_WARN_DEPTH {
        log::warn!("field '{}' declared at nesting depth {}", name, depth);
    }
    let id = *next_id;
    *next_id += 1;

    let field_type = match def.field_type.to_ascii_lowercase().as_str() {
        "array" => {
            let items = def.items.as_ref().ok_or_else(|| {
                EngineError::invalid_schema(format!("array field '{}' requires 'items'", name))
            })?;
            let element = map_field("element", items, next_id, depth + 1)?;
            FieldType::Array {
                element: Box::new(element),
            }
        }
        "map" => {
            let key_type = def.key_type.as_ref().ok_or_else(|| {
                EngineError::invalid_schema(format!("map field '{}' requires 'key_type'", name))
            })?;
            let value_type = def.value_type.as_ref().ok_or_else(|| {
                EngineError::invalid_schema(format!("map field '{}' requires 'value_type'", name))
            })?;
            let key = PrimitiveType::parse(key_type)?;
            let value = map_field("value", value_type, next_id, depth + 1)?;
            FieldType::Map {
                key,
                value: Box::new(value),
            }
        }
        "struct" => {
            let members = def.fields.as_ref().ok_or_else(|| {
                EngineError::invalid_schema(format!("struct field '{}' requires 'fields'", name))
            })?;
            if members.is_empty() {
                return Err(EngineError::invalid_schema(format!(
                    "struct field '{}' must declare at least one member",
                    name
                )));
            }
            let mut fields = Vec::with_capacity(members.len());
            for (member_name, member_def) in members.iter() {
                validate_identifier("field name", member_name)?;
                fields.push(map_field(member_name, member_def, next_id, depth + 1)?);
            }
            FieldType::Struct { fields }
        }
        primitive => FieldType::primitive(PrimitiveType::parse(primitive)?),
    };

    Ok(SchemaField {
        id,
        name: name.to_string(),
        required: def.required,
        field_type,
    })
}

/// Arrow schema for a physical table schema.
pub fn arrow_schema(schema: &TableSchema) -> SchemaRef {
    let fields: Vec<Field> = schema.fields.iter().map(arrow_field).collect();
    Arc::new(ArrowSchema::new(fields))
}

fn arrow_field(field: &SchemaField) -> Field {
    let data_type = arrow_type(&field.field_type);
    let mut metadata = HashMap::new();
    metadata.insert(FIELD_ID_META_KEY.to_string(), field.id.to_string());
    Field::new(&field.name, data_type, !field.required).with_metadata(metadata)
}

fn arrow_type(field_type: &FieldType) -> DataType {
    match field_type {
        FieldType::Primitive { primitive } => arrow_primitive(*primitive),
        FieldType::Array { element } => DataType::List(Arc::new(arrow_field(element))),
        FieldType::Map { key, value } => {
            let key_field = Field::new("key", arrow_primitive(*key), false);
            let value_field = arrow_field(value);
            let entries = Field::new(
                "entries",
                DataType::Struct(Fields::from(vec![
                    key_field,
                    value_field.with_name("value"),
                ])),
                false,
            );
            DataType::Map(Arc::new(entries), false)
        }
        FieldType::Struct { fields } => {
            DataType::Struct(Fields::from(fields.iter().map(arrow_field).collect::<Vec<_>>()))
        }
    }
}

fn arrow_primitive(primitive: PrimitiveType) -> DataType {
    match primitive {
        PrimitiveType::String => DataType::Utf8,
        PrimitiveType::Integer => DataType::Int32,
        PrimitiveType::Long => DataType::Int64,
        PrimitiveType::Float => DataType::Float32,
        PrimitiveType::Double => DataType::Float64,
        PrimitiveType::Boolean => DataType::Boolean,
        PrimitiveType::Date => DataType::Date32,
        PrimitiveType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        PrimitiveType::Decimal => DataType::Decimal128(38, 10),
        // JSON transports binary values as encoded strings; they are stored
        // as strings in the columnar layer as well.
        PrimitiveType::Binary => DataType::Utf8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floedb_commons::schema::SchemaFields;
    use serde_json::from_str;

    fn user_schema(json: &str) -> UserSchema {
        from_str(json).unwrap()
    }

    #[test]
    fn test_field_ids_depth_first() {
        let schema = user_schema(
            r#"{"fields": {
                "id": {"type": "long", "required": true},
                "tags": {"type": "array", "items": {"type": "string"}},
                "address": {"type": "struct", "fields": {
                    "city": {"type": "string"},
                    "state": {"type": "string"}
                }},
                "price": {"type": "double"}
            }}"#,
        );
        let mapped = map_user_schema(&schema).unwrap();

        // id=1, tags=2, tags.element=3, address=4, city=5, state=6, price=7
        assert_eq!(mapped.field("id").unwrap().id, 1);
        assert_eq!(mapped.field("tags").unwrap().id, 2);
        match &mapped.field("tags").unwrap().field_type {
            FieldType::Array { element } => assert_eq!(element.id, 3),
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(mapped.field("address").unwrap().id, 4);
        assert_eq!(mapped.resolve_path("address.city").unwrap().id, 5);
        assert_eq!(mapped.resolve_path("address.state").unwrap().id, 6);
        assert_eq!(mapped.field("price").unwrap().id, 7);

        // System columns take the next six ids
        assert_eq!(mapped.field("_tenant_id").unwrap().id, 8);
        assert_eq!(mapped.field("_deleted_at").unwrap().id, 13);
        assert_eq!(mapped.last_field_id, 13);
    }

    #[test]
    fn test_user_columns_precede_system_columns() {
        let schema = user_schema(r#"{"fields": {"b": {"type": "string"}, "a": {"type": "long"}}}"#);
        let mapped = map_user_schema(&schema).unwrap();
        let names: Vec<&str> = mapped.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "b",
                "a",
                "_tenant_id",
                "_record_id",
                "_timestamp",
                "_version",
                "_deleted",
                "_deleted_at"
            ]
        );
    }

    #[test]
    fn test_array_without_items_rejected() {
        let schema = user_schema(r#"{"fields": {"tags": {"type": "array"}}}"#);
        let err = map_user_schema(&schema).unwrap_err();
        assert_eq!(err.code(), "InvalidSchema");
    }

    #[test]
    fn test_map_requires_both_types() {
        let schema = user_schema(
            r#"{"fields": {"attrs": {"type": "map", "key_type": "string"}}}"#,
        );
        let err = map_user_schema(&schema).unwrap_err();
        assert_eq!(err.code(), "InvalidSchema");
        assert!(err.to_string().contains("value_type"));
    }

    #[test]
    fn test_struct_requires_fields() {
        let schema = user_schema(r#"{"fields": {"address": {"type": "struct"}}}"#);
        assert!(map_user_schema(&schema).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let schema = user_schema(r#"{"fields": {"x": {"type": "varchar"}}}"#);
        let err = map_user_schema(&schema).unwrap_err();
        assert_eq!(err.code(), "InvalidSchema");
    }

    #[test]
    fn test_reserved_column_name_rejected() {
        let schema = user_schema(r#"{"fields": {"_version": {"type": "long"}}}"#);
        let err = map_user_schema(&schema).unwrap_err();
        assert_eq!(err.code(), "InvalidSchema");
    }

    #[test]
    fn test_alias_canonicalization() {
        let schema = user_schema(r#"{"fields": {"n": {"type": "int"}, "b": {"type": "bigint"}}}"#);
        let mapped = map_user_schema(&schema).unwrap();
        assert_eq!(
            mapped.field("n").unwrap().field_type,
            FieldType::primitive(PrimitiveType::Integer)
        );
        assert_eq!(
            mapped.field("b").unwrap().field_type,
            FieldType::primitive(PrimitiveType::Long)
        );
    }

    #[test]
    fn test_empty_schema_yields_system_columns_only() {
        let schema = UserSchema {
            fields: SchemaFields::default(),
        };
        let mapped = map_user_schema(&schema).unwrap();
        assert_eq!(mapped.fields.len(), 6);
        assert_eq!(mapped.fields[0].name, "_tenant_id");
        assert_eq!(mapped.fields[0].id, 1);
    }

    #[test]
    fn test_arrow_schema_types() {
        let schema = user_schema(
            r#"{"fields": {
                "id": {"type": "long", "required": true},
                "price": {"type": "double"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "when": {"type": "timestamp"}
            }}"#,
        );
        let mapped = map_user_schema(&schema).unwrap();
        let arrow = arrow_schema(&mapped);

        assert_eq!(arrow.field_with_name("id").unwrap().data_type(), &DataType::Int64);
        assert!(!arrow.field_with_name("id").unwrap().is_nullable());
        assert_eq!(
            arrow.field_with_name("price").unwrap().data_type(),
            &DataType::Float64
        );
        assert!(matches!(
            arrow.field_with_name("tags").unwrap().data_type(),
            DataType::List(_)
        ));
        assert_eq!(
            arrow.field_with_name("when").unwrap().data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
        assert_eq!(
            arrow.field_with_name("_version").unwrap().data_type(),
            &DataType::Int32
        );
        assert!(arrow.field_with_name("_deleted_at").unwrap().is_nullable());
    }

    #[test]
    fn test_arrow_fields_carry_field_ids() {
        let schema = user_schema(r#"{"fields": {"id": {"type": "long"}}}"#);
        let mapped = map_user_schema(&schema).unwrap();
        let arrow = arrow_schema(&mapped);
        let meta = arrow.field_with_name("id").unwrap().metadata();
        assert_eq!(meta.get(FIELD_ID_META_KEY).unwrap(), "1");
    }
}
