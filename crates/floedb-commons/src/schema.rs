//! Table schema model.
//!
//! Two representations live here:
//!
//! - the wire form ([`UserSchema`], [`FieldDefinition`]) exactly as it
//!   arrives in a CREATE_TABLE request, with declaration order preserved;
//! - the typed form ([`TableSchema`], [`SchemaField`], [`FieldType`]) with
//!   stable field ids, produced by the schema mapper and persisted in table
//!   metadata.
//!
//! Modeling field types as a tagged sum eliminates the unknown-type class of
//! runtime errors past the validation boundary: everything downstream
//! matches exhaustively.

use crate::constants::is_system_column;
use crate::errors::{EngineError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Primitive field types accepted in user schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    Timestamp,
    Decimal,
    Binary,
}

impl PrimitiveType {
    /// Parse a primitive type name, canonicalizing known aliases
    /// (`int` ≡ `integer`, `bigint` ≡ `long`, `bool` ≡ `boolean`,
    /// `text` ≡ `string`). Unknown names fail with `InvalidSchema`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "long" | "bigint" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "timestamp" => Ok(Self::Timestamp),
            "decimal" => Ok(Self::Decimal),
            "binary" => Ok(Self::Binary),
            other => Err(EngineError::invalid_schema(format!(
                "unknown field type '{}'",
                other
            ))),
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Decimal => "decimal",
            Self::Binary => "binary",
        }
    }

    /// True for types whose JSON literal form is a number.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Long | Self::Float | Self::Double | Self::Decimal
        )
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Typed field type: a primitive or a recursive complex type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Primitive { primitive: PrimitiveType },
    Array { element: Box<SchemaField> },
    Map { key: PrimitiveType, value: Box<SchemaField> },
    Struct { fields: Vec<SchemaField> },
}

impl FieldType {
    pub fn primitive(p: PrimitiveType) -> Self {
        Self::Primitive { primitive: p }
    }

    /// Human-readable type name used in error messages and DESCRIBE output.
    pub fn type_name(&self) -> String {
        match self {
            Self::Primitive { primitive } => primitive.name().to_string(),
            Self::Array { element } => format!("array<{}>", element.field_type.type_name()),
            Self::Map { key, value } => {
                format!("map<{}, {}>", key.name(), value.field_type.type_name())
            }
            Self::Struct { fields } => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.name, f.field_type.type_name()))
                    .collect();
                format!("struct<{}>", inner.join(", "))
            }
        }
    }
}

/// A named field in the typed physical schema, with its stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(flatten)]
    pub field_type: FieldType,
}

/// Typed physical schema: user fields in declaration order followed by the
/// six system columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<SchemaField>,
    pub last_field_id: i32,
}

impl TableSchema {
    /// Look up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Top-level user columns (system columns excluded), declaration order.
    pub fn user_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| !is_system_column(&f.name))
    }

    /// Resolve a dotted path (`address.city`) against the schema.
    ///
    /// Every non-terminal segment must name a struct member; anything else
    /// fails with `InvalidRequest`. Returns the terminal field.
    pub fn resolve_path<'a>(&'a self, path: &str) -> Result<&'a SchemaField> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.field(first).ok_or_else(|| {
            EngineError::invalid_request(format!("unknown field '{}'", first))
        })?;
        for segment in segments {
            match &current.field_type {
                FieldType::Struct { fields } => {
                    current = fields.iter().find(|f| f.name == segment).ok_or_else(|| {
                        EngineError::invalid_request(format!(
                            "'{}' is not a member of struct '{}'",
                            segment, current.name
                        ))
                    })?;
                }
                _ => {
                    return Err(EngineError::invalid_request(format!(
                        "cannot traverse into '{}': '{}' is not a struct",
                        path, current.name
                    )))
                }
            }
        }
        Ok(current)
    }
}

/// Wire form of a single field declaration inside a CREATE_TABLE request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<Box<FieldDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<SchemaFields>,
}

impl FieldDefinition {
    pub fn primitive(type_name: &str, required: bool) -> Self {
        Self {
            field_type: type_name.to_string(),
            required,
            ..Default::default()
        }
    }
}

/// Wire form of a user schema: `{"fields": {"name": {...}, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSchema {
    pub fields: SchemaFields,
}

/// An ordered `field_name → FieldDefinition` mapping.
///
/// Serialized as a JSON object; declaration order is load-bearing because
/// field ids are assigned in declaration order, so a plain map type is not
/// acceptable here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaFields(pub Vec<(String, FieldDefinition)>);

impl SchemaFields {
    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldDefinition)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SchemaFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, def) in &self.0 {
            map.serialize_entry(name, def)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SchemaFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = SchemaFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to field definition")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, def)) = access.next_entry::<String, FieldDefinition>()? {
                    fields.push((name, def));
                }
                Ok(SchemaFields(fields))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}
