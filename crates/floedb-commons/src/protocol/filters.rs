//! Filter, sort and aggregation forms of the operation protocol.
//!
//! Filters arrive as a list of `{field, operator, value}` conditions, all
//! ANDed together. A legacy map form `{"field": {"op": value}}` (and the
//! even older `{"field": value}` implicit-equality shorthand) is still
//! accepted and desugared into the list form at deserialization time.

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Comparison operator of a single filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
    Between,
}

impl FilterOperator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            "like" => Some(Self::Like),
            "between" => Some(Self::Between),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Like => "like",
            Self::Between => "between",
        }
    }
}

/// Single filter condition. All conditions in a request are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }
}

/// Conjunction of filter conditions, accepting both wire forms.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterSet(pub Vec<Filter>);

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

impl<'de> Deserialize<'de> for FilterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FilterSetVisitor;

        impl<'de> Visitor<'de> for FilterSetVisitor {
            type Value = FilterSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a filter list or a field-to-condition map")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut filters = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(filter) = seq.next_element::<Filter>()? {
                    filters.push(filter);
                }
                Ok(FilterSet(filters))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut filters = Vec::new();
                while let Some((field, value)) = map.next_entry::<String, Value>()? {
                    match value {
                        Value::Object(conditions) => {
                            for (op_name, op_value) in conditions {
                                let operator =
                                    FilterOperator::parse(&op_name).ok_or_else(|| {
                                        serde::de::Error::custom(format!(
                                            "unknown filter operator '{}'",
                                            op_name
                                        ))
                                    })?;
                                filters.push(Filter::new(field.clone(), operator, op_value));
                            }
                        }
                        // Implicit equality shorthand
                        scalar => filters.push(Filter::eq(field, scalar)),
                    }
                }
                Ok(FilterSet(filters))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(FilterSet::default())
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(FilterSet::default())
            }
        }

        deserializer.deserialize_any(FilterSetVisitor)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Single sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Aggregation function vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
    Variance,
    Median,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Stddev => "stddev",
            Self::Variance => "variance",
            Self::Median => "median",
        }
    }
}

/// Single aggregation: `{function, field, alias}`. `field` is omitted for
/// `count` over all rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateField {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggregateField {
    /// Output column name: explicit alias, else `{function}_{field}`.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => match &self.field {
                Some(field) => format!("{}_{}", self.function.name(), field.replace('.', "_")),
                None => self.function.name().to_string(),
            },
        }
    }
}
