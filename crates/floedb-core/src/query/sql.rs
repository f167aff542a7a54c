//! SQL assembly for the embedded scan engine.
//!
//! The scan is materialized and deduplicated before SQL runs, so the
//! statement built here only has to express projection, filtering,
//! aggregation, sorting and pagination over one registered table. Operators
//! and field paths are validated against the table schema first; value
//! literals are rendered against the resolved column type, so cross-type
//! comparisons fail with `TypeMismatch` instead of silently coercing.

use floedb_commons::constants::{COL_DELETED, COL_TENANT_ID};
use floedb_commons::protocol::{
    AggregateField, AggregateFunction, Filter, FilterOperator, QueryRequest, SortOrder,
};
use floedb_commons::schema::{FieldType, PrimitiveType, TableSchema};
use floedb_commons::{EngineError, Result};
use serde_json::Value;

/// Name under which the deduplicated scan is registered.
pub const SCAN_TABLE: &str = "snapshot";

/// Builds one SELECT statement for a query request.
pub struct SqlBuilder<'a> {
    schema: &'a TableSchema,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    pub fn build(&self, request: &QueryRequest) -> Result<String> {
        if !request.having.is_empty() && request.group_by.is_none() {
            return Err(EngineError::invalid_request(
                "'having' requires 'group_by'",
            ));
        }

        let mut sql = format!("SELECT {}", self.select_clause(request)?);
        sql.push_str(&format!(" FROM {}", SCAN_TABLE));
        sql.push_str(&format!(" WHERE {}", self.where_clause(request)?));

        if let Some(group_by) = &request.group_by {
            let exprs: Result<Vec<String>> =
                group_by.iter().map(|g| self.column_expr(g)).collect();
            sql.push_str(&format!(" GROUP BY {}", exprs?.join(", ")));
        }

        if !request.having.is_empty() {
            let conjuncts: Result<Vec<String>> = request
                .having
                .iter()
                .map(|f| self.having_condition(f, &request.aggregations))
                .collect();
            sql.push_str(&format!(" HAVING {}", conjuncts?.join(" AND ")));
        }

        if !request.sort.is_empty() {
            let keys: Result<Vec<String>> = request
                .sort
                .iter()
                .map(|s| {
                    let expr = self.sort_expr(&s.field)?;
                    let direction = match s.order {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    Ok(format!("{} {}", expr, direction))
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", keys?.join(", ")));
        }

        if let Some(limit) = request.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = request.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(sql)
    }

    fn select_clause(&self, request: &QueryRequest) -> Result<String> {
        let mut parts = Vec::new();

        if !request.aggregations.is_empty() {
            if let Some(group_by) = &request.group_by {
                for column in group_by {
                    parts.push(self.projected_expr(column)?);
                }
            }
            for agg in &request.aggregations {
                parts.push(self.aggregate_expr(agg)?);
            }
        } else {
            match &request.projection {
                Some(columns) => {
                    if columns.is_empty() {
                        return Err(EngineError::invalid_request(
                            "projection must not be empty",
                        ));
                    }
                    for column in columns {
                        parts.push(self.projected_expr(column)?);
                    }
                }
                // Default projection: all user columns, declaration order.
                None => {
                    for field in self.schema.user_fields() {
                        parts.push(quote_ident(&field.name));
                    }
                    if parts.is_empty() {
                        // Tables can be declared with system columns only.
                        parts.push("*".to_string());
                    }
                }
            }
        }

        Ok(parts.join(", "))
    }

    fn where_clause(&self, request: &QueryRequest) -> Result<String> {
        let mut conjuncts = vec![format!(
            "{} = {}",
            quote_ident(COL_TENANT_ID),
            string_literal(request.tenant_id.as_str())
        )];
        if !request.include_deleted {
            conjuncts.push(format!("{} IS NOT TRUE", quote_ident(COL_DELETED)));
        }
        for filter in request.filters.iter() {
            conjuncts.push(self.filter_condition(filter)?);
        }
        Ok(conjuncts.join(" AND "))
    }

    /// Expression for a (possibly dotted) column path, validated against the
    /// schema.
    fn column_expr(&self, path: &str) -> Result<String> {
        self.schema.resolve_path(path)?;
        Ok(path_expr(path))
    }

    /// Select-list expression: dotted paths are aliased to their full path
    /// so output rows keep the requested name.
    fn projected_expr(&self, path: &str) -> Result<String> {
        let expr = self.column_expr(path)?;
        if path.contains('.') {
            Ok(format!("{} AS {}", expr, quote_ident(path)))
        } else {
            Ok(expr)
        }
    }

    /// Sort keys may name a schema column or an aggregation alias.
    fn sort_expr(&self, field: &str) -> Result<String> {
        match self.schema.resolve_path(field) {
            Ok(_) => Ok(path_expr(field)),
            Err(_) => Ok(quote_ident(field)),
        }
    }

    fn aggregate_expr(&self, agg: &AggregateField) -> Result<String> {
        let expr = self.aggregate_fn_expr(agg)?;
        Ok(format!("{} AS {}", expr, quote_ident(&agg.output_name())))
    }

    /// The bare aggregate call, without the output alias.
    fn aggregate_fn_expr(&self, agg: &AggregateField) -> Result<String> {
        let inner = match &agg.field {
            Some(field) => Some(self.column_expr(field)?),
            None => None,
        };
        let expr = match (agg.function, inner) {
            (AggregateFunction::Count, None) => "COUNT(*)".to_string(),
            (AggregateFunction::Count, Some(col)) => format!("COUNT({})", col),
            (AggregateFunction::CountDistinct, Some(col)) => format!("COUNT(DISTINCT {})", col),
            (AggregateFunction::Sum, Some(col)) => format!("SUM({})", col),
            (AggregateFunction::Avg, Some(col)) => format!("AVG({})", col),
            (AggregateFunction::Min, Some(col)) => format!("MIN({})", col),
            (AggregateFunction::Max, Some(col)) => format!("MAX({})", col),
            (AggregateFunction::Stddev, Some(col)) => format!("STDDEV({})", col),
            (AggregateFunction::Variance, Some(col)) => format!("VAR_SAMP({})", col),
            (AggregateFunction::Median, Some(col)) => format!("MEDIAN({})", col),
            (function, None) => {
                return Err(EngineError::invalid_request(format!(
                    "aggregation '{}' requires a field",
                    function.name()
                )))
            }
        };
        Ok(expr)
    }

    fn filter_condition(&self, filter: &Filter) -> Result<String> {
        let field = self.schema.resolve_path(&filter.field)?;
        let col = path_expr(&filter.field);

        match &field.field_type {
            FieldType::Array { .. } => {
                // Arrays expose only substring match over a serialized form.
                if filter.operator != FilterOperator::Like {
                    return Err(EngineError::type_mismatch(format!(
                        "array column '{}' supports only the 'like' operator",
                        filter.field
                    )));
                }
                let pattern = expect_string(&filter.value, &filter.field)?;
                Ok(format!(
                    "array_to_string({}, ',') LIKE {}",
                    col,
                    string_literal(&pattern)
                ))
            }
            FieldType::Struct { .. } | FieldType::Map { .. } => {
                Err(EngineError::invalid_request(format!(
                    "column '{}' is not filterable; address struct members with dotted paths",
                    filter.field
                )))
            }
            FieldType::Primitive { primitive } => {
                self.primitive_condition(filter, &col, *primitive)
            }
        }
    }

    fn primitive_condition(
        &self,
        filter: &Filter,
        col: &str,
        primitive: PrimitiveType,
    ) -> Result<String> {
        match filter.operator {
            FilterOperator::Like => {
                if primitive != PrimitiveType::String && primitive != PrimitiveType::Binary {
                    return Err(EngineError::type_mismatch(format!(
                        "'like' requires a string column, '{}' is {}",
                        filter.field, primitive
                    )));
                }
                let pattern = expect_string(&filter.value, &filter.field)?;
                Ok(format!("{} LIKE {}", col, string_literal(&pattern)))
            }
            FilterOperator::In => {
                let items = filter.value.as_array().ok_or_else(|| {
                    EngineError::type_mismatch(format!(
                        "'in' on '{}' requires an array value",
                        filter.field
                    ))
                })?;
                if items.is_empty() {
                    // No candidates can match.
                    return Ok("FALSE".to_string());
                }
                let rendered: Result<Vec<String>> = items
                    .iter()
                    .map(|v| scalar_literal(v, primitive, &filter.field))
                    .collect();
                Ok(format!("{} IN ({})", col, rendered?.join(", ")))
            }
            FilterOperator::Between => {
                let bounds = filter.value.as_array().filter(|a| a.len() == 2).ok_or_else(
                    || {
                        EngineError::type_mismatch(format!(
                            "'between' on '{}' requires a two-element array",
                            filter.field
                        ))
                    },
                )?;
                let low = scalar_literal(&bounds[0], primitive, &filter.field)?;
                let high = scalar_literal(&bounds[1], primitive, &filter.field)?;
                Ok(format!("{} BETWEEN {} AND {}", col, low, high))
            }
            op => {
                let literal = scalar_literal(&filter.value, primitive, &filter.field)?;
                Ok(format!("{} {} {}", col, comparison_sql(op), literal))
            }
        }
    }

    /// HAVING conditions reference aggregation aliases. SQL resolves HAVING
    /// against the input of the projection, so an alias is rewritten to its
    /// aggregate expression; other names (group keys) pass through quoted.
    /// Literals are rendered from their JSON type since aliases have no
    /// schema entry.
    fn having_condition(&self, filter: &Filter, aggregations: &[AggregateField]) -> Result<String> {
        let col = match aggregations
            .iter()
            .find(|agg| agg.output_name() == filter.field)
        {
            Some(agg) => self.aggregate_fn_expr(agg)?,
            None => quote_ident(&filter.field),
        };
        match filter.operator {
            FilterOperator::In => {
                let items = filter.value.as_array().ok_or_else(|| {
                    EngineError::type_mismatch("'in' requires an array value".to_string())
                })?;
                if items.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let rendered: Result<Vec<String>> = items.iter().map(untyped_literal).collect();
                Ok(format!("{} IN ({})", col, rendered?.join(", ")))
            }
            FilterOperator::Between => {
                let bounds = filter.value.as_array().filter(|a| a.len() == 2).ok_or_else(
                    || EngineError::type_mismatch("'between' requires two bounds".to_string()),
                )?;
                Ok(format!(
                    "{} BETWEEN {} AND {}",
                    col,
                    untyped_literal(&bounds[0])?,
                    untyped_literal(&bounds[1])?
                ))
            }
            FilterOperator::Like => Ok(format!(
                "{} LIKE {}",
                col,
                untyped_literal(&filter.value)?
            )),
            op => Ok(format!(
                "{} {} {}",
                col,
                comparison_sql(op),
                untyped_literal(&filter.value)?
            )),
        }
    }
}

fn comparison_sql(op: FilterOperator) -> &'static str {
    match op {
        FilterOperator::Eq => "=",
        FilterOperator::Ne => "!=",
        FilterOperator::Gt => ">",
        FilterOperator::Gte => ">=",
        FilterOperator::Lt => "<",
        FilterOperator::Lte => "<=",
        // Handled before reaching here
        FilterOperator::In | FilterOperator::Like | FilterOperator::Between => unreachable!(),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `address.city` → `"address"['city']`
fn path_expr(path: &str) -> String {
    let mut segments = path.split('.');
    let mut expr = quote_ident(segments.next().unwrap_or_default());
    for segment in segments {
        expr.push_str(&format!("['{}']", segment.replace('\'', "''")));
    }
    expr
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn expect_string(value: &Value, field: &str) -> Result<String> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            EngineError::type_mismatch(format!("'{}' expects a string value", field))
        })
}

/// Render a scalar literal for a column of the given primitive type,
/// rejecting incompatible value shapes.
fn scalar_literal(value: &Value, primitive: PrimitiveType, field: &str) -> Result<String> {
    match (primitive, value) {
        (PrimitiveType::String | PrimitiveType::Binary, Value::String(s)) => {
            Ok(string_literal(s))
        }
        (PrimitiveType::Integer | PrimitiveType::Long, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(n.to_string())
            } else {
                Err(EngineError::type_mismatch(format!(
                    "'{}' is an integer column, got fractional value {}",
                    field, n
                )))
            }
        }
        (
            PrimitiveType::Float | PrimitiveType::Double | PrimitiveType::Decimal,
            Value::Number(n),
        ) => Ok(n.to_string()),
        (PrimitiveType::Boolean, Value::Bool(b)) => {
            Ok(if *b { "TRUE" } else { "FALSE" }.to_string())
        }
        (PrimitiveType::Date, Value::String(s)) => Ok(format!("DATE {}", string_literal(s))),
        (PrimitiveType::Timestamp, Value::String(s)) => {
            Ok(format!("TIMESTAMP {}", string_literal(s)))
        }
        (primitive, Value::Null) => Err(EngineError::type_mismatch(format!(
            "null is not a valid comparison value for '{}' ({})",
            field, primitive
        ))),
        (primitive, other) => Err(EngineError::type_mismatch(format!(
            "'{}' is a {} column, value {} is incompatible",
            field, primitive, other
        ))),
    }
}

fn untyped_literal(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(string_literal(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Null => Ok("NULL".to_string()),
        other => Err(EngineError::type_mismatch(format!(
            "unsupported literal {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_mapper::map_user_schema;
    use floedb_commons::protocol::{FilterSet, SortField};
    use floedb_commons::schema::UserSchema;
    use floedb_commons::{Namespace, TableIdent, TableName, TenantId};
    use serde_json::json;

    fn schema() -> TableSchema {
        let user: UserSchema = serde_json::from_str(
            r#"{"fields": {
                "id": {"type": "long", "required": true},
                "name": {"type": "string"},
                "price": {"type": "double"},
                "active": {"type": "boolean"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "address": {"type": "struct", "fields": {
                    "city": {"type": "string"},
                    "state": {"type": "string"}
                }}
            }}"#,
        )
        .unwrap();
        map_user_schema(&user).unwrap()
    }

    fn base_request() -> QueryRequest {
        let ident = TableIdent::new(
            TenantId::new("acme"),
            Namespace::new("sales"),
            TableName::new("orders"),
        );
        QueryRequest::all_rows(&ident)
    }

    #[test]
    fn test_default_projection_selects_user_columns() {
        let schema = schema();
        let sql = SqlBuilder::new(&schema).build(&base_request()).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\", \"price\", \"active\", \"tags\", \"address\" \
             FROM snapshot WHERE \"_tenant_id\" = 'acme' AND \"_deleted\" IS NOT TRUE"
        );
    }

    #[test]
    fn test_include_deleted_drops_tombstone_filter() {
        let schema = schema();
        let mut request = base_request();
        request.include_deleted = true;
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(!sql.contains("_deleted"));
    }

    #[test]
    fn test_filters_and_pagination() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![
            Filter::new("price", FilterOperator::Gte, json!(10.5)),
            Filter::new("name", FilterOperator::Like, json!("A%")),
        ]);
        request.sort = vec![SortField {
            field: "price".into(),
            order: floedb_commons::protocol::SortOrder::Desc,
        }];
        request.limit = Some(10);
        request.offset = Some(20);

        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("\"price\" >= 10.5"));
        assert!(sql.contains("\"name\" LIKE 'A%'"));
        assert!(sql.ends_with("ORDER BY \"price\" DESC LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_limit_zero_is_preserved() {
        let schema = schema();
        let mut request = base_request();
        request.limit = Some(0);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.ends_with("LIMIT 0"));
    }

    #[test]
    fn test_dotted_path_projection_and_filter() {
        let schema = schema();
        let mut request = base_request();
        request.projection = Some(vec!["id".into(), "address.city".into()]);
        request.filters = FilterSet(vec![Filter::eq("address.state", json!("CA"))]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("\"address\"['city'] AS \"address.city\""));
        assert!(sql.contains("\"address\"['state'] = 'CA'"));
    }

    #[test]
    fn test_unknown_path_segment_rejected() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::eq("address.zip", json!("94110"))]);
        let err = SqlBuilder::new(&schema).build(&request).unwrap_err();
        assert_eq!(err.code(), "InvalidRequest");
    }

    #[test]
    fn test_type_mismatch_string_vs_long() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::eq("id", json!("one"))]);
        let err = SqlBuilder::new(&schema).build(&request).unwrap_err();
        assert_eq!(err.code(), "TypeMismatch");
    }

    #[test]
    fn test_fractional_value_against_integer_column() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::new("id", FilterOperator::Gt, json!(1.5))]);
        assert_eq!(
            SqlBuilder::new(&schema).build(&request).unwrap_err().code(),
            "TypeMismatch"
        );
    }

    #[test]
    fn test_in_and_between() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![
            Filter::new("name", FilterOperator::In, json!(["A", "B"])),
            Filter::new("price", FilterOperator::Between, json!([5, 20])),
        ]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("\"name\" IN ('A', 'B')"));
        assert!(sql.contains("\"price\" BETWEEN 5 AND 20"));
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::new("name", FilterOperator::In, json!([]))]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("FALSE"));
    }

    #[test]
    fn test_array_column_accepts_only_like() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::new(
            "tags",
            FilterOperator::Like,
            json!("%red%"),
        )]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("array_to_string(\"tags\", ',') LIKE '%red%'"));

        request.filters = FilterSet(vec![Filter::eq("tags", json!("red"))]);
        assert_eq!(
            SqlBuilder::new(&schema).build(&request).unwrap_err().code(),
            "TypeMismatch"
        );
    }

    #[test]
    fn test_struct_column_not_directly_filterable() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::eq("address", json!({"city": "SF"}))]);
        assert_eq!(
            SqlBuilder::new(&schema).build(&request).unwrap_err().code(),
            "InvalidRequest"
        );
    }

    #[test]
    fn test_aggregations_with_group_by_and_having() {
        let schema = schema();
        let mut request = base_request();
        request.group_by = Some(vec!["name".into()]);
        request.aggregations = vec![
            AggregateField {
                function: AggregateFunction::Count,
                field: None,
                alias: Some("orders".into()),
            },
            AggregateField {
                function: AggregateFunction::Sum,
                field: Some("price".into()),
                alias: Some("revenue".into()),
            },
        ];
        request.having = FilterSet(vec![Filter::new(
            "revenue",
            FilterOperator::Gt,
            json!(1000),
        )]);

        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("COUNT(*) AS \"orders\""));
        assert!(sql.contains("SUM(\"price\") AS \"revenue\""));
        assert!(sql.contains("GROUP BY \"name\""));
        // The alias is rewritten to its aggregate expression for HAVING
        assert!(sql.contains("HAVING SUM(\"price\") > 1000"));
    }

    #[test]
    fn test_having_without_group_by_rejected() {
        let schema = schema();
        let mut request = base_request();
        request.having = FilterSet(vec![Filter::new("x", FilterOperator::Gt, json!(1))]);
        assert_eq!(
            SqlBuilder::new(&schema).build(&request).unwrap_err().code(),
            "InvalidRequest"
        );
    }

    #[test]
    fn test_string_literal_escaping() {
        let schema = schema();
        let mut request = base_request();
        request.filters = FilterSet(vec![Filter::eq("name", json!("O'Brien"))]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.contains("'O''Brien'"));
    }

    #[test]
    fn test_system_columns_are_queryable() {
        let schema = schema();
        let mut request = base_request();
        request.projection = Some(vec!["_version".into(), "price".into()]);
        request.filters = FilterSet(vec![Filter::eq("id", json!(1))]);
        let sql = SqlBuilder::new(&schema).build(&request).unwrap();
        assert!(sql.starts_with("SELECT \"_version\", \"price\""));
    }
}
