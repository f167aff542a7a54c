//! Table introspection: DESCRIBE_TABLE and LIST_TABLES support.

use crate::scan::{read_files, resolve_latest_versions};
use crate::schema_mapper::arrow_schema;
use arrow::array::{Array, BooleanArray};
use chrono::DateTime;
use floedb_catalog::ResolvedTable;
use floedb_commons::constants::COL_DELETED;
use floedb_commons::protocol::TableDescription;
use floedb_commons::{EngineError, Result};
use object_store::ObjectStore;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Build the DESCRIBE_TABLE payload: user-facing schema plus live row count
/// and file statistics of the current snapshot.
pub async fn describe_table(
    store: &Arc<dyn ObjectStore>,
    resolved: &ResolvedTable,
) -> Result<TableDescription> {
    let snapshot = resolved.metadata.current_snapshot();
    let (file_count, total_bytes, last_commit_at) = match snapshot {
        Some(s) => (
            s.files.len(),
            s.total_bytes(),
            DateTime::from_timestamp_millis(s.timestamp_ms),
        ),
        None => (0, 0, None),
    };

    let row_count = match snapshot {
        Some(s) => live_row_count(store, resolved, &s.files).await?,
        None => 0,
    };

    let mut fields = Map::new();
    for field in resolved.metadata.schema.user_fields() {
        fields.insert(
            field.name.clone(),
            Value::String(field.field_type.type_name()),
        );
    }

    Ok(TableDescription {
        table_name: resolved.ident.table().as_str().to_string(),
        namespace: resolved.ident.namespace().as_str().to_string(),
        row_count,
        file_count,
        total_bytes,
        snapshot_count: resolved.metadata.snapshots.len(),
        last_commit_at,
        schema: json!({ "fields": fields }),
    })
}

/// Latest versions that are not soft-deleted.
async fn live_row_count(
    store: &Arc<dyn ObjectStore>,
    resolved: &ResolvedTable,
    files: &[floedb_catalog::metadata::DataFile],
) -> Result<u64> {
    let schema_ref = arrow_schema(&resolved.metadata.schema);
    let scan = read_files(store, files).await?;
    let latest = resolve_latest_versions(&schema_ref, &scan.batches)?;
    if latest.num_rows() == 0 {
        return Ok(0);
    }
    let deleted_idx = schema_ref
        .index_of(COL_DELETED)
        .map_err(|e| EngineError::internal(format!("missing {}: {}", COL_DELETED, e)))?;
    let deleted = latest
        .column(deleted_idx)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| EngineError::internal(format!("{} is not a boolean column", COL_DELETED)))?;
    let live = (0..latest.num_rows())
        .filter(|&i| deleted.is_null(i) || !deleted.value(i))
        .count();
    Ok(live as u64)
}
