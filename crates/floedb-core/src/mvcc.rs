//! MVCC update and delete.
//!
//! UPDATE and soft DELETE never touch existing rows: they read the latest
//! version of every matching logical row, emit exactly one successor version
//! each, and append the whole batch in a single snapshot commit. Regardless
//! of how many historical versions a record has accumulated, one UPDATE
//! produces one new version.
//!
//! HARD_DELETE is the only operation that physically removes rows: it
//! rewrites the affected data files excluding every version of every record
//! whose latest version matches the filter.

use crate::envelope::format_timestamp;
use crate::json_arrow::rows_to_batch;
use crate::query::fetch_full_rows;
use crate::scan::{concat_all, read_file};
use crate::schema_mapper::arrow_schema;
use crate::writer::Writer;
use arrow::array::{BooleanArray, StringArray};
use arrow::compute::filter_record_batch;
use chrono::{DateTime, Utc};
use floedb_catalog::metadata::DataFile;
use floedb_catalog::ResolvedTable;
use floedb_commons::constants::{
    is_system_column, COL_DELETED, COL_DELETED_AT, COL_RECORD_ID, COL_TIMESTAMP, COL_VERSION,
};
use floedb_commons::protocol::FilterSet;
use floedb_commons::schema::TableSchema;
use floedb_commons::settings::ExecSettings;
use floedb_commons::{EngineError, Result};
use object_store::ObjectStore;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub struct UpdateOutcome {
    pub records_updated: usize,
    pub resolved: ResolvedTable,
}

pub struct HardDeleteOutcome {
    pub records_deleted: usize,
    pub files_rewritten: usize,
    /// Old data files replaced by the rewrite. Still referenced by
    /// historical snapshots until those are expired.
    pub replaced_files: Vec<DataFile>,
    pub resolved: ResolvedTable,
}

/// Validate the `updates` map of an UPDATE request: whole-column
/// replacements of user columns only.
pub fn validate_updates(schema: &TableSchema, updates: &Map<String, Value>) -> Result<()> {
    if updates.is_empty() {
        return Err(EngineError::invalid_request("updates must not be empty"));
    }
    for key in updates.keys() {
        if key.contains('.') {
            return Err(EngineError::invalid_request(format!(
                "cannot update nested field '{}'; supply the full column value",
                key
            )));
        }
        if is_system_column(key) {
            return Err(EngineError::invalid_request(format!(
                "system column '{}' cannot be updated",
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
    Ok(())
}

/// Produce the successor version of each row: clone all columns, overlay
/// the updates, bump `_version`, stamp `_timestamp`. `_record_id` and
/// `_tenant_id` ride along unchanged.
fn next_versions(
    rows: &[Map<String, Value>],
    overlay: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<Vec<Map<String, Value>>> {
    let timestamp = format_timestamp(now);
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let prior_version = row
            .get(COL_VERSION)
            .and_then(Value::as_i64)
            .ok_or_else(|| EngineError::internal("row missing _version".to_string()))?;
        let mut next = row.clone();
        for (key, value) in overlay {
            next.insert(key.clone(), value.clone());
        }
        next.insert(COL_VERSION.into(), Value::from(prior_version + 1));
        next.insert(COL_TIMESTAMP.into(), Value::String(timestamp.clone()));
        out.push(next);
    }
    Ok(out)
}

async fn append_versions(
    store: &Arc<dyn ObjectStore>,
    writer: &Writer,
    resolved: &ResolvedTable,
    filters: &FilterSet,
    overlay: Map<String, Value>,
    exec: &ExecSettings,
    target_file_size_mb: u64,
) -> Result<UpdateOutcome> {
    let matching = fetch_full_rows(store, resolved, filters, exec, false).await?;
    if matching.is_empty() {
        return Ok(UpdateOutcome {
            records_updated: 0,
            resolved: resolved.clone(),
        });
    }

    let successors = next_versions(&matching, &overlay, Utc::now())?;
    let schema_ref = arrow_schema(&resolved.metadata.schema);
    let batch = rows_to_batch(&schema_ref, &successors)?;
    let files = writer
        .write_data_files(&resolved.metadata.location, &batch, target_file_size_mb)
        .await?;
    let resolved = writer.commit_append(&resolved.ident, files).await?;

    Ok(UpdateOutcome {
        records_updated: matching.len(),
        resolved,
    })
}

/// UPDATE: one new version per matching logical row.
pub async fn update(
    store: &Arc<dyn ObjectStore>,
    writer: &Writer,
    resolved: &ResolvedTable,
    filters: &FilterSet,
    updates: &Map<String, Value>,
    exec: &ExecSettings,
    target_file_size_mb: u64,
) -> Result<UpdateOutcome> {
    validate_updates(&resolved.metadata.schema, updates)?;
    append_versions(
        store,
        writer,
        resolved,
        filters,
        updates.clone(),
        exec,
        target_file_size_mb,
    )
    .await
}

/// Soft DELETE: an UPDATE whose overlay is the tombstone pair.
pub async fn soft_delete(
    store: &Arc<dyn ObjectStore>,
    writer: &Writer,
    resolved: &ResolvedTable,
    filters: &FilterSet,
    exec: &ExecSettings,
    target_file_size_mb: u64,
) -> Result<UpdateOutcome> {
    let mut overlay = Map::new();
    overlay.insert(COL_DELETED.into(), Value::Bool(true));
    overlay.insert(
        COL_DELETED_AT.into(),
        Value::String(format_timestamp(Utc::now())),
    );
    append_versions(store, writer, resolved, filters, overlay, exec, target_file_size_mb).await
}

/// HARD_DELETE: rewrite the affected data files excluding all versions of
/// every record whose latest version matches the filter. Destroys the audit
/// trail for those records by design of the operation.
pub async fn hard_delete(
    store: &Arc<dyn ObjectStore>,
    writer: &Writer,
    resolved: &ResolvedTable,
    filters: &FilterSet,
    exec: &ExecSettings,
    target_file_size_mb: u64,
) -> Result<HardDeleteOutcome> {
    // Soft-deleted latest versions still match: erasure must find them.
    let matching = fetch_full_rows(store, resolved, filters, exec, true).await?;
    if matching.is_empty() {
        return Ok(HardDeleteOutcome {
            records_deleted: 0,
            files_rewritten: 0,
            replaced_files: Vec::new(),
            resolved: resolved.clone(),
        });
    }

    let doomed: HashSet<String> = matching
        .iter()
        .filter_map(|row| row.get(COL_RECORD_ID).and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let snapshot = resolved
        .metadata
        .current_snapshot()
        .ok_or_else(|| EngineError::internal("matched rows without a snapshot".to_string()))?;
    let schema_ref = arrow_schema(&resolved.metadata.schema);

    // Partition the file list: files holding any doomed version are
    // rewritten, the rest carry over untouched.
    let mut untouched: Vec<DataFile> = Vec::new();
    let mut replaced: Vec<DataFile> = Vec::new();
    let mut survivors = Vec::new();
    for file in &snapshot.files {
        let batches = read_file(store, &file.path).await?;
        let combined = concat_all(&schema_ref, &batches)?;
        let record_ids = combined
            .column(schema_ref.index_of(COL_RECORD_ID).map_err(|e| {
                EngineError::internal(format!("missing {}: {}", COL_RECORD_ID, e))
            })?)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                EngineError::internal(format!("{} is not a string column", COL_RECORD_ID))
            })?;

        let mask: Vec<bool> = (0..combined.num_rows())
            .map(|i| !doomed.contains(record_ids.value(i)))
            .collect();
        if mask.iter().all(|keep| *keep) {
            untouched.push(file.clone());
            continue;
        }
        replaced.push(file.clone());
        let kept = filter_record_batch(&combined, &BooleanArray::from(mask))
            .map_err(|e| EngineError::internal(format!("filter: {}", e)))?;
        if kept.num_rows() > 0 {
            survivors.push(kept);
        }
    }

    let mut new_files = Vec::new();
    if !survivors.is_empty() {
        let combined = concat_all(&schema_ref, &survivors)?;
        new_files = writer
            .write_data_files(&resolved.metadata.location, &combined, target_file_size_mb)
            .await?;
    }

    let mut file_list = untouched;
    file_list.extend(new_files.clone());
    let resolved = match writer.commit_overwrite(resolved, file_list).await {
        Ok(resolved) => resolved,
        Err(e) if e.is_conflict() => {
            writer.discard_files(&new_files).await;
            return Err(EngineError::WriteConflict(format!(
                "hard delete on {} lost the commit race",
                resolved.ident
            )));
        }
        Err(e) => return Err(e.into()),
    };

    log::info!(
        "hard deleted {} records ({} files rewritten) from {}",
        matching.len(),
        replaced.len(),
        resolved.ident
    );
    Ok(HardDeleteOutcome {
        records_deleted: matching.len(),
        files_rewritten: replaced.len(),
        replaced_files: replaced,
        resolved,
    })
}
