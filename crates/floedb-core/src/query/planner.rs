//! Query execution.
//!
//! A query runs in three stages: scan the selected snapshot's data files,
//! reduce to latest versions (unless `skip_versioning`), then hand the
//! materialized batch to the embedded DataFusion session for filtering,
//! aggregation, sorting and pagination. Once the snapshot is resolved the
//! whole query executes against it; concurrent commits are invisible.

use crate::json_arrow::batches_to_rows;
use crate::query::sql::{SqlBuilder, SCAN_TABLE};
use crate::scan::{concat_all, read_files, resolve_latest_versions};
use crate::schema_mapper::arrow_schema;
use datafusion::datasource::MemTable;
use datafusion::execution::runtime_env::{RuntimeConfig, RuntimeEnv};
use datafusion::prelude::{SessionConfig, SessionContext};
use floedb_catalog::ResolvedTable;
use floedb_commons::protocol::{FilterSet, QueryMetadata, QueryRequest};
use floedb_commons::settings::ExecSettings;
use floedb_commons::{EngineError, Result};
use object_store::ObjectStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Materialized query result.
pub struct QueryOutput {
    pub rows: Vec<Map<String, Value>>,
    pub metadata: QueryMetadata,
}

/// Execute a query against a resolved table.
pub async fn run_query(
    store: &Arc<dyn ObjectStore>,
    resolved: &ResolvedTable,
    request: &QueryRequest,
    exec: &ExecSettings,
    cache_hit: bool,
) -> Result<QueryOutput> {
    let started = Instant::now();
    let query_id = Uuid::new_v4().to_string();
    let schema = &resolved.metadata.schema;
    let schema_ref = arrow_schema(schema);

    // Validate and plan before touching storage so a bad request fails fast
    // even on an empty table.
    let sql = SqlBuilder::new(schema).build(request)?;

    let snapshot = match request.as_of {
        Some(ts) => resolved.metadata.snapshot_as_of(ts.timestamp_millis()),
        None => resolved.metadata.current_snapshot(),
    };

    let (batches, scanned_rows, scanned_bytes) = match snapshot {
        Some(snapshot) => {
            let scan = read_files(store, &snapshot.files).await?;
            (scan.batches, scan.scanned_rows, scan.scanned_bytes)
        }
        // Fresh table, or `as_of` earlier than the first snapshot.
        None => (Vec::new(), 0, 0),
    };

    let input = if request.skip_versioning {
        concat_all(&schema_ref, &batches)?
    } else {
        resolve_latest_versions(&schema_ref, &batches)?
    };

    let ctx = session_context(exec)?;
    let table = MemTable::try_new(schema_ref, vec![vec![input]])
        .map_err(|e| EngineError::internal(format!("register scan: {}", e)))?;
    ctx.register_table(SCAN_TABLE, Arc::new(table))
        .map_err(|e| EngineError::internal(format!("register scan: {}", e)))?;

    let frame = ctx
        .sql(&sql)
        .await
        .map_err(|e| EngineError::internal(format!("plan query: {}", e)))?;
    let results = frame
        .collect()
        .await
        .map_err(|e| EngineError::internal(format!("execute query: {}", e)))?;

    let rows = batches_to_rows(&results)?;
    let metadata = QueryMetadata {
        row_count: rows.len(),
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        scanned_rows,
        scanned_bytes,
        cache_hit,
        query_id,
    };
    Ok(QueryOutput { rows, metadata })
}

/// Fetch complete physical rows (every column, system columns included)
/// matching `filters`, with enforced latest-version resolution. This is the
/// read side of UPDATE/DELETE.
pub async fn fetch_full_rows(
    store: &Arc<dyn ObjectStore>,
    resolved: &ResolvedTable,
    filters: &FilterSet,
    exec: &ExecSettings,
    include_deleted: bool,
) -> Result<Vec<Map<String, Value>>> {
    let ident = &resolved.ident;
    let mut request = QueryRequest::all_rows(ident);
    request.filters = filters.clone();
    request.include_deleted = include_deleted;
    request.projection = Some(
        resolved
            .metadata
            .schema
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect(),
    );
    let output = run_query(store, resolved, &request, exec, false).await?;
    Ok(output.rows)
}

fn session_context(exec: &ExecSettings) -> Result<SessionContext> {
    let runtime_config =
        RuntimeConfig::new().with_memory_limit(exec.memory_limit.max(64 * 1024 * 1024), 1.0);
    let runtime = RuntimeEnv::new(runtime_config)
        .map_err(|e| EngineError::internal(format!("scan runtime: {}", e)))?;
    let config = SessionConfig::new()
        .with_target_partitions(exec.threads.max(1))
        .with_batch_size(8192);
    Ok(SessionContext::new_with_config_rt(config, Arc::new(runtime)))
}
