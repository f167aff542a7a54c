//! Operation dispatcher.
//!
//! `TableEngine` is the single entry point: it validates the envelope,
//! enforces per-operation deadlines, routes to the component handlers and
//! renders every outcome, success or failure, as the uniform response
//! envelope. The metadata cache and the per-table write counters are the
//! only process-wide mutable state.

use crate::compactor::{small_file_count, Compactor};
use crate::describe::describe_table;
use crate::envelope::enrich_for_write;
use crate::json_arrow::rows_to_batch;
use crate::mvcc;
use crate::query::run_query;
use crate::schema_mapper::{arrow_schema, map_user_schema};
use crate::writer::Writer;
use chrono::Utc;
use dashmap::DashMap;
use floedb_catalog::error::CatalogError;
use floedb_catalog::metadata::TableMetadata;
use floedb_catalog::{Catalog, MetadataCache, ResolvedTable};
use floedb_commons::constants::{COMPACT_DEADLINE_SECS, WRITE_DEADLINE_SECS};
use floedb_commons::protocol::{
    table_ident, CompactRequest, CreateTableRequest, DeleteRequest, DescribeTableRequest,
    HardDeleteRequest, ListTablesRequest, OperationRequest, QueryMetadata, QueryRequest,
    ResponseEnvelope, UpdateRequest, WriteRequest,
};
use floedb_commons::settings::EngineSettings;
use floedb_commons::validation::validate_identifier;
use floedb_commons::{EngineError, Result, TableIdent};
use object_store::ObjectStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Internal result of one dispatched operation.
struct OpOutput {
    data: Value,
    metadata: Option<QueryMetadata>,
    compaction_hint: Option<(bool, usize)>,
}

impl OpOutput {
    fn data(data: Value) -> Self {
        Self {
            data,
            metadata: None,
            compaction_hint: None,
        }
    }
}

pub struct TableEngine {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    settings: EngineSettings,
    cache: MetadataCache,
    writer: Writer,
    compactor: Compactor,
    write_counters: DashMap<String, u64>,
}

impl TableEngine {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        settings: EngineSettings,
    ) -> Self {
        let cache = MetadataCache::new(Duration::from_millis(
            settings.performance.metadata_cache_ttl_ms,
        ));
        let writer = Writer::new(store.clone(), catalog.clone(), settings.clone());
        let compactor = Compactor::new(store.clone(), catalog.clone(), settings.clone());
        Self {
            catalog,
            store,
            settings,
            cache,
            writer,
            compactor,
            write_counters: DashMap::new(),
        }
    }

    /// Execute one operation, always producing a response envelope.
    pub async fn execute(&self, request: OperationRequest) -> ResponseEnvelope {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let operation = request.operation_name();
        let deadline = self.deadline_for(&request);

        let result = match tokio::time::timeout(deadline, self.dispatch(&request)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(format!(
                "{} exceeded the {} s deadline",
                operation,
                deadline.as_secs()
            ))),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(output) => {
                log::info!(
                    "{} completed in {:.1} ms (request {})",
                    operation,
                    elapsed_ms,
                    request_id
                );
                let mut envelope =
                    ResponseEnvelope::success(request_id, elapsed_ms, output.data);
                if let Some(metadata) = output.metadata {
                    envelope = envelope.with_metadata(metadata);
                }
                if let Some((recommended, small_files)) = output.compaction_hint {
                    envelope = envelope.with_compaction_hint(recommended, small_files);
                }
                envelope
            }
            Err(e) => {
                log::warn!(
                    "{} failed in {:.1} ms (request {}): {}",
                    operation,
                    elapsed_ms,
                    request_id,
                    e
                );
                ResponseEnvelope::failure(request_id, elapsed_ms, &e)
            }
        }
    }

    fn deadline_for(&self, request: &OperationRequest) -> Duration {
        match request {
            OperationRequest::Query(_)
            | OperationRequest::ListTables(_)
            | OperationRequest::DescribeTable(_) => {
                Duration::from_millis(self.settings.performance.query_timeout_ms)
            }
            OperationRequest::Compact(_) => Duration::from_secs(COMPACT_DEADLINE_SECS),
            _ => Duration::from_secs(WRITE_DEADLINE_SECS),
        }
    }

    async fn dispatch(&self, request: &OperationRequest) -> Result<OpOutput> {
        self.validate_envelope(request)?;
        match request {
            OperationRequest::CreateTable(req) => self.create_table(req).await,
            OperationRequest::Write(req) => self.write(req).await,
            OperationRequest::Query(req) => self.query(req).await,
            OperationRequest::Update(req) => self.update(req).await,
            OperationRequest::Delete(req) => self.delete(req).await,
            OperationRequest::HardDelete(req) => self.hard_delete(req).await,
            OperationRequest::ListTables(req) => self.list_tables(req).await,
            OperationRequest::DescribeTable(req) => self.describe(req).await,
            OperationRequest::Compact(req) => self.compact(req).await,
        }
    }

    fn validate_envelope(&self, request: &OperationRequest) -> Result<()> {
        let (tenant, namespace, table) = match request {
            OperationRequest::CreateTable(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::Write(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::Query(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::Update(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::Delete(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::HardDelete(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::ListTables(r) => (&r.tenant_id, &r.namespace, None),
            OperationRequest::DescribeTable(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
            OperationRequest::Compact(r) => (&r.tenant_id, &r.namespace, Some(&r.table)),
        };
        validate_identifier("tenant_id", tenant.as_str())?;
        validate_identifier("namespace", namespace.as_str())?;
        if let Some(table) = table {
            validate_identifier("table", table.as_str())?;
        }
        Ok(())
    }

    /// Resolve through the metadata cache. Read paths only; mutating
    /// operations resolve fresh so the cache never sits on the correctness
    /// path.
    async fn resolve_cached(&self, ident: &TableIdent) -> Result<(ResolvedTable, bool)> {
        if let Some(hit) = self.cache.get(ident) {
            return Ok((hit, true));
        }
        let resolved = self.catalog.resolve(ident).await.map_err(EngineError::from)?;
        self.cache.insert(resolved.clone());
        Ok((resolved, false))
    }

    async fn resolve_fresh(&self, ident: &TableIdent) -> Result<ResolvedTable> {
        self.catalog.resolve(ident).await.map_err(EngineError::from)
    }

    /// Refresh process-local state after a successful commit.
    fn after_commit(&self, resolved: &ResolvedTable) {
        self.cache.invalidate(&resolved.ident);
        self.cache.insert(resolved.clone());
    }

    async fn create_table(&self, req: &CreateTableRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let schema = map_user_schema(&req.schema)?;
        let location = format!(
            "{}/{}/{}",
            self.settings.s3.warehouse_path,
            ident.physical_namespace(),
            ident.table().as_str()
        );
        let metadata = TableMetadata::new(location, schema, req.properties.clone());

        match self.catalog.create_table(&ident, metadata).await {
            Ok(resolved) => {
                self.after_commit(&resolved);
                Ok(OpOutput::data(json!({
                    "table_created": true,
                    "table_existed": false
                })))
            }
            Err(CatalogError::AlreadyExists(_)) if req.if_not_exists => {
                Ok(OpOutput::data(json!({
                    "table_created": false,
                    "table_existed": true
                })))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, req: &WriteRequest) -> Result<OpOutput> {
        if req.records.len() > self.settings.performance.batch_size {
            return Err(EngineError::ResourceExhausted(format!(
                "batch of {} records exceeds the limit of {}",
                req.records.len(),
                self.settings.performance.batch_size
            )));
        }
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let resolved = self.resolve_fresh(&ident).await?;
        if req.records.is_empty() {
            return Ok(OpOutput::data(json!({ "records_written": 0 })));
        }

        let enriched = enrich_for_write(
            &resolved.metadata.schema,
            &req.records,
            &req.tenant_id,
            Utc::now(),
        )?;
        let schema_ref = arrow_schema(&resolved.metadata.schema);
        let batch = rows_to_batch(&schema_ref, &enriched)?;
        let files = self
            .writer
            .write_data_files(
                &resolved.metadata.location,
                &batch,
                self.settings.table.write.target_file_size_mb,
            )
            .await?;
        let committed = self.writer.commit_append(&ident, files).await?;
        self.after_commit(&committed);

        let hint = self.opportunistic_check(&ident, &committed);
        Ok(OpOutput {
            data: json!({ "records_written": enriched.len() }),
            metadata: None,
            compaction_hint: hint,
        })
    }

    /// Advisory small-file check on every Nth successful write per table.
    /// Pure bookkeeping over the just-committed file list; never touches
    /// storage and never delays the write it rides on.
    fn opportunistic_check(
        &self,
        ident: &TableIdent,
        committed: &ResolvedTable,
    ) -> Option<(bool, usize)> {
        let policy = self.settings.compaction_policy();
        let count = {
            let mut counter = self.write_counters.entry(ident.qualified_name()).or_insert(0);
            *counter += 1;
            *counter
        };
        if count % policy.opportunistic_check_interval != 0 {
            return None;
        }
        let files = committed.metadata.current_files();
        let small = small_file_count(&files, policy.small_file_threshold_mb * 1024 * 1024);
        let recommended = small >= policy.min_files_to_compact;
        if recommended {
            log::info!(
                "compaction recommended for {}: {} small files",
                ident,
                small
            );
        }
        Some((recommended, small))
    }

    async fn query(&self, req: &QueryRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let (resolved, cache_hit) = self.resolve_cached(&ident).await?;
        let output = run_query(
            &self.store,
            &resolved,
            req,
            &self.settings.engine,
            cache_hit,
        )
        .await?;
        Ok(OpOutput {
            data: json!({ "records": output.rows }),
            metadata: Some(output.metadata),
            compaction_hint: None,
        })
    }

    async fn update(&self, req: &UpdateRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let resolved = self.resolve_fresh(&ident).await?;
        let outcome = mvcc::update(
            &self.store,
            &self.writer,
            &resolved,
            &req.filters,
            &req.updates,
            &self.settings.engine,
            self.settings.table.write.target_file_size_mb,
        )
        .await?;
        if outcome.records_updated > 0 {
            self.after_commit(&outcome.resolved);
        }
        Ok(OpOutput::data(
            json!({ "records_updated": outcome.records_updated }),
        ))
    }

    async fn delete(&self, req: &DeleteRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let resolved = self.resolve_fresh(&ident).await?;
        let outcome = mvcc::soft_delete(
            &self.store,
            &self.writer,
            &resolved,
            &req.filters,
            &self.settings.engine,
            self.settings.table.write.target_file_size_mb,
        )
        .await?;
        if outcome.records_updated > 0 {
            self.after_commit(&outcome.resolved);
        }
        Ok(OpOutput::data(
            json!({ "records_deleted": outcome.records_updated }),
        ))
    }

    async fn hard_delete(&self, req: &HardDeleteRequest) -> Result<OpOutput> {
        if !req.confirm {
            return Err(EngineError::ConfirmationRequired(
                "hard delete is irreversible and requires confirm=true".to_string(),
            ));
        }
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let resolved = self.resolve_fresh(&ident).await?;
        let outcome = mvcc::hard_delete(
            &self.store,
            &self.writer,
            &resolved,
            &req.filters,
            &self.settings.engine,
            self.settings.table.write.target_file_size_mb,
        )
        .await?;

        let mut snapshots_expired = 0;
        if outcome.records_deleted > 0 {
            self.after_commit(&outcome.resolved);
            if req.expire_snapshots {
                // Erased rows must not be reachable through time travel.
                snapshots_expired = self
                    .catalog
                    .expire_snapshots(&ident, Utc::now().timestamp_millis() + 1)
                    .await
                    .map_err(EngineError::from)?;
                self.cache.invalidate(&ident);
                // With the history gone nothing references the replaced
                // files; remove the erased bytes from storage as well.
                self.writer.discard_files(&outcome.replaced_files).await;
            }
        }
        Ok(OpOutput::data(json!({
            "records_deleted": outcome.records_deleted,
            "files_rewritten": outcome.files_rewritten,
            "snapshots_expired": snapshots_expired
        })))
    }

    async fn list_tables(&self, req: &ListTablesRequest) -> Result<OpOutput> {
        let tables = self
            .catalog
            .list_tables(&req.tenant_id, &req.namespace)
            .await
            .map_err(EngineError::from)?;
        Ok(OpOutput::data(json!({ "tables": tables })))
    }

    async fn describe(&self, req: &DescribeTableRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let (resolved, _) = self.resolve_cached(&ident).await?;
        let description = describe_table(&self.store, &resolved).await?;
        Ok(OpOutput::data(json!({ "table": description })))
    }

    async fn compact(&self, req: &CompactRequest) -> Result<OpOutput> {
        let ident = table_ident(&req.tenant_id, &req.namespace, &req.table);
        let outcome = self.compactor.compact(&ident, req).await?;
        if let Some(resolved) = &outcome.resolved {
            self.after_commit(resolved);
        }
        let mut data = json!({ "compacted": outcome.compacted });
        if let Some(reason) = outcome.reason {
            data["reason"] = Value::String(reason);
        }
        if let Some(stats) = outcome.stats {
            data["stats"] = serde_json::to_value(stats)?;
        }
        Ok(OpOutput::data(data))
    }

    /// Metadata cache statistics, exposed for observability endpoints.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hit_count(), self.cache.miss_count())
    }
}
