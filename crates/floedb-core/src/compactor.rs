//! Compaction.
//!
//! Many small append commits accumulate many small data files, degrading
//! scan performance. The compactor selects files below the small-file
//! threshold, reads every row they hold (all versions, tombstones included),
//! rewrites them bin-packed to the target size and commits an overwrite
//! snapshot. Old files stay live until the atomic metadata swap, so a
//! failure never leaves dangling pointers. On a commit race the rewritten
//! files are discarded and the whole procedure reruns against the winner.

use crate::scan::{concat_all, read_files};
use crate::schema_mapper::arrow_schema;
use crate::writer::Writer;
use chrono::{Duration as ChronoDuration, Utc};
use floedb_catalog::metadata::DataFile;
use floedb_catalog::{Catalog, ResolvedTable};
use floedb_commons::protocol::{CompactRequest, CompactionStats};
use floedb_commons::settings::EngineSettings;
use floedb_commons::{EngineError, Result, TableIdent};
use object_store::ObjectStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_SNAPSHOT_RETENTION_HOURS: u64 = 168;

pub struct CompactOutcome {
    pub compacted: bool,
    pub reason: Option<String>,
    pub stats: Option<CompactionStats>,
    pub resolved: Option<ResolvedTable>,
}

impl CompactOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            compacted: false,
            reason: Some(reason.into()),
            stats: None,
            resolved: None,
        }
    }
}

/// Count data files below the small-file threshold.
pub fn small_file_count(files: &[DataFile], threshold_bytes: u64) -> usize {
    files
        .iter()
        .filter(|f| f.file_size_bytes < threshold_bytes)
        .count()
}

pub struct Compactor {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    writer: Writer,
    settings: EngineSettings,
}

impl Compactor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        settings: EngineSettings,
    ) -> Self {
        let writer = Writer::new(store.clone(), catalog.clone(), settings.clone());
        Self {
            store,
            catalog,
            writer,
            settings,
        }
    }

    pub async fn compact(
        &self,
        ident: &TableIdent,
        request: &CompactRequest,
    ) -> Result<CompactOutcome> {
        let started = Instant::now();
        let policy = self.settings.compaction_policy();
        let threshold_bytes = policy.small_file_threshold_mb * 1024 * 1024;
        let target_file_size_mb = request
            .target_file_size_mb
            .unwrap_or(self.settings.table.write.target_file_size_mb);
        let max_files = request.max_files.unwrap_or(policy.max_files_per_compaction);
        let max_attempts = self.settings.performance.max_retries + 1;

        for attempt in 0..max_attempts {
            let resolved = self
                .catalog
                .resolve(ident)
                .await
                .map_err(EngineError::from)?;
            let files = resolved.metadata.current_files();
            if files.is_empty() {
                return Ok(CompactOutcome::skipped("no files to compact"));
            }

            let mut small: Vec<DataFile> = files
                .iter()
                .filter(|f| f.file_size_bytes < threshold_bytes)
                .filter(|f| match &request.partition_filter {
                    Some(prefix) => f.path.starts_with(prefix.as_str()),
                    None => true,
                })
                .cloned()
                .collect();
            if !request.force && small.len() < policy.min_files_to_compact {
                return Ok(CompactOutcome::skipped(format!(
                    "only {} small files (threshold: {})",
                    small.len(),
                    policy.min_files_to_compact
                )));
            }
            small.truncate(max_files);
            if small.is_empty() {
                return Ok(CompactOutcome::skipped("no files selected"));
            }

            log::info!(
                "compacting {} of {} files in {}",
                small.len(),
                files.len(),
                ident
            );

            // Compaction preserves every version and every tombstone; the
            // row set before and after must be identical.
            let scan = read_files(&self.store, &small).await?;
            let schema_ref = arrow_schema(&resolved.metadata.schema);
            let combined = concat_all(&schema_ref, &scan.batches)?;
            let new_files = self
                .writer
                .write_data_files(&resolved.metadata.location, &combined, target_file_size_mb)
                .await?;

            let selected: HashSet<&str> = small.iter().map(|f| f.path.as_str()).collect();
            let mut file_list: Vec<DataFile> = files
                .iter()
                .filter(|f| !selected.contains(f.path.as_str()))
                .cloned()
                .collect();
            file_list.extend(new_files.clone());

            match self.writer.commit_overwrite(&resolved, file_list.clone()).await {
                Ok(committed) => {
                    let snapshots_expired = if request.expire_snapshots {
                        self.expire_snapshots(ident, request).await
                    } else {
                        0
                    };
                    let bytes_before: u64 = files.iter().map(|f| f.file_size_bytes).sum();
                    let bytes_after: u64 = file_list.iter().map(|f| f.file_size_bytes).sum();
                    let stats = CompactionStats {
                        files_before: files.len(),
                        files_after: file_list.len(),
                        files_compacted: small.len(),
                        files_removed: files.len() as i64 - file_list.len() as i64,
                        bytes_before,
                        bytes_after,
                        bytes_saved: bytes_before as i64 - bytes_after as i64,
                        snapshots_expired,
                        compaction_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                        small_files_remaining: small_file_count(&file_list, threshold_bytes),
                    };
                    log::info!(
                        "compaction of {} complete: {} -> {} files, {} bytes saved",
                        ident,
                        stats.files_before,
                        stats.files_after,
                        stats.bytes_saved
                    );
                    return Ok(CompactOutcome {
                        compacted: true,
                        reason: None,
                        stats: Some(stats),
                        resolved: Some(committed),
                    });
                }
                Err(e) if e.is_conflict() && attempt + 1 < max_attempts => {
                    log::warn!(
                        "compaction of {} lost the commit race (attempt {}/{}), rerunning",
                        ident,
                        attempt + 1,
                        max_attempts
                    );
                    self.writer.discard_files(&new_files).await;
                }
                Err(e) if e.is_conflict() => {
                    self.writer.discard_files(&new_files).await;
                    return Err(EngineError::WriteConflict(format!(
                        "compaction of {} failed after {} attempts",
                        ident, max_attempts
                    )));
                }
                Err(e) => {
                    self.writer.discard_files(&new_files).await;
                    return Err(e.into());
                }
            }
        }
        unreachable!("compaction loop always returns")
    }

    async fn expire_snapshots(&self, ident: &TableIdent, request: &CompactRequest) -> usize {
        let retention_hours = request
            .snapshot_retention_hours
            .unwrap_or(DEFAULT_SNAPSHOT_RETENTION_HOURS);
        let cutoff = Utc::now() - ChronoDuration::hours(retention_hours as i64);
        match self
            .catalog
            .expire_snapshots(ident, cutoff.timestamp_millis())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                // Expiry is housekeeping; a failure must not fail the
                // compaction that already committed.
                log::warn!("snapshot expiry for {} failed: {}", ident, e);
                0
            }
        }
    }
}
