//! Writer.
//!
//! Appends a physically-typed row batch as one or more Parquet data files
//! and commits a new snapshot through the catalog. Data-file writes proceed
//! without coordination; only the catalog commit serializes. On commit
//! conflict the writer re-resolves the table and re-commits the same files,
//! bounded by the configured retry budget.

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use floedb_catalog::error::CatalogError;
use floedb_catalog::metadata::DataFile;
use floedb_catalog::{Catalog, ResolvedTable};
use floedb_commons::settings::EngineSettings;
use floedb_commons::{EngineError, Result, TableIdent};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const RETRY_BACKOFF_BASE_MS: u64 = 50;

pub struct Writer {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    settings: EngineSettings,
}

impl Writer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    /// Write `batch` under `{table_location}/data/` as one or more files,
    /// splitting so no file exceeds the target size.
    pub async fn write_data_files(
        &self,
        table_location: &str,
        batch: &RecordBatch,
        target_file_size_mb: u64,
    ) -> Result<Vec<DataFile>> {
        if batch.num_rows() == 0 {
            return Ok(Vec::new());
        }
        let target_bytes = target_file_size_mb.max(1) as usize * 1024 * 1024;
        let encoded = self.encode_parquet(batch)?;
        let chunks = plan_splits(encoded.len(), target_bytes, batch.num_rows());

        let mut files = Vec::with_capacity(chunks);
        if chunks == 1 {
            files.push(self.put_data_file(table_location, encoded, batch.num_rows()).await?);
        } else {
            let rows_per_chunk = batch.num_rows().div_ceil(chunks);
            let mut offset = 0;
            while offset < batch.num_rows() {
                let length = rows_per_chunk.min(batch.num_rows() - offset);
                let slice = batch.slice(offset, length);
                let encoded = self.encode_parquet(&slice)?;
                files.push(self.put_data_file(table_location, encoded, length).await?);
                offset += length;
            }
        }
        Ok(files)
    }

    /// Commit an append snapshot, retrying on conflict with exponential
    /// backoff. Each attempt re-resolves the table so the new snapshot
    /// builds on whoever won the previous round.
    pub async fn commit_append(
        &self,
        ident: &TableIdent,
        files: Vec<DataFile>,
    ) -> Result<ResolvedTable> {
        let max_retries = self.settings.performance.max_retries;
        for attempt in 0..=max_retries {
            let current = self.catalog.resolve(ident).await.map_err(EngineError::from)?;
            let next = current.metadata.with_appended(files.clone());
            match self.catalog.commit(ident, &current, next).await {
                Ok(resolved) => return Ok(resolved),
                Err(e) if e.is_conflict() && attempt < max_retries => {
                    let backoff = Duration::from_millis(RETRY_BACKOFF_BASE_MS << attempt);
                    log::warn!(
                        "commit conflict on {} (attempt {}/{}), retrying in {:?}",
                        ident,
                        attempt + 1,
                        max_retries + 1,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_conflict() => {
                    return Err(EngineError::WriteConflict(format!(
                        "commit on {} failed after {} attempts",
                        ident,
                        max_retries + 1
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("retry loop always returns")
    }

    /// Single-attempt overwrite commit against a known base. Callers that
    /// can rebuild their file set (compaction, hard delete) own the retry.
    pub async fn commit_overwrite(
        &self,
        base: &ResolvedTable,
        files: Vec<DataFile>,
    ) -> std::result::Result<ResolvedTable, CatalogError> {
        let next = base.metadata.with_overwritten(files);
        self.catalog.commit(&base.ident, base, next).await
    }

    /// Delete freshly written files after a failed commit; orphans left
    /// behind here are cleaned by later compaction or external GC.
    pub async fn discard_files(&self, files: &[DataFile]) {
        for file in files {
            if let Err(e) = self.store.delete(&Path::from(file.path.as_str())).await {
                log::warn!("failed to discard '{}': {}", file.path, e);
            }
        }
    }

    async fn put_data_file(
        &self,
        table_location: &str,
        encoded: Vec<u8>,
        rows: usize,
    ) -> Result<DataFile> {
        let path = format!("{}/data/part-{}.parquet", table_location, Uuid::new_v4());
        let size = encoded.len() as u64;
        self.store
            .put(&Path::from(path.as_str()), PutPayload::from(Bytes::from(encoded)))
            .await
            .map_err(|e| EngineError::internal(format!("write '{}': {}", path, e)))?;
        log::debug!("wrote data file {} ({} rows, {} bytes)", path, rows, size);
        Ok(DataFile {
            path,
            file_size_bytes: size,
            record_count: rows as u64,
        })
    }

    fn encode_parquet(&self, batch: &RecordBatch) -> Result<Vec<u8>> {
        let props = WriterProperties::builder()
            .set_compression(self.compression())
            .set_max_row_group_size(self.settings.table.write.row_group_size)
            .build();
        let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props))
            .map_err(|e| EngineError::internal(format!("parquet writer: {}", e)))?;
        writer
            .write(batch)
            .map_err(|e| EngineError::internal(format!("parquet write: {}", e)))?;
        writer
            .into_inner()
            .map_err(|e| EngineError::internal(format!("parquet finish: {}", e)))
    }

    fn compression(&self) -> Compression {
        match self
            .settings
            .table
            .write
            .compression_codec
            .to_ascii_lowercase()
            .as_str()
        {
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "uncompressed" | "none" => Compression::UNCOMPRESSED,
            other => {
                log::warn!("unknown compression codec '{}', using zstd", other);
                Compression::ZSTD(ZstdLevel::default())
            }
        }
    }
}

/// Number of output files for an encoded batch of `encoded_len` bytes with
/// the given per-file target.
fn plan_splits(encoded_len: usize, target_bytes: usize, rows: usize) -> usize {
    if encoded_len <= target_bytes || rows <= 1 {
        return 1;
    }
    encoded_len.div_ceil(target_bytes).min(rows)
}
