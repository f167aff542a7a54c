//! Engine settings.
//!
//! Deserialized from the `config.toml` sections the engine recognizes. Every
//! field carries a serde default so a partial (or missing) file still yields
//! a working configuration. The `environment` profile selects compaction
//! policy defaults for options the operator did not set explicitly.

use serde::{Deserialize, Serialize};

/// Named configuration profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

/// Catalog variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogType {
    Rest,
    /// Storage-managed catalog: metadata pointer kept in the warehouse itself.
    #[default]
    Warehouse,
}

/// Object storage endpoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Settings {
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,
    #[serde(default = "default_warehouse_path")]
    pub warehouse_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    #[serde(default)]
    pub path_style_access: bool,
}

/// Catalog connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(rename = "type", default)]
    pub catalog_type: CatalogType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
}

/// Scan executor limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSettings {
    /// Memory limit for query execution in bytes (default: 1 GiB).
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    /// Number of threads for query execution (default: 2).
    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// Retry, timeout and batching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Commit/IO retry budget (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Read deadline in milliseconds (default: 30000).
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Maximum records accepted in a single WRITE batch (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Metadata cache TTL in milliseconds (default: 5000).
    #[serde(default = "default_metadata_cache_ttl_ms")]
    pub metadata_cache_ttl_ms: u64,
}

/// Writer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSettings {
    /// Target data file size in MiB (default: 128).
    #[serde(default = "default_target_file_size_mb")]
    pub target_file_size_mb: u64,
    /// Parquet compression codec (default: zstd).
    #[serde(default = "default_compression_codec")]
    pub compression_codec: String,
    /// Parquet row group size in rows (default: 65536).
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

/// Compaction policy knobs. Options left unset fall back to the
/// environment profile via [`EngineSettings::compaction_policy`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_file_threshold_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_files_to_compact: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunistic_check_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files_per_compaction: Option<usize>,
}

/// Per-table tuning sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSettings {
    #[serde(default)]
    pub write: WriteSettings,
    #[serde(default)]
    pub compaction: CompactionSettings,
}

/// Fully resolved compaction policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    pub small_file_threshold_mb: u64,
    pub min_files_to_compact: usize,
    pub opportunistic_check_interval: u64,
    pub max_files_per_compaction: usize,
}

/// All settings recognized by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub s3: S3Settings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub engine: ExecSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
    #[serde(default)]
    pub table: TableSettings,
}

impl EngineSettings {
    /// Resolve the compaction policy, filling unset options from the
    /// environment profile (dev/staging/prod).
    pub fn compaction_policy(&self) -> CompactionPolicy {
        let (interval, min_files) = match self.environment {
            Environment::Dev => (5, 3),
            Environment::Staging => (75, 15),
            Environment::Prod => (100, 20),
        };
        let c = &self.table.compaction;
        CompactionPolicy {
            small_file_threshold_mb: c.small_file_threshold_mb.unwrap_or(64),
            min_files_to_compact: c.min_files_to_compact.unwrap_or(min_files),
            opportunistic_check_interval: c.opportunistic_check_interval.unwrap_or(interval),
            max_files_per_compaction: c.max_files_per_compaction.unwrap_or(100),
        }
    }
}

fn default_bucket_name() -> String {
    "floedb".to_string()
}

fn default_warehouse_path() -> String {
    "warehouse".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_memory_limit() -> usize {
    1024 * 1024 * 1024
}

fn default_threads() -> usize {
    2
}

fn default_max_retries() -> usize {
    3
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    10_000
}

fn default_metadata_cache_ttl_ms() -> u64 {
    5_000
}

fn default_target_file_size_mb() -> u64 {
    128
}

fn default_compression_codec() -> String {
    "zstd".to_string()
}

fn default_row_group_size() -> usize {
    65_536
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket_name: default_bucket_name(),
            warehouse_path: default_warehouse_path(),
            endpoint: None,
            region: default_region(),
            use_ssl: true,
            path_style_access: false,
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            catalog_type: CatalogType::default(),
            uri: None,
            region: default_region(),
        }
    }
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            memory_limit: default_memory_limit(),
            threads: default_threads(),
        }
    }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            query_timeout_ms: default_query_timeout_ms(),
            batch_size: default_batch_size(),
            metadata_cache_ttl_ms: default_metadata_cache_ttl_ms(),
        }
    }
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            target_file_size_mb: default_target_file_size_mb(),
            compression_codec: default_compression_codec(),
            row_group_size: default_row_group_size(),
        }
    }
}
