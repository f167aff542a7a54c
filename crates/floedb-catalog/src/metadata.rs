//! Table-format metadata model.
//!
//! One JSON metadata object describes a table: schema with field ids,
//! properties, and the snapshot history. Every snapshot materializes its
//! full data-file list, so resolving any snapshot never requires walking the
//! chain. Metadata objects are immutable; a commit writes a new versioned
//! object and swaps the catalog pointer.

use chrono::Utc;
use floedb_commons::schema::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const METADATA_FORMAT_VERSION: u32 = 1;

/// A single immutable Parquet data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Object path relative to the store root.
    pub path: String,
    pub file_size_bytes: u64,
    pub record_count: u64,
}

/// How a snapshot relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOperation {
    Append,
    Overwrite,
}

/// Immutable logical view of the table at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    pub operation: SnapshotOperation,
    /// Complete data-file list of this snapshot.
    pub files: Vec<DataFile>,
}

impl Snapshot {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.file_size_bytes).sum()
    }

    pub fn total_records(&self) -> u64 {
        self.files.iter().map(|f| f.record_count).sum()
    }
}

/// Root metadata object for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub format_version: u32,
    pub table_uuid: String,
    /// Table root under the warehouse, e.g. `warehouse/acme_sales/orders`.
    pub location: String,
    pub schema: TableSchema,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub current_snapshot_id: Option<i64>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    pub last_updated_ms: i64,
}

impl TableMetadata {
    pub fn new(location: String, schema: TableSchema, properties: HashMap<String, String>) -> Self {
        Self {
            format_version: METADATA_FORMAT_VERSION,
            table_uuid: uuid::Uuid::new_v4().to_string(),
            location,
            schema,
            properties,
            current_snapshot_id: None,
            snapshots: Vec::new(),
            last_updated_ms: Utc::now().timestamp_millis(),
        }
    }

    /// The current snapshot, if the table has ever been written to.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let id = self.current_snapshot_id?;
        self.snapshots.iter().find(|s| s.snapshot_id == id)
    }

    /// Data files of the current snapshot (empty for a fresh table).
    pub fn current_files(&self) -> Vec<DataFile> {
        self.current_snapshot()
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    /// Snapshot visible at `timestamp_ms`: the one with the greatest commit
    /// time ≤ the requested time. `None` when the time predates the table.
    pub fn snapshot_as_of(&self, timestamp_ms: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.timestamp_ms <= timestamp_ms)
            .max_by_key(|s| (s.timestamp_ms, s.snapshot_id))
    }

    fn next_snapshot_id(&self) -> i64 {
        self.snapshots
            .iter()
            .map(|s| s.snapshot_id)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Produce the successor metadata with an appended snapshot: the new
    /// file list is the current list plus `new_files`.
    pub fn with_appended(&self, new_files: Vec<DataFile>) -> Self {
        let mut files: Vec<DataFile> = self
            .current_snapshot()
            .map(|s| s.files.clone())
            .unwrap_or_default();
        files.extend(new_files);
        self.with_snapshot(SnapshotOperation::Append, files)
    }

    /// Produce the successor metadata with an overwrite snapshot whose file
    /// list fully replaces the current one.
    pub fn with_overwritten(&self, files: Vec<DataFile>) -> Self {
        self.with_snapshot(SnapshotOperation::Overwrite, files)
    }

    fn with_snapshot(&self, operation: SnapshotOperation, files: Vec<DataFile>) -> Self {
        let mut next = self.clone();
        let snapshot_id = next.next_snapshot_id();
        let now_ms = Utc::now().timestamp_millis();
        next.snapshots.push(Snapshot {
            snapshot_id,
            timestamp_ms: now_ms,
            operation,
            files,
        });
        next.current_snapshot_id = Some(snapshot_id);
        next.last_updated_ms = now_ms;
        next
    }

    /// Drop snapshots committed before `older_than_ms`, never the current
    /// one. Returns the successor metadata and the number expired.
    pub fn with_expired_snapshots(&self, older_than_ms: i64) -> (Self, usize) {
        let mut next = self.clone();
        let before = next.snapshots.len();
        let current = next.current_snapshot_id;
        next.snapshots
            .retain(|s| Some(s.snapshot_id) == current || s.timestamp_ms >= older_than_ms);
        let expired = before - next.snapshots.len();
        if expired > 0 {
            next.last_updated_ms = Utc::now().timestamp_millis();
        }
        (next, expired)
    }
}
