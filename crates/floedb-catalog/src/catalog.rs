//! Catalog adapter trait.
//!
//! The engine never depends on a specific catalog implementation; it sees
//! only the capabilities below. Writers serialize on `commit`, which is the
//! single atomic step of every data-mutating operation.

use crate::error::Result;
use crate::metadata::TableMetadata;
use async_trait::async_trait;
use floedb_commons::{Namespace, TableIdent, TenantId};

/// A resolved table: the current metadata pointer plus its content.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub ident: TableIdent,
    /// The object address the catalog currently maps the table to.
    pub metadata_location: String,
    pub metadata: TableMetadata,
}

/// Catalog capabilities the engine relies on.
///
/// `commit` must be an atomic swap of the metadata pointer: of two
/// concurrent commits against the same base, exactly one succeeds and the
/// other observes `CommitConflict`.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve the current metadata location for a table.
    async fn resolve(&self, ident: &TableIdent) -> Result<ResolvedTable>;

    /// Register a new table. Fails with `AlreadyExists` when present.
    async fn create_table(
        &self,
        ident: &TableIdent,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable>;

    /// Remove a table and its metadata chain.
    async fn drop_table(&self, ident: &TableIdent) -> Result<()>;

    /// Table names in the tenant's physical namespace. An absent namespace
    /// yields an empty list.
    async fn list_tables(&self, tenant: &TenantId, namespace: &Namespace) -> Result<Vec<String>>;

    /// Atomically advance the metadata pointer from `base` to `metadata`.
    async fn commit(
        &self,
        ident: &TableIdent,
        base: &ResolvedTable,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable>;

    /// Expire snapshots committed before `older_than_ms`. Returns how many
    /// were removed.
    async fn expire_snapshots(&self, ident: &TableIdent, older_than_ms: i64) -> Result<usize>;
}
