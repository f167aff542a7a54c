//! Storage-managed catalog.
//!
//! Table metadata lives in the warehouse itself as versioned objects:
//!
//! ```text
//! {warehouse}/{physical_namespace}/{table}/metadata/v{N}.metadata.json
//! {warehouse}/{physical_namespace}/{table}/metadata/version-hint.text
//! ```
//!
//! A commit writes `v{N+1}` in create-if-absent mode; the conditional put is
//! the atomic pointer swap, so of two racing committers exactly one wins.
//! The version hint is an optimization only: resolve probes forward from it,
//! so a torn hint write never loses the table.

use crate::catalog::{Catalog, ResolvedTable};
use crate::error::{CatalogError, Result};
use crate::metadata::TableMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use floedb_commons::{Namespace, TableIdent, TenantId};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use std::sync::Arc;

const EXPIRE_COMMIT_ATTEMPTS: usize = 3;

/// Catalog keeping the metadata pointer in object storage.
pub struct WarehouseCatalog {
    store: Arc<dyn ObjectStore>,
    warehouse_path: String,
}

impl WarehouseCatalog {
    pub fn new(store: Arc<dyn ObjectStore>, warehouse_path: impl Into<String>) -> Self {
        Self {
            store,
            warehouse_path: warehouse_path.into(),
        }
    }

    /// Table root under the warehouse.
    pub fn table_location(&self, ident: &TableIdent) -> String {
        format!(
            "{}/{}/{}",
            self.warehouse_path,
            ident.physical_namespace(),
            ident.table().as_str()
        )
    }

    fn metadata_location(&self, ident: &TableIdent, version: u64) -> String {
        format!("{}/metadata/v{}.metadata.json", self.table_location(ident), version)
    }

    fn hint_location(&self, ident: &TableIdent) -> String {
        format!("{}/metadata/version-hint.text", self.table_location(ident))
    }

    /// Extract `N` from `.../metadata/v{N}.metadata.json`.
    fn parse_metadata_version(location: &str) -> Result<u64> {
        location
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_prefix('v'))
            .and_then(|name| name.strip_suffix(".metadata.json"))
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                CatalogError::other(format!("malformed metadata location '{}'", location))
            })
    }

    async fn read_metadata(&self, location: &str) -> Result<Option<TableMetadata>> {
        match self.store.get(&Path::from(location)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_hint(&self, ident: &TableIdent) -> Result<Option<u64>> {
        match self.store.get(&Path::from(self.hint_location(ident))).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                let text = String::from_utf8_lossy(&bytes);
                Ok(text.trim().parse().ok())
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort pointer update; resolve never depends on it.
    async fn write_hint(&self, ident: &TableIdent, version: u64) {
        let payload = PutPayload::from(version.to_string().into_bytes());
        if let Err(e) = self
            .store
            .put(&Path::from(self.hint_location(ident)), payload)
            .await
        {
            log::warn!("version-hint write failed for {}: {}", ident, e);
        }
    }

    async fn write_metadata(
        &self,
        location: &str,
        metadata: &TableMetadata,
    ) -> Result<()> {
        let body = serde_json::to_vec_pretty(metadata)?;
        let options = PutOptions::from(PutMode::Create);
        match self
            .store
            .put_opts(&Path::from(location), PutPayload::from(Bytes::from(body)), options)
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => Err(CatalogError::CommitConflict(
                format!("metadata object '{}' already written", location),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Catalog for WarehouseCatalog {
    async fn resolve(&self, ident: &TableIdent) -> Result<ResolvedTable> {
        let mut version = self.read_hint(ident).await?.unwrap_or(1).max(1);
        let mut found: Option<(u64, TableMetadata)> = None;
        // Hints trail the latest commit, so probe forward until a miss.
        loop {
            let location = self.metadata_location(ident, version);
            match self.read_metadata(&location).await? {
                Some(metadata) => {
                    found = Some((version, metadata));
                    version += 1;
                }
                None => break,
            }
        }
        match found {
            Some((version, metadata)) => Ok(ResolvedTable {
                ident: ident.clone(),
                metadata_location: self.metadata_location(ident, version),
                metadata,
            }),
            None => Err(CatalogError::NotFound(ident.qualified_name())),
        }
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable> {
        let location = self.metadata_location(ident, 1);
        match self.write_metadata(&location, &metadata).await {
            Ok(()) => {}
            Err(CatalogError::CommitConflict(_)) => {
                return Err(CatalogError::AlreadyExists(ident.qualified_name()))
            }
            Err(e) => return Err(e),
        }
        self.write_hint(ident, 1).await;
        log::info!("created table {} at {}", ident, location);
        Ok(ResolvedTable {
            ident: ident.clone(),
            metadata_location: location,
            metadata,
        })
    }

    async fn drop_table(&self, ident: &TableIdent) -> Result<()> {
        // Verify existence first so a missing table surfaces as NotFound.
        self.resolve(ident).await?;
        let root = Path::from(self.table_location(ident));
        let locations: Vec<Path> = self
            .store
            .list(Some(&root))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;
        for location in locations {
            self.store.delete(&location).await?;
        }
        log::info!("dropped table {}", ident);
        Ok(())
    }

    async fn list_tables(&self, tenant: &TenantId, namespace: &Namespace) -> Result<Vec<String>> {
        let physical_ns = floedb_commons::ids::physical_namespace(tenant, namespace);
        let prefix = Path::from(format!("{}/{}", self.warehouse_path, physical_ns));
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        let mut names: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(|s| s.to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn commit(
        &self,
        ident: &TableIdent,
        base: &ResolvedTable,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable> {
        let base_version = Self::parse_metadata_version(&base.metadata_location)?;
        let next_version = base_version + 1;
        let location = self.metadata_location(ident, next_version);
        self.write_metadata(&location, &metadata).await?;
        self.write_hint(ident, next_version).await;
        log::debug!("committed {} v{}", ident, next_version);
        Ok(ResolvedTable {
            ident: ident.clone(),
            metadata_location: location,
            metadata,
        })
    }

    async fn expire_snapshots(&self, ident: &TableIdent, older_than_ms: i64) -> Result<usize> {
        let mut last_err = None;
        for _ in 0..EXPIRE_COMMIT_ATTEMPTS {
            let current = self.resolve(ident).await?;
            let (next, expired) = current.metadata.with_expired_snapshots(older_than_ms);
            if expired == 0 {
                return Ok(0);
            }
            match self.commit(ident, &current, next).await {
                Ok(_) => return Ok(expired),
                Err(e) if e.is_conflict() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| CatalogError::other("snapshot expiry failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floedb_commons::schema::{FieldType, PrimitiveType, SchemaField, TableSchema};
    use floedb_commons::{TableName, TenantId};
    use object_store::memory::InMemory;
    use std::collections::HashMap;

    fn test_schema() -> TableSchema {
        TableSchema {
            fields: vec![SchemaField {
                id: 1,
                name: "id".into(),
                required: true,
                field_type: FieldType::primitive(PrimitiveType::Long),
            }],
            last_field_id: 1,
        }
    }

    fn ident(table: &str) -> TableIdent {
        TableIdent::new(
            TenantId::new("acme"),
            Namespace::new("sales"),
            TableName::new(table),
        )
    }

    fn catalog() -> WarehouseCatalog {
        WarehouseCatalog::new(Arc::new(InMemory::new()), "warehouse")
    }

    fn new_metadata(cat: &WarehouseCatalog, id: &TableIdent) -> TableMetadata {
        TableMetadata::new(cat.table_location(id), test_schema(), HashMap::new())
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let cat = catalog();
        let id = ident("orders");
        cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();

        let resolved = cat.resolve(&id).await.unwrap();
        assert!(resolved
            .metadata_location
            .ends_with("acme_sales/orders/metadata/v1.metadata.json"));
        assert!(resolved.metadata.current_snapshot().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let cat = catalog();
        let id = ident("orders");
        cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();
        let err = cat
            .create_table(&id, new_metadata(&cat, &id))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_resolve_missing_table() {
        let cat = catalog();
        let err = cat.resolve(&ident("ghost")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_advances_pointer() {
        let cat = catalog();
        let id = ident("orders");
        let base = cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();

        let next = base.metadata.with_appended(vec![]);
        let committed = cat.commit(&id, &base, next).await.unwrap();
        assert!(committed.metadata_location.ends_with("v2.metadata.json"));

        let resolved = cat.resolve(&id).await.unwrap();
        assert_eq!(resolved.metadata_location, committed.metadata_location);
        assert_eq!(resolved.metadata.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflicts() {
        let cat = catalog();
        let id = ident("orders");
        let base = cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();

        let winner = base.metadata.with_appended(vec![]);
        cat.commit(&id, &base, winner).await.unwrap();

        // Second committer still holds the old base
        let loser = base.metadata.with_appended(vec![]);
        let err = cat.commit(&id, &base, loser).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_resolve_survives_stale_hint() {
        let cat = catalog();
        let id = ident("orders");
        let base = cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();
        let next = base.metadata.with_appended(vec![]);
        cat.commit(&id, &base, next).await.unwrap();

        // Clobber the hint back to v1; forward probing must still find v2.
        cat.write_hint(&id, 1).await;
        let resolved = cat.resolve(&id).await.unwrap();
        assert!(resolved.metadata_location.ends_with("v2.metadata.json"));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let cat = catalog();
        for name in ["orders", "customers"] {
            let id = ident(name);
            cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();
        }
        let names = cat
            .list_tables(&TenantId::new("acme"), &Namespace::new("sales"))
            .await
            .unwrap();
        assert_eq!(names, vec!["customers", "orders"]);

        let empty = cat
            .list_tables(&TenantId::new("acme"), &Namespace::new("empty"))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_drop_table() {
        let cat = catalog();
        let id = ident("orders");
        cat.create_table(&id, new_metadata(&cat, &id)).await.unwrap();
        cat.drop_table(&id).await.unwrap();
        assert!(matches!(
            cat.resolve(&id).await.unwrap_err(),
            CatalogError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_filesystem_backed_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> =
            Arc::new(object_store::local::LocalFileSystem::new_with_prefix(dir.path()).unwrap());
        let cat = WarehouseCatalog::new(store, "warehouse");
        let id = ident("orders");

        let base = cat
            .create_table(&id, TableMetadata::new(cat.table_location(&id), test_schema(), HashMap::new()))
            .await
            .unwrap();
        let next = base.metadata.with_appended(vec![]);
        cat.commit(&id, &base, next).await.unwrap();

        let resolved = cat.resolve(&id).await.unwrap();
        assert!(resolved.metadata_location.ends_with("v2.metadata.json"));
        assert!(dir
            .path()
            .join("warehouse/acme_sales/orders/metadata/v2.metadata.json")
            .exists());
    }

    #[test]
    fn test_parse_metadata_version() {
        let v = WarehouseCatalog::parse_metadata_version(
            "warehouse/acme_sales/orders/metadata/v17.metadata.json",
        )
        .unwrap();
        assert_eq!(v, 17);
        assert!(WarehouseCatalog::parse_metadata_version("warehouse/x/y").is_err());
    }
}
