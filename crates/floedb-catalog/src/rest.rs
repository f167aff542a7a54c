//! REST catalog adapter.
//!
//! Speaks a JSON protocol shaped like the Iceberg REST catalog API: tables
//! are addressed as `/v1/namespaces/{namespace}/tables/{table}`, commits
//! carry the base metadata location as a requirement, and the server answers
//! 409 when the pointer moved underneath the committer.

use crate::catalog::{Catalog, ResolvedTable};
use crate::error::{CatalogError, Result};
use crate::metadata::TableMetadata;
use async_trait::async_trait;
use floedb_commons::{ids::physical_namespace, Namespace, TableIdent, TenantId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Catalog client for a REST catalog service.
pub struct RestCatalog {
    http: reqwest::Client,
    base_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadTableResponse {
    #[serde(rename = "metadata-location")]
    metadata_location: String,
    metadata: TableMetadata,
}

#[derive(Debug, Serialize)]
struct CreateTableBody<'a> {
    name: &'a str,
    metadata: &'a TableMetadata,
}

#[derive(Debug, Serialize)]
struct CommitTableBody<'a> {
    #[serde(rename = "base-metadata-location")]
    base_metadata_location: &'a str,
    metadata: &'a TableMetadata,
}

#[derive(Debug, Deserialize)]
struct ListTablesResponse {
    #[serde(default)]
    identifiers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateNamespaceBody<'a> {
    namespace: &'a str,
}

impl RestCatalog {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
        }
    }

    fn table_url(&self, ident: &TableIdent) -> String {
        format!(
            "{}/v1/namespaces/{}/tables/{}",
            self.base_uri,
            ident.physical_namespace(),
            ident.table().as_str()
        )
    }

    fn namespace_url(&self, physical_ns: &str) -> String {
        format!("{}/v1/namespaces/{}", self.base_uri, physical_ns)
    }

    /// Create the physical namespace, tolerating one that already exists.
    async fn ensure_namespace(&self, physical_ns: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/v1/namespaces", self.base_uri))
            .json(&CreateNamespaceBody { namespace: physical_ns })
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::CONFLICT => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(CatalogError::Http(format!(
                "namespace creation returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl Catalog for RestCatalog {
    async fn resolve(&self, ident: &TableIdent) -> Result<ResolvedTable> {
        let response = self
            .http
            .get(self.table_url(ident))
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(ident.qualified_name())),
            status if status.is_success() => {
                let body: LoadTableResponse = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::Http(e.to_string()))?;
                Ok(ResolvedTable {
                    ident: ident.clone(),
                    metadata_location: body.metadata_location,
                    metadata: body.metadata,
                })
            }
            status => Err(CatalogError::Http(format!("load table returned {}", status))),
        }
    }

    async fn create_table(
        &self,
        ident: &TableIdent,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable> {
        let physical_ns = ident.physical_namespace();
        self.ensure_namespace(&physical_ns).await?;
        let response = self
            .http
            .post(format!("{}/tables", self.namespace_url(&physical_ns)))
            .json(&CreateTableBody {
                name: ident.table().as_str(),
                metadata: &metadata,
            })
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::CONFLICT => Err(CatalogError::AlreadyExists(ident.qualified_name())),
            status if status.is_success() => {
                let body: LoadTableResponse = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::Http(e.to_string()))?;
                Ok(ResolvedTable {
                    ident: ident.clone(),
                    metadata_location: body.metadata_location,
                    metadata: body.metadata,
                })
            }
            status => Err(CatalogError::Http(format!(
                "create table returned {}",
                status
            ))),
        }
    }

    async fn drop_table(&self, ident: &TableIdent) -> Result<()> {
        let response = self
            .http
            .delete(self.table_url(ident))
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(ident.qualified_name())),
            status if status.is_success() => Ok(()),
            status => Err(CatalogError::Http(format!("drop table returned {}", status))),
        }
    }

    async fn list_tables(&self, tenant: &TenantId, namespace: &Namespace) -> Result<Vec<String>> {
        let physical_ns = physical_namespace(tenant, namespace);
        let response = self
            .http
            .get(format!("{}/tables", self.namespace_url(&physical_ns)))
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            // An absent namespace is an empty listing, not an error.
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let body: ListTablesResponse = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::Http(e.to_string()))?;
                Ok(body.identifiers)
            }
            status => Err(CatalogError::Http(format!(
                "list tables returned {}",
                status
            ))),
        }
    }

    async fn commit(
        &self,
        ident: &TableIdent,
        base: &ResolvedTable,
        metadata: TableMetadata,
    ) -> Result<ResolvedTable> {
        let response = self
            .http
            .post(format!("{}/commit", self.table_url(ident)))
            .json(&CommitTableBody {
                base_metadata_location: &base.metadata_location,
                metadata: &metadata,
            })
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::CONFLICT => Err(CatalogError::CommitConflict(format!(
                "{}: pointer moved past {}",
                ident.qualified_name(),
                base.metadata_location
            ))),
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(ident.qualified_name())),
            status if status.is_success() => {
                let body: LoadTableResponse = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::Http(e.to_string()))?;
                Ok(ResolvedTable {
                    ident: ident.clone(),
                    metadata_location: body.metadata_location,
                    metadata: body.metadata,
                })
            }
            status => Err(CatalogError::Http(format!("commit returned {}", status))),
        }
    }

    async fn expire_snapshots(&self, ident: &TableIdent, older_than_ms: i64) -> Result<usize> {
        // Expiry is a plain read-modify-commit round through the same
        // endpoints; the server only arbitrates the pointer swap.
        let current = self.resolve(ident).await?;
        let (next, expired) = current.metadata.with_expired_snapshots(older_than_ms);
        if expired == 0 {
            return Ok(0);
        }
        self.commit(ident, &current, next).await?;
        Ok(expired)
    }
}
