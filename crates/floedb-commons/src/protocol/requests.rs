//! Operation request envelope.
//!
//! Every client request is a single JSON object tagged by `operation`.
//! Request structs keep wire names; identifier validation happens in the
//! dispatcher, not during deserialization.

use crate::ids::{Namespace, TableIdent, TableName, TenantId};
use crate::protocol::filters::{AggregateField, FilterSet, SortField};
use crate::schema::UserSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn default_namespace() -> Namespace {
    Namespace::new("default")
}

/// Tagged operation envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation")]
pub enum OperationRequest {
    #[serde(rename = "CREATE_TABLE")]
    CreateTable(CreateTableRequest),
    #[serde(rename = "WRITE")]
    Write(WriteRequest),
    #[serde(rename = "QUERY")]
    Query(QueryRequest),
    #[serde(rename = "UPDATE")]
    Update(UpdateRequest),
    #[serde(rename = "DELETE")]
    Delete(DeleteRequest),
    #[serde(rename = "HARD_DELETE")]
    HardDelete(HardDeleteRequest),
    #[serde(rename = "LIST_TABLES")]
    ListTables(ListTablesRequest),
    #[serde(rename = "DESCRIBE_TABLE")]
    DescribeTable(DescribeTableRequest),
    #[serde(rename = "COMPACT")]
    Compact(CompactRequest),
}

impl OperationRequest {
    /// Wire name of the operation, for logging.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::CreateTable(_) => "CREATE_TABLE",
            Self::Write(_) => "WRITE",
            Self::Query(_) => "QUERY",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::HardDelete(_) => "HARD_DELETE",
            Self::ListTables(_) => "LIST_TABLES",
            Self::DescribeTable(_) => "DESCRIBE_TABLE",
            Self::Compact(_) => "COMPACT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    pub schema: UserSchema,
    #[serde(default)]
    pub if_not_exists: bool,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    pub records: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub aggregations: Vec<AggregateField>,
    #[serde(default)]
    pub having: FilterSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Wall-clock snapshot selection: greatest commit time ≤ `as_of`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_deleted: bool,
    /// Opt-in fast path for append-only workloads: skip latest-version
    /// resolution entirely.
    #[serde(default)]
    pub skip_versioning: bool,
}

impl QueryRequest {
    /// Bare query over a table, used internally by UPDATE/DELETE.
    pub fn all_rows(ident: &TableIdent) -> Self {
        Self {
            tenant_id: ident.tenant().clone(),
            namespace: ident.namespace().clone(),
            table: ident.table().clone(),
            projection: None,
            filters: FilterSet::default(),
            sort: Vec::new(),
            group_by: None,
            aggregations: Vec::new(),
            having: FilterSet::default(),
            limit: None,
            offset: None,
            as_of: None,
            include_deleted: false,
            skip_versioning: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    #[serde(default)]
    pub filters: FilterSet,
    pub updates: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    #[serde(default)]
    pub filters: FilterSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardDeleteRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    #[serde(default)]
    pub filters: FilterSet,
    /// Hard deletion is irreversible and must be explicitly confirmed.
    #[serde(default)]
    pub confirm: bool,
    /// Expire pre-delete snapshots so erased rows cannot be reached through
    /// time travel (default true).
    #[serde(default = "default_true")]
    pub expire_snapshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTablesRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeTableRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactRequest {
    pub tenant_id: TenantId,
    #[serde(default = "default_namespace")]
    pub namespace: Namespace,
    pub table: TableName,
    /// Compact even when the small-file count is below the policy floor.
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file_size_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Restrict selection to data files under this path prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_filter: Option<String>,
    #[serde(default)]
    pub expire_snapshots: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_retention_hours: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Helper to build the table identity from request components.
pub fn table_ident(tenant: &TenantId, namespace: &Namespace, table: &TableName) -> TableIdent {
    TableIdent::new(tenant.clone(), namespace.clone(), table.clone())
}
