//! Type-safe identifiers for tables and tenants.
//!
//! Every table is addressed by `(tenant, namespace, name)`. The physical
//! catalog namespace is derived as `{tenant}_{namespace}` so tenant
//! isolation holds at the catalog layer as well.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(TenantId, "Tenant identifier wrapper");
string_id!(Namespace, "Logical namespace within a tenant");
string_id!(TableName, "Table name wrapper");

/// Composite table address: `(tenant, namespace, table)`.
///
/// The catalog never sees the logical namespace directly; it sees the
/// physical namespace which embeds the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdent {
    tenant: TenantId,
    namespace: Namespace,
    table: TableName,
}

impl TableIdent {
    pub fn new(tenant: TenantId, namespace: Namespace, table: TableName) -> Self {
        Self {
            tenant,
            namespace,
            table,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Physical catalog namespace: `{tenant}_{namespace}`, hyphens folded to
    /// underscores so the result is a valid SQL identifier.
    pub fn physical_namespace(&self) -> String {
        physical_namespace(&self.tenant, &self.namespace)
    }

    /// Full physical identifier: `{physical_namespace}.{table}`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.physical_namespace(), self.table.as_str())
    }
}

/// Physical catalog namespace for a `(tenant, namespace)` pair.
pub fn physical_namespace(tenant: &TenantId, namespace: &Namespace) -> String {
    format!("{}_{}", tenant.as_str(), namespace.as_str()).replace('-', "_")
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant, self.namespace, self.table
        )
    }
}
