//! System column names and engine-wide constants.

/// Tenant owning the row; always equals the table tenant.
pub const COL_TENANT_ID: &str = "_tenant_id";
/// Stable logical-row identifier (16-char hex digest of the initial payload).
pub const COL_RECORD_ID: &str = "_record_id";
/// UTC time the version was produced.
pub const COL_TIMESTAMP: &str = "_timestamp";
/// Monotonically increasing version per record id, starting at 1.
pub const COL_VERSION: &str = "_version";
/// Soft-delete marker for this version.
pub const COL_DELETED: &str = "_deleted";
/// UTC time of soft deletion, null while live.
pub const COL_DELETED_AT: &str = "_deleted_at";

/// System columns in physical declaration order (after user columns).
pub const SYSTEM_COLUMNS: [&str; 6] = [
    COL_TENANT_ID,
    COL_RECORD_ID,
    COL_TIMESTAMP,
    COL_VERSION,
    COL_DELETED,
    COL_DELETED_AT,
];

/// Returns true when `name` is one of the reserved system columns.
pub fn is_system_column(name: &str) -> bool {
    SYSTEM_COLUMNS.contains(&name)
}

/// Request deadline for read operations (QUERY, DESCRIBE, LIST), seconds.
pub const READ_DEADLINE_SECS: u64 = 30;
/// Request deadline for write operations (WRITE, UPDATE, DELETE), seconds.
pub const WRITE_DEADLINE_SECS: u64 = 60;
/// Request deadline for COMPACT, seconds.
pub const COMPACT_DEADLINE_SECS: u64 = 900;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_column_membership() {
        assert!(is_system_column("_record_id"));
        assert!(is_system_column("_deleted_at"));
        assert!(!is_system_column("record_id"));
        assert!(!is_system_column("price"));
    }
}
