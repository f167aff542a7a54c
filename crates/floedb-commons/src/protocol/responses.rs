//! Response envelope and operation result payloads.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-readable error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ErrorDetail {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Query execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub row_count: usize,
    pub execution_time_ms: f64,
    pub scanned_rows: u64,
    pub scanned_bytes: u64,
    pub cache_hit: bool,
    pub query_id: String,
}

/// Compaction statistics block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompactionStats {
    pub files_before: usize,
    pub files_after: usize,
    pub files_compacted: usize,
    pub files_removed: i64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub bytes_saved: i64,
    pub snapshots_expired: usize,
    pub compaction_time_ms: f64,
    pub small_files_remaining: usize,
}

/// DESCRIBE_TABLE payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub namespace: String,
    /// Live rows: latest versions, soft-deleted excluded.
    pub row_count: u64,
    pub file_count: usize,
    pub total_bytes: u64,
    pub snapshot_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_at: Option<DateTime<Utc>>,
    /// User-facing schema (system columns omitted).
    pub schema: Value,
}

/// Uniform response envelope for every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueryMetadata>,
    pub request_id: String,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_recommended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_files_count: Option<usize>,
}

impl ResponseEnvelope {
    pub fn success(request_id: String, execution_time_ms: f64, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            metadata: None,
            request_id,
            execution_time_ms,
            error: None,
            compaction_recommended: None,
            small_files_count: None,
        }
    }

    pub fn failure(request_id: String, execution_time_ms: f64, err: &EngineError) -> Self {
        Self {
            success: false,
            data: None,
            metadata: None,
            request_id,
            execution_time_ms,
            error: Some(ErrorDetail::from(err)),
            compaction_recommended: None,
            small_files_count: None,
        }
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_compaction_hint(mut self, recommended: bool, small_files: usize) -> Self {
        self.compaction_recommended = Some(recommended);
        self.small_files_count = Some(small_files);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let env = ResponseEnvelope::success("req-1".into(), 12.5, json!({"records_written": 2}));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["records_written"], json!(2));
        assert_eq!(value["request_id"], json!("req-1"));
        assert!(value.get("error").is_none());
        assert!(value.get("compaction_recommended").is_none());
    }

    #[test]
    fn test_failure_envelope_carries_code() {
        let err = EngineError::ConfirmationRequired("hard delete requires confirm=true".into());
        let env = ResponseEnvelope::failure("req-2".into(), 0.4, &err);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["code"], json!("ConfirmationRequired"));
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("confirm=true"));
    }

    #[test]
    fn test_compaction_hint_fields() {
        let env = ResponseEnvelope::success("req-3".into(), 3.0, json!({"records_written": 1}))
            .with_compaction_hint(true, 7);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["compaction_recommended"], json!(true));
        assert_eq!(value["small_files_count"], json!(7));
    }
}
