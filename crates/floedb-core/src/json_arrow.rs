//! JSON row ↔ Arrow RecordBatch conversion.
//!
//! The operation protocol is row-oriented JSON; the storage and query layers
//! are columnar. Decoding goes through `arrow-json` with the physical schema
//! so nested struct/list/map columns convert without hand-written builders.

use arrow::datatypes::SchemaRef;
use arrow::json::writer::JsonArray;
use arrow::json::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use floedb_commons::{EngineError, Result};
use serde_json::{Map, Value};

/// Decode JSON rows into a single RecordBatch with the given schema.
///
/// Type errors (a string where the schema expects a number, a malformed
/// timestamp) surface as `SchemaMismatch`.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Map<String, Value>]) -> Result<RecordBatch> {
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema.clone()));
    }
    let mut decoder = ReaderBuilder::new(schema.clone())
        .build_decoder()
        .map_err(|e| EngineError::internal(format!("json decoder: {}", e)))?;
    decoder
        .serialize(rows)
        .map_err(|e| EngineError::schema_mismatch(format!("row does not match table schema: {}", e)))?;
    decoder
        .flush()
        .map_err(|e| EngineError::schema_mismatch(format!("row does not match table schema: {}", e)))?
        .ok_or_else(|| EngineError::internal("json decoder produced no batch".to_string()))
}

/// Render record batches as JSON rows. Null values are kept explicit so a
/// cloned row round-trips through the decoder unchanged.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Map<String, Value>>> {
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if total_rows == 0 {
        return Ok(Vec::new());
    }
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| EngineError::internal(format!("json writer: {}", e)))?;
    writer
        .finish()
        .map_err(|e| EngineError::internal(format!("json writer: {}", e)))?;
    let buf = writer.into_inner();
    serde_json::from_slice(&buf).map_err(EngineError::from)
}

/// Single-batch convenience wrapper.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Map<String, Value>>> {
    batches_to_rows(std::slice::from_ref(batch))
}
