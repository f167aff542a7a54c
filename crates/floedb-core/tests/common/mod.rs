//! Shared fixtures for engine integration tests.
//!
//! Every test runs a full engine against an in-memory object store and the
//! storage-managed catalog, so state is isolated per test.
#![allow(dead_code)]

use floedb_catalog::{Catalog, WarehouseCatalog};
use floedb_commons::protocol::{OperationRequest, ResponseEnvelope};
use floedb_commons::settings::EngineSettings;
use floedb_core::TableEngine;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use serde_json::Value;
use std::sync::Arc;

pub fn test_engine() -> TableEngine {
    test_engine_with(EngineSettings::default())
}

pub fn test_engine_with(settings: EngineSettings) -> TableEngine {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let catalog: Arc<dyn Catalog> =
        Arc::new(WarehouseCatalog::new(store.clone(), settings.s3.warehouse_path.clone()));
    TableEngine::new(catalog, store, settings)
}

/// Execute a JSON operation and return the envelope.
pub async fn execute(engine: &TableEngine, request: Value) -> ResponseEnvelope {
    let request: OperationRequest =
        serde_json::from_value(request).expect("request must deserialize");
    engine.execute(request).await
}

/// Execute and assert success.
pub async fn execute_ok(engine: &TableEngine, request: Value) -> ResponseEnvelope {
    let envelope = execute(engine, request).await;
    assert!(
        envelope.success,
        "operation failed: {:?}",
        envelope.error
    );
    envelope
}

/// Rows of a QUERY response.
pub fn records(envelope: &ResponseEnvelope) -> Vec<Value> {
    envelope.data.as_ref().expect("data")["records"]
        .as_array()
        .expect("records array")
        .clone()
}

/// CREATE_TABLE for the standard products fixture.
pub async fn create_products_table(engine: &TableEngine, tenant: &str, table: &str) {
    execute_ok(
        engine,
        serde_json::json!({
            "operation": "CREATE_TABLE",
            "tenant_id": tenant,
            "namespace": "shop",
            "table": table,
            "schema": {
                "fields": {
                    "id": {"type": "long", "required": true},
                    "name": {"type": "string"},
                    "price": {"type": "double"},
                    "category": {"type": "string"},
                    "stock": {"type": "integer"}
                }
            }
        }),
    )
    .await;
}

/// WRITE a batch into the products fixture.
pub async fn write_products(
    engine: &TableEngine,
    tenant: &str,
    table: &str,
    records: Value,
) -> ResponseEnvelope {
    execute_ok(
        engine,
        serde_json::json!({
            "operation": "WRITE",
            "tenant_id": tenant,
            "namespace": "shop",
            "table": table,
            "records": records
        }),
    )
    .await
}

/// QUERY the products fixture with extra request fields merged in.
pub async fn query_products(
    engine: &TableEngine,
    tenant: &str,
    table: &str,
    extra: Value,
) -> ResponseEnvelope {
    let mut request = serde_json::json!({
        "operation": "QUERY",
        "tenant_id": tenant,
        "namespace": "shop",
        "table": table
    });
    for (key, value) in extra.as_object().expect("extra must be an object") {
        request[key] = value.clone();
    }
    execute_ok(engine, request).await
}
