//! # floedb-core
//!
//! The FloeDB table engine: schema mapping, the record envelope, the
//! Parquet writer, the query planner/executor, MVCC update/delete, the
//! compactor and the operation dispatcher. Storage and catalog concerns sit
//! behind the `object_store` and `Catalog` seams, so the engine can run
//! against S3 with a REST catalog in production and entirely in memory in
//! tests.

pub mod compactor;
pub mod describe;
pub mod engine;
pub mod envelope;
pub mod json_arrow;
pub mod mvcc;
pub mod query;
pub mod scan;
pub mod schema_mapper;
pub mod writer;

pub use engine::TableEngine;
