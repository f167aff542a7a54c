//! # floedb-catalog
//!
//! Catalog adapters for FloeDB: the table-format metadata model, the
//! `Catalog` trait the engine programs against, the storage-managed and
//! REST catalog variants, and the hot metadata cache.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod metadata;
pub mod rest;
pub mod warehouse;

pub use cache::MetadataCache;
pub use catalog::{Catalog, ResolvedTable};
pub use error::CatalogError;
pub use metadata::{DataFile, Snapshot, SnapshotOperation, TableMetadata};
pub use rest::RestCatalog;
pub use warehouse::WarehouseCatalog;
