//! # floedb-commons
//!
//! Shared types for FloeDB: identifiers, the error taxonomy, the user and
//! physical schema models, the JSON operation protocol and engine settings.
//! Kept dependency-light so every other crate can build on it.

pub mod constants;
pub mod errors;
pub mod ids;
pub mod protocol;
pub mod schema;
pub mod settings;
pub mod validation;

pub use errors::{EngineError, Result};
pub use ids::{Namespace, TableIdent, TableName, TenantId};
