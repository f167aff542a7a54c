//! Query planning and execution.

pub mod planner;
pub mod sql;

pub use planner::{fetch_full_rows, run_query, QueryOutput};
pub use sql::SqlBuilder;
