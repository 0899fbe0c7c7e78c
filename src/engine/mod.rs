//! Embedded query engine
//!
//! Each execution gets its own in-memory SQLite database. Statements run one at a
//! time so that a failing statement is reported and the batch carries on.

pub mod sqlite;
pub mod statements;

pub use sqlite::{format_value, QueryEngine, QueryOutput};
pub use statements::{split_statements, starts_with_keyword};
