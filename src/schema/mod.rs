//! Output schema types and sample-based inference
//!
//! The caller supplies the output column list for a real run; discovery
//! mode infers one from a small sample of exported records.

mod inference;
mod types;

pub use inference::{SchemaSampler, EVENT_COLUMN, TIME_COLUMN};
pub use types::{Column, ColumnType};
