// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # mixport
//!
//! Incremental export connector for a Mixpanel-style analytics API.
//!
//! ## Features
//!
//! - **Date-range planning**: contiguous per-day ranges clipped at
//!   "today" in the project timezone, split into bounded fetch slices
//! - **Signed, retrying HTTP**: MD5-signed query parameters with an
//!   expiry, bounded exponential-backoff retries, liveness probing
//! - **Streaming export decode**: newline-delimited JSON with
//!   chunk-boundary healing and truncated-response detection
//! - **Record projection**: schema-driven rows with timezone-adjusted
//!   time columns and JSON overflow columns
//! - **Incremental cursor**: high-water-mark filtering and resume
//!   state for the next run
//! - **Schema guessing**: column inference from a small record sample
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mixport::engine::{MemorySink, Runner};
//! use mixport::config::ConnectorConfig;
//! use mixport::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConnectorConfig::from_json(r#"{
//!         "api_secret": "...",
//!         "timezone": "US/Pacific",
//!         "from_date": "2023-01-01",
//!         "columns": [
//!             { "name": "event", "type": "string" },
//!             { "name": "time", "type": "long" }
//!         ]
//!     }"#)?;
//!
//!     let mut sink = MemorySink::new();
//!     let report = Runner::new(config)?.run(&mut sink).await?;
//!
//!     if let Some(diff) = report.next_config_diff() {
//!         // Persist and feed into the next run's config.
//!         println!("resume from {}", diff.from_date);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the connector
pub mod error;

/// Run configuration and validation
pub mod config;

/// Incremental high-water-mark cursor
pub mod cursor;

/// Run orchestration and the row sink seam
pub mod engine;

/// Sliced retrieval and export-stream decoding
pub mod export;

/// Signed, retrying HTTP fetcher
pub mod http;

/// Record projection onto the output schema
pub mod project;

/// Date range planning and slicing
pub mod range;

/// Column types and schema inference
pub mod schema;

/// Resume state for incremental runs
pub mod state;

/// Timezone resolution and epoch adjustment
pub mod timezone;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};

// Re-export commonly used types
pub use config::ConnectorConfig;
pub use engine::{PageSink, RunReport, Runner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
