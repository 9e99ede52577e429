//! Sliced retrieval from the remote export API
//!
//! Drives paginated fetches across a planned date range: one request
//! per slice, per-day fallback under concurrency rejection, and
//! line-delimited decoding with partial-response detection.

mod lines;
mod source;

pub use lines::{decode_body, LineDecoder};
pub use source::{ExportQuery, ExportSource, JqlSource, RemoteSource, SMALL_NUM_OF_RECORDS};

use crate::error::{Error, Result};
use crate::range::FetchSlice;
use serde_json::Value;

/// Records fetched for one slice, plus the integrity error for a bad
/// tail when the response stopped mid-record
#[derive(Debug)]
pub struct SlicePayload {
    /// Every record that decoded cleanly, in response line order
    pub records: Vec<Value>,
    /// Set when the response terminated early; the caller decides
    /// whether partial import keeps the records
    pub truncated: Option<Error>,
}

/// Pull-driven sequence of slice payloads over a planned range.
///
/// Bounded by the slice list, so termination is structural; records
/// within a slice keep the API's line order and slices are consumed in
/// date-ascending order.
pub struct ExportStream<'a> {
    source: &'a dyn RemoteSource,
    slices: std::vec::IntoIter<FetchSlice>,
}

impl<'a> ExportStream<'a> {
    /// Create a stream over the given slices
    pub fn new(source: &'a dyn RemoteSource, slices: Vec<FetchSlice>) -> Self {
        Self {
            source,
            slices: slices.into_iter(),
        }
    }

    /// Fetch the next slice, or `None` once the range is exhausted
    pub async fn next_slice(&mut self) -> Option<(FetchSlice, Result<SlicePayload>)> {
        let slice = self.slices.next()?;
        let payload = self.source.fetch_slice(&slice).await;
        Some((slice, payload))
    }
}
