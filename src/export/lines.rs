//! Newline-delimited JSON decoding for export responses
//!
//! The export endpoint streams one JSON object per line. Chunked reads
//! can split an object across a boundary, so a line that fails to parse
//! is carried over and retried once the next chunk arrives. A tail that
//! never heals means the server cut the response short (the API appends
//! markers like `export terminated early`), which must surface as an
//! integrity error distinct from plain malformed JSON.

use crate::error::{Error, Result};
use serde_json::Value;

/// Incremental decoder for line-delimited JSON bodies
#[derive(Debug, Default)]
pub struct LineDecoder {
    carry: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the records completed by it.
    ///
    /// On a parse failure the failing line and everything after it is
    /// buffered for retry against the next chunk.
    pub fn feed(&mut self, chunk: &str) -> Vec<Value> {
        let mut combined = std::mem::take(&mut self.carry);
        combined.push_str(chunk);

        let mut records = Vec::new();
        let mut rest = combined.as_str();

        while let Some(newline) = rest.find('\n') {
            let line = &rest[..newline];
            let trimmed = line.trim();
            if trimmed.is_empty() {
                rest = &rest[newline + 1..];
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    records.push(value);
                    rest = &rest[newline + 1..];
                }
                Err(_) => {
                    // Might be an object split across chunks; retry once
                    // more context arrives.
                    self.carry = rest.to_string();
                    return records;
                }
            }
        }

        self.carry = rest.to_string();
        records
    }

    /// Finish decoding, draining any parseable final line.
    ///
    /// A leftover tail that still does not parse is classified: a tail
    /// containing a newline means a complete line was malformed
    /// ([`Error::Decode`]); a bare unterminated fragment means the
    /// response stopped mid-record ([`Error::IncompleteResponse`]).
    pub fn finish(mut self) -> Result<Vec<Value>> {
        let tail = std::mem::take(&mut self.carry);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if !tail.contains('\n') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return Ok(vec![value]);
            }
        }

        let snippet: String = trimmed.chars().take(64).collect();
        if tail.contains('\n') {
            Err(Error::decode(format!("unparseable line in response: {snippet}")))
        } else {
            Err(Error::incomplete(format!(
                "response terminated mid-record: {snippet}"
            )))
        }
    }

    /// Whether un-consumed input is pending
    pub fn has_pending(&self) -> bool {
        !self.carry.trim().is_empty()
    }
}

/// Decode a complete body, splitting records from a possible bad tail.
///
/// Returns every record that parsed plus the integrity error for the
/// tail, if any, so callers opting into partial import can keep the
/// good records.
pub fn decode_body(body: &str) -> (Vec<Value>, Option<Error>) {
    let mut decoder = LineDecoder::new();
    let mut records = decoder.feed(body);
    match decoder.finish() {
        Ok(rest) => {
            records.extend(rest);
            (records, None)
        }
        Err(e) => (records, Some(e)),
    }
}
