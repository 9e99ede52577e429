//! Remote source implementations
//!
//! The raw-export and JQL-script request modes form a capability pair:
//! one trait, two implementations sharing the retrying fetcher, the
//! request signing and the slice-driven ingest loop.

use super::lines::decode_body;
use super::SlicePayload;
use crate::error::{Error, Result};
use crate::http::{sign_params, RetryingFetcher};
use crate::range::{self, FetchSlice};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Record cap for small-dataset sampling
pub const SMALL_NUM_OF_RECORDS: usize = 10;

/// Byte cap applied to bodies fetched in small-dataset mode
const SMALL_DATASET_BYTE_CAP: usize = 5 * 1024 * 1024;

/// Error payload the export API returns when too many export requests
/// run concurrently; detected by body content, the status is still 200
const TOO_MANY_CONCURRENT_MARKER: &str = "too many export requests in progress";

/// Fixed query parameters shared by every request of a run
#[derive(Debug, Clone, Default)]
pub struct ExportQuery {
    /// JSON-encoded event-name array filter
    pub event: Option<String>,
    /// Server-side where predicate (includes the incremental bound when
    /// a marker column is configured)
    pub where_clause: Option<String>,
    /// Data bucket selector
    pub bucket: Option<String>,
}

impl ExportQuery {
    fn to_params(&self, from: NaiveDate, to: NaiveDate) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("from_date".to_string(), from.to_string());
        params.insert("to_date".to_string(), to.to_string());
        if let Some(event) = &self.event {
            params.insert("event".to_string(), event.clone());
        }
        if let Some(where_clause) = &self.where_clause {
            params.insert("where".to_string(), where_clause.clone());
        }
        if let Some(bucket) = &self.bucket {
            params.insert("bucket".to_string(), bucket.clone());
        }
        params
    }
}

/// A paginated/sliced remote record source
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every record for one date slice
    async fn fetch_slice(&self, slice: &FetchSlice) -> Result<SlicePayload>;

    /// Fetch a small record sample for schema discovery, probing
    /// successively larger date windows until one yields data
    async fn fetch_sample(&self, from: NaiveDate, today: NaiveDate) -> Result<Vec<Value>>;
}

// ============================================================================
// Raw export source (newline-delimited JSON)
// ============================================================================

/// Source for the raw export endpoint
pub struct ExportSource {
    fetcher: RetryingFetcher,
    endpoint: String,
    api_secret: String,
    query: ExportQuery,
}

impl ExportSource {
    pub fn new(
        fetcher: RetryingFetcher,
        endpoint: impl Into<String>,
        api_secret: impl Into<String>,
        query: ExportQuery,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            api_secret: api_secret.into(),
            query,
        }
    }

    async fn request_body(&self, from: NaiveDate, to: NaiveDate) -> Result<String> {
        let params = self.query.to_params(from, to);
        let signed = sign_params(&params, &self.api_secret);
        self.fetcher.get(&self.endpoint, &signed).await
    }

    fn is_concurrency_rejection(body: &str) -> bool {
        body.contains(TOO_MANY_CONCURRENT_MARKER)
    }
}

#[async_trait]
impl RemoteSource for ExportSource {
    async fn fetch_slice(&self, slice: &FetchSlice) -> Result<SlicePayload> {
        let body = self.request_body(slice.from, slice.to).await?;

        if Self::is_concurrency_rejection(&body) {
            // The export API rejects wide concurrent windows; one request
            // per day is always accepted.
            warn!("Export rejected slice {slice} as concurrent overload, retrying day by day");
            let mut records = Vec::new();
            for day in slice.days() {
                let day_body = self.request_body(day, day).await?;
                if Self::is_concurrency_rejection(&day_body) {
                    return Err(Error::http_status(429, day_body));
                }
                let (day_records, truncated) = decode_body(&day_body);
                records.extend(day_records);
                if let Some(err) = truncated {
                    return Ok(SlicePayload {
                        records,
                        truncated: Some(err),
                    });
                }
            }
            return Ok(SlicePayload {
                records,
                truncated: None,
            });
        }

        let (records, truncated) = decode_body(&body);
        Ok(SlicePayload { records, truncated })
    }

    async fn fetch_sample(&self, from: NaiveDate, today: NaiveDate) -> Result<Vec<Value>> {
        for to in range::guess_to_dates(from, today) {
            info!("Sampling records in {from}..{to}");
            let mut body = self.request_body(from, to).await?;
            if body.len() > SMALL_DATASET_BYTE_CAP {
                body = truncate_on_char_boundary(body, SMALL_DATASET_BYTE_CAP);
            }
            // A truncated tail is fine here, the sample only needs a
            // handful of whole records.
            let (mut records, _truncated) = decode_body(&body);
            if !records.is_empty() {
                records.truncate(SMALL_NUM_OF_RECORDS);
                return Ok(records);
            }
        }
        Err(Error::config(
            "Can't find any records in the probed date windows. Too old from_date?",
        ))
    }
}

fn truncate_on_char_boundary(mut body: String, cap: usize) -> String {
    let mut cut = cap;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}

// ============================================================================
// JQL script source (single JSON response)
// ============================================================================

/// Source for the JQL endpoint: the script is an opaque payload, the
/// from/to dates are injected as its `params`
pub struct JqlSource {
    fetcher: RetryingFetcher,
    endpoint: String,
    api_secret: String,
    script: String,
}

impl JqlSource {
    pub fn new(
        fetcher: RetryingFetcher,
        endpoint: impl Into<String>,
        api_secret: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            api_secret: api_secret.into(),
            script: script.into(),
        }
    }

    async fn run_script(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Value>> {
        let mut params = BTreeMap::new();
        params.insert("script".to_string(), self.script.clone());
        params.insert(
            "params".to_string(),
            serde_json::json!({
                "from_date": from.to_string(),
                "to_date": to.to_string(),
            })
            .to_string(),
        );

        let signed = sign_params(&params, &self.api_secret);
        let body = self.fetcher.post_form(&self.endpoint, &signed).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::decode(format!("JQL response is not valid JSON: {e}")))?;
        validate_record_shape(&value)?;

        match value {
            Value::Array(records) => Ok(records),
            other => Ok(vec![other]),
        }
    }
}

/// Reject result shapes that aren't record-per-row, e.g. the integer a
/// reduce() script returns
fn validate_record_shape(value: &Value) -> Result<()> {
    let scalar = match value {
        Value::Array(items) => items
            .first()
            .is_some_and(|v| !matches!(v, Value::Object(_))),
        Value::Object(_) => false,
        _ => true,
    };
    if scalar {
        return Err(Error::config("Non-supported result. Revise your JQL."));
    }
    Ok(())
}

#[async_trait]
impl RemoteSource for JqlSource {
    async fn fetch_slice(&self, slice: &FetchSlice) -> Result<SlicePayload> {
        let records = self.run_script(slice.from, slice.to).await?;
        Ok(SlicePayload {
            records,
            truncated: None,
        })
    }

    async fn fetch_sample(&self, from: NaiveDate, today: NaiveDate) -> Result<Vec<Value>> {
        for to in range::guess_to_dates(from, today) {
            info!("Sampling JQL result in {from}..{to}");
            let mut records = self.run_script(from, to).await?;
            if !records.is_empty() {
                records.truncate(SMALL_NUM_OF_RECORDS);
                return Ok(records);
            }
        }
        Err(Error::config(
            "Can't find any records in the probed date windows. Too old from_date?",
        ))
    }
}
