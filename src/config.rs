//! Run configuration
//!
//! The host hands over one JSON config object per run; this module
//! owns its shape, defaults, and upfront validation so every bad
//! combination fails before the first network call.

use crate::cursor;
use crate::error::{Error, Result};
use crate::http::RetryPolicy;
use crate::project::ProjectorOptions;
use crate::range::DEFAULT_SLICE_RANGE;
use crate::schema::Column;
use crate::timezone;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Default raw-export endpoint
pub const DEFAULT_EXPORT_ENDPOINT: &str = "https://data.mixpanel.com/api/2.0/export/";

/// Default query-language endpoint
pub const DEFAULT_JQL_ENDPOINT: &str = "https://mixpanel.com/api/2.0/jql/";

// ============================================================================
// Connector Config
// ============================================================================

/// Complete per-run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Shared secret used to sign every request
    pub api_secret: String,

    /// IANA timezone of the analytics project; "today" and the time
    /// column are interpreted in it
    pub timezone: String,

    /// First date to fetch; defaults to two days before today
    #[serde(default)]
    pub from_date: Option<String>,

    /// Number of days to fetch from `from_date`; open-ended up to
    /// today when absent
    #[serde(default)]
    pub fetch_days: Option<i64>,

    /// Output schema
    #[serde(default)]
    pub columns: Vec<Column>,

    /// Incremental mode: filter out records already ingested by a
    /// previous run and emit resume state
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Marker column for incremental filtering; when set, filtering
    /// moves into the query predicate instead of in-process
    #[serde(default)]
    pub incremental_column: Option<String>,

    /// High-water mark carried over from the previous run
    #[serde(default)]
    pub latest_fetched_time: i64,

    /// Days re-fetched before `from_date` when resuming with a marker
    /// column, to catch late-arriving records
    #[serde(default = "default_back_fill_days")]
    pub back_fill_days: i64,

    /// Append a JSON overflow column of properties missing from the
    /// schema
    #[serde(default)]
    pub fetch_unknown_columns: bool,

    /// Append a JSON overflow column of non-reserved properties
    /// missing from the schema; mutually exclusive with the above
    #[serde(default)]
    pub fetch_custom_properties: bool,

    /// Seconds to wait before the first retry
    #[serde(default = "default_retry_initial_wait_sec")]
    pub retry_initial_wait_sec: u64,

    /// Retries after the initial attempt
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Days per request slice
    #[serde(default = "default_slice_range")]
    pub slice_range: usize,

    /// Visibility-lag buffer subtracted from the run start when
    /// computing the marker upper bound
    #[serde(default)]
    pub incremental_column_upper_limit_delay_in_seconds: i64,

    /// Raw-export endpoint override
    #[serde(default = "default_export_endpoint")]
    pub export_endpoint: String,

    /// Query-language endpoint override
    #[serde(default = "default_jql_endpoint")]
    pub jql_endpoint: String,

    /// Event-name filter; a string or an array of strings
    #[serde(default)]
    pub event: Option<Value>,

    /// User-supplied server-side filter predicate
    #[serde(rename = "where", default)]
    pub where_clause: Option<String>,

    /// Data bucket selector
    #[serde(default)]
    pub bucket: Option<String>,

    /// Fetch through the query-language endpoint instead of the raw
    /// export stream
    #[serde(default)]
    pub jql_mode: bool,

    /// Script to run in query-language mode
    #[serde(default)]
    pub jql_script: Option<String>,

    /// Keep already-decoded rows of a slice whose response was cut
    /// short, instead of failing the run
    #[serde(default = "default_true")]
    pub allow_partial_import: bool,
}

fn default_true() -> bool {
    true
}

fn default_back_fill_days() -> i64 {
    5
}

fn default_retry_initial_wait_sec() -> u64 {
    1
}

fn default_retry_limit() -> u32 {
    5
}

fn default_slice_range() -> usize {
    DEFAULT_SLICE_RANGE
}

fn default_export_endpoint() -> String {
    DEFAULT_EXPORT_ENDPOINT.to_string()
}

fn default_jql_endpoint() -> String {
    DEFAULT_JQL_ENDPOINT.to_string()
}

impl ConnectorConfig {
    /// Parse a config from its JSON representation
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject every invalid field combination before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.api_secret.is_empty() {
            return Err(Error::missing_field("api_secret"));
        }
        timezone::validate(&self.timezone)?;

        if let Some(days) = self.fetch_days {
            if days < 1 {
                return Err(Error::invalid_value(
                    "fetch_days",
                    format!("must be at least 1, got {days}"),
                ));
            }
        }
        if self.slice_range < 1 {
            return Err(Error::invalid_value("slice_range", "must be at least 1"));
        }
        if self.back_fill_days < 0 {
            return Err(Error::invalid_value("back_fill_days", "must not be negative"));
        }

        self.projector_options().validate()?;

        if self.jql_mode && self.jql_script.as_deref().map_or(true, str::is_empty) {
            return Err(Error::config("jql_script is required when jql_mode is enabled"));
        }
        if self.jql_mode && self.incremental && !self.jql_script_bounds_dates() {
            warn!(
                "Missing params.from_date and params.to_date in the JQL script. \
                 Use these parameters to limit the amount of returned data."
            );
        }

        Ok(())
    }

    /// Whether the JQL script references both planner-injected date
    /// parameters; an unbounded script re-fetches the full history on
    /// every incremental run
    pub fn jql_script_bounds_dates(&self) -> bool {
        self.jql_script
            .as_deref()
            .is_some_and(|script| {
                script.contains("params.from_date") && script.contains("params.to_date")
            })
    }

    /// First date to fetch, resolved against today in the profile
    /// timezone when unset
    pub fn resolved_from_date(&self, today: NaiveDate) -> String {
        self.from_date
            .clone()
            .unwrap_or_else(|| (today - Days::new(2)).to_string())
    }

    /// Whether this run resumes a previous incremental run with a
    /// configured marker column; only then is the back-fill applied
    pub fn is_resuming_with_marker(&self) -> bool {
        self.incremental && self.incremental_column.is_some() && self.latest_fetched_time != 0
    }

    /// The event filter serialized the way the export API expects: a
    /// JSON array of event names
    pub fn event_param(&self) -> Result<Option<String>> {
        match &self.event {
            None => Ok(None),
            Some(Value::Array(names)) => Ok(Some(serde_json::to_string(names)?)),
            Some(Value::String(name)) => Ok(Some(serde_json::to_string(&[name])?)),
            Some(other) => Err(Error::invalid_value(
                "event",
                format!("expected a string or an array of strings, got {other}"),
            )),
        }
    }

    pub fn projector_options(&self) -> ProjectorOptions {
        ProjectorOptions {
            fetch_unknown_columns: self.fetch_unknown_columns,
            fetch_custom_properties: self.fetch_custom_properties,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_wait: Duration::from_secs(self.retry_initial_wait_sec),
            retry_limit: self.retry_limit,
        }
    }

    /// Marker upper bound for this run; fails when the configured
    /// delay pushes the bound at or below the previous high-water mark
    pub fn upper_limit(&self, job_start_millis: i64) -> Result<i64> {
        cursor::upper_bound(
            job_start_millis,
            self.incremental_column_upper_limit_delay_in_seconds,
            self.latest_fetched_time,
        )
    }
}
