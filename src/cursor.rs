//! Incremental high-water-mark cursor
//!
//! Decides, per record, whether a row was already ingested by a prior
//! run. For nested export records the default `time` marker is
//! compared in process, while an explicitly configured marker column
//! is pushed into the query predicate and the cursor only tracks the
//! observed maximum for the resume state. Flat results carry no query
//! predicate, so [`IncrementalCursor::admit_flat`] filters in process
//! for both marker kinds.

use crate::error::{Error, Result};
use crate::project::RawRecord;
use crate::schema::TIME_COLUMN;
use serde_json::{Map, Value};

/// Outcome of admitting one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Record accepted; carries the updated high-water mark
    Accept(i64),
    /// Record already covered by a previous run
    Skip,
}

/// Tracks the maximum marker value seen across a run.
#[derive(Debug, Clone)]
pub struct IncrementalCursor {
    marker_column: Option<String>,
    high_water_mark: i64,
}

impl IncrementalCursor {
    /// Cursor resuming from a previous run's high-water mark.
    ///
    /// `marker_column` is the explicitly configured marker, if any;
    /// `None` selects the default `time` field with in-process
    /// filtering.
    pub fn new(marker_column: Option<String>, previous_high_water_mark: i64) -> Self {
        Self {
            marker_column,
            high_water_mark: previous_high_water_mark,
        }
    }

    /// The maximum marker value observed so far
    pub fn high_water_mark(&self) -> i64 {
        self.high_water_mark
    }

    /// Admit or skip one record, updating the high-water mark.
    ///
    /// Fails with a config error when the marker field is absent from
    /// the record or is not an integer.
    pub fn admit(&mut self, record: &RawRecord) -> Result<Admission> {
        let marker = self.marker_column.as_deref().unwrap_or(TIME_COLUMN);
        let value = record
            .properties
            .get(marker)
            .ok_or_else(|| {
                Error::config(format!(
                    "Incremental column `{marker}` is not present in the record"
                ))
            })?
            .as_i64()
            .ok_or_else(|| {
                Error::config(format!("Incremental column `{marker}` is not an integer"))
            })?;

        if self.marker_column.is_none() && value <= self.high_water_mark {
            return Ok(Admission::Skip);
        }

        self.high_water_mark = self.high_water_mark.max(value);
        Ok(Admission::Accept(self.high_water_mark))
    }

    /// Admit or skip one flat (top-level) record.
    ///
    /// Flat results have no query-side marker predicate, so the skip
    /// comparison always happens in process, for configured and
    /// default markers alike. A record without an integer marker value
    /// is admitted as-is and leaves the mark untouched.
    pub fn admit_flat(&mut self, record: &Map<String, Value>) -> Admission {
        let marker = self.marker_column.as_deref().unwrap_or(TIME_COLUMN);
        match record.get(marker).and_then(Value::as_i64) {
            Some(value) if value <= self.high_water_mark => Admission::Skip,
            Some(value) => {
                self.high_water_mark = value;
                Admission::Accept(self.high_water_mark)
            }
            None => Admission::Accept(self.high_water_mark),
        }
    }
}

/// Upper bound for the query-side marker predicate: run-start wall
/// clock in epoch-ms minus the configured visibility-lag delay.
///
/// Fails with a config error when the bound does not leave any room
/// above the previous high-water mark.
pub fn upper_bound(
    job_start_millis: i64,
    delay_seconds: i64,
    previous_high_water_mark: i64,
) -> Result<i64> {
    let bound = job_start_millis - delay_seconds * 1000;
    if bound <= previous_high_water_mark {
        return Err(Error::config(format!(
            "Upper limit {bound} (job start minus {delay_seconds}s) must be greater than latest_fetched_time {previous_high_water_mark}"
        )));
    }
    Ok(bound)
}

/// Compose the query-side predicate for an explicitly configured
/// marker column, preserving any user-supplied filter.
pub fn where_predicate(
    user_where: Option<&str>,
    marker_column: &str,
    previous_high_water_mark: i64,
    upper_bound: i64,
) -> String {
    let predicate = format!(
        "properties[\"{marker_column}\"] > {previous_high_water_mark} and properties[\"{marker_column}\"] < {upper_bound}"
    );
    match user_where {
        Some(clause) if !clause.trim().is_empty() => format!("({clause}) and {predicate}"),
        _ => predicate,
    }
}
