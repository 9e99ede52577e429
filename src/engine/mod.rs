//! Run orchestration
//!
//! Wires the planner, remote source, projector and cursor into the
//! ingest loop, and drives schema guessing off a small record sample.
//!
//! # Overview
//!
//! The engine module provides:
//! - `Runner` - executes one configured run against a row sink
//! - `PageSink` - the seam the host implements to receive rows
//! - `RunReport` - per-run counters plus the resume state

mod types;

pub use types::{MemorySink, PageSink, RunMode, RunReport};

use crate::config::ConnectorConfig;
use crate::cursor::{self, Admission, IncrementalCursor};
use crate::error::{Error, Result};
use crate::export::{ExportQuery, ExportSource, ExportStream, JqlSource, RemoteSource};
use crate::http::RetryingFetcher;
use crate::project::{RawRecord, RecordProjector};
use crate::range::{self, DateRangePlanner};
use crate::schema::{Column, SchemaSampler, TIME_COLUMN};
use crate::state::IncrementalState;
use crate::timezone;
use chrono::{Days, Utc};
use serde_json::Value;
use tracing::{info, warn};

/// Executes one configured run
pub struct Runner {
    config: ConnectorConfig,
    mode: RunMode,
}

impl Runner {
    /// Create a runner; the config is validated before any network call
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mode: RunMode::Full,
        })
    }

    /// Stop after the first slice (interactive preview)
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fetch the planned range, projecting every admitted record into
    /// the sink.
    ///
    /// Probes the service first and fails with
    /// [`Error::ServiceUnavailable`] before issuing any real request.
    pub async fn run(&self, sink: &mut dyn PageSink) -> Result<RunReport> {
        let tz = timezone::resolve(&self.config.timezone)?;
        let today = timezone::today_in(&self.config.timezone);
        let job_start_millis = Utc::now().timestamp_millis();

        let fetcher = RetryingFetcher::new(self.config.retry_policy());
        let endpoint = self.active_endpoint();
        if !fetcher.service_available(endpoint).await {
            return Err(Error::ServiceUnavailable);
        }

        let where_clause = self.run_where_clause(job_start_millis)?;
        let source = self.build_source(fetcher, where_clause)?;

        let mut planner = DateRangePlanner::new(
            self.config.resolved_from_date(today),
            self.config.fetch_days,
            &self.config.timezone,
        )
        .with_today(today);
        if self.config.is_resuming_with_marker() {
            planner = planner.with_back_fill(self.config.back_fill_days);
        }
        let dates = planner.plan()?;

        let mut report = RunReport::default();
        if dates.is_empty() {
            sink.finish()?;
            // Nothing to fetch, but an incremental resume still needs a
            // to_date; yesterday keeps the next run anchored.
            if self.config.incremental {
                report.state = Some(IncrementalState::new(
                    self.config.latest_fetched_time,
                    today - Days::new(1),
                ));
            }
            return Ok(report);
        }

        let options = self.config.projector_options();
        let projector = RecordProjector::new(&self.config.columns, tz, options);
        let mut cursor = self.build_cursor();

        let slices = range::slices(&dates, self.config.slice_range);
        let mut stream = ExportStream::new(source.as_ref(), slices);

        while let Some((slice, payload)) = stream.next_slice().await {
            let payload = payload?;
            report.slices_fetched += 1;

            if let Some(truncation) = payload.truncated {
                if !self.config.allow_partial_import {
                    return Err(truncation);
                }
                warn!(
                    "Export for {slice} terminated early, keeping {} decoded records: {truncation}",
                    payload.records.len()
                );
                report.truncated_slices += 1;
            }

            let mut skipped_seen = 0usize;
            let mut skipped_gap = 0usize;

            for value in payload.records {
                let projected = if self.config.jql_mode {
                    let Value::Object(map) = value else {
                        return Err(Error::decode("JQL record is not an object"));
                    };
                    if let Some(cursor) = cursor.as_mut() {
                        if cursor.admit_flat(&map) == Admission::Skip {
                            skipped_seen += 1;
                            continue;
                        }
                    }
                    projector.project_flat(&map)
                } else {
                    let record = RawRecord::from_value(value)?;
                    if let Some(cursor) = cursor.as_mut() {
                        if cursor.admit(&record)? == Admission::Skip {
                            skipped_seen += 1;
                            continue;
                        }
                    }
                    projector.project(&record)
                };

                match projected {
                    Ok(row) => {
                        sink.add(row)?;
                        report.records_emitted += 1;
                    }
                    Err(Error::AmbiguousLocalTime { .. }) => skipped_gap += 1,
                    Err(e) => return Err(e),
                }
            }

            if skipped_seen > 0 {
                warn!(
                    "Skipped {skipped_seen} records in {slice} already fetched before (time <= {})",
                    self.config.latest_fetched_time
                );
                report.records_skipped_seen += skipped_seen;
            }
            if skipped_gap > 0 {
                warn!("Skipped {skipped_gap} records in {slice} whose time falls in a DST gap");
                report.records_skipped_dst_gap += skipped_gap;
            }

            if self.mode == RunMode::Preview {
                break;
            }
        }

        sink.finish()?;

        if self.config.incremental {
            let high_water_mark = cursor
                .map(|c| c.high_water_mark())
                .unwrap_or(self.config.latest_fetched_time);
            let to_date = dates[dates.len() - 1];
            report.state = Some(IncrementalState::new(high_water_mark, to_date));
        }

        Ok(report)
    }

    /// Infer the output schema from a small record sample
    pub async fn guess(&self) -> Result<Vec<Column>> {
        let today = timezone::today_in(&self.config.timezone);
        let from = range::parse_date(&self.config.resolved_from_date(today))?;
        let fetcher = RetryingFetcher::new(self.config.retry_policy());
        let source = self.build_source(fetcher, self.config.where_clause.clone())?;

        let samples = source.fetch_sample(from, today).await?;
        if self.config.jql_mode {
            SchemaSampler::without_export_header().infer(&samples)
        } else {
            let bags: Vec<Value> = samples.into_iter().map(property_bag).collect();
            SchemaSampler::new().infer(&bags)
        }
    }

    /// Incremental cursor for this run, or `None` when nothing should
    /// be filtered or tracked in process.
    ///
    /// Flat runs resolve the marker against the output schema first: a
    /// marker column the schema does not carry cannot be trusted, so
    /// those runs ingest unfiltered and keep the previous mark.
    fn build_cursor(&self) -> Option<IncrementalCursor> {
        if !self.config.incremental {
            return None;
        }
        if !self.config.jql_mode {
            return Some(IncrementalCursor::new(
                self.config.incremental_column.clone(),
                self.config.latest_fetched_time,
            ));
        }

        if self.config.incremental_column.is_none() {
            warn!(
                "incremental_column is not set, using `{TIME_COLUMN}` to avoid re-ingesting rows"
            );
        }
        let marker = self
            .config
            .incremental_column
            .as_deref()
            .unwrap_or(TIME_COLUMN);
        self.config
            .columns
            .iter()
            .any(|column| column.name == marker)
            .then(|| {
                IncrementalCursor::new(Some(marker.to_string()), self.config.latest_fetched_time)
            })
    }

    fn active_endpoint(&self) -> &str {
        if self.config.jql_mode {
            &self.config.jql_endpoint
        } else {
            &self.config.export_endpoint
        }
    }

    /// Server-side filter for this run: the user clause, extended with
    /// the marker predicate when an incremental marker is configured
    fn run_where_clause(&self, job_start_millis: i64) -> Result<Option<String>> {
        match &self.config.incremental_column {
            Some(column) if self.config.incremental && !self.config.jql_mode => {
                let upper = self.config.upper_limit(job_start_millis)?;
                info!("Job start time is {job_start_millis}, marker upper limit is {upper}");
                Ok(Some(cursor::where_predicate(
                    self.config.where_clause.as_deref(),
                    column,
                    self.config.latest_fetched_time,
                    upper,
                )))
            }
            _ => {
                info!("Job start time is {job_start_millis}");
                Ok(self.config.where_clause.clone())
            }
        }
    }

    fn build_source(
        &self,
        fetcher: RetryingFetcher,
        where_clause: Option<String>,
    ) -> Result<Box<dyn RemoteSource>> {
        if self.config.jql_mode {
            let script = self.config.jql_script.clone().unwrap_or_default();
            Ok(Box::new(JqlSource::new(
                fetcher,
                &self.config.jql_endpoint,
                &self.config.api_secret,
                script,
            )))
        } else {
            let query = ExportQuery {
                event: self.config.event_param()?,
                where_clause,
                bucket: self.config.bucket.clone(),
            };
            Ok(Box::new(ExportSource::new(
                fetcher,
                &self.config.export_endpoint,
                &self.config.api_secret,
                query,
            )))
        }
    }
}

/// Pull the nested property bag out of a raw export record, leaving
/// any other shape for the sampler to reject
fn property_bag(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("properties") {
            Some(bag) => bag,
            None => Value::Object(map),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests;
