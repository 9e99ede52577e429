//! Column inference from sampled records

use super::types::{Column, ColumnType};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// The literal event-name column present in every export record
pub const EVENT_COLUMN: &str = "event";

/// The default time column used for incremental filtering
pub const TIME_COLUMN: &str = "time";

/// Infers an output column list from a small sample of records.
///
/// Per property, the narrowest common type across all sampled values
/// wins; a property absent from some records is still included as long
/// as at least one record carries it.
#[derive(Debug, Clone)]
pub struct SchemaSampler {
    /// Prepend the literal `time: long` and `event: string` header
    /// columns the export stream always carries
    prepend_export_header: bool,
}

impl Default for SchemaSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaSampler {
    /// Sampler for export-stream records: the inferred property columns
    /// are prefixed with `time: long` and `event: string`
    pub fn new() -> Self {
        Self {
            prepend_export_header: true,
        }
    }

    /// Sampler for alternate query-mode records, no header columns
    pub fn without_export_header() -> Self {
        Self {
            prepend_export_header: false,
        }
    }

    /// Infer columns from sampled property bags.
    ///
    /// Fails with a config error when the sample is not record-per-row
    /// shaped (e.g. a scalar reduction result).
    pub fn infer(&self, samples: &[Value]) -> Result<Vec<Column>> {
        let mut order: Vec<String> = Vec::new();
        let mut observed: HashMap<String, Observation> = HashMap::new();

        for sample in samples {
            let Value::Object(map) = sample else {
                return Err(Error::config(
                    "Sampled result is not convertible to records, can't guess the schema",
                ));
            };
            for (key, value) in map {
                if !observed.contains_key(key) {
                    order.push(key.clone());
                }
                let obs = observed.entry(key.clone()).or_default();
                obs.observe(value);
            }
        }

        let mut columns: Vec<Column> = order
            .iter()
            .filter(|name| !(self.prepend_export_header && *name == TIME_COLUMN))
            .map(|name| observed[name].to_column(name))
            .collect();

        if self.prepend_export_header {
            columns.insert(0, Column::new(EVENT_COLUMN, ColumnType::String));
            columns.insert(0, Column::new(TIME_COLUMN, ColumnType::Long));
        }

        Ok(columns)
    }
}

/// Accumulated type evidence for one property
#[derive(Debug, Default, Clone)]
struct Observation {
    column_type: Option<ColumnType>,
    format: Option<String>,
    format_conflict: bool,
}

impl Observation {
    fn observe(&mut self, value: &Value) {
        let Some((observed_type, format)) = classify(value) else {
            // JSON null carries no type evidence.
            return;
        };

        if let Some(fmt) = format {
            match &self.format {
                Some(existing) if existing != &fmt => self.format_conflict = true,
                _ => self.format = Some(fmt),
            }
        }

        self.column_type = Some(match self.column_type {
            Some(current) => current.merge_with(observed_type),
            None => observed_type,
        });
    }

    fn to_column(&self, name: &str) -> Column {
        let column_type = self.column_type.unwrap_or(ColumnType::String);
        let mut column = Column::new(name, column_type);
        if column_type == ColumnType::Timestamp {
            if self.format_conflict {
                // Conflicting formats can't be parsed uniformly.
                column.column_type = ColumnType::String;
            } else {
                column.format.clone_from(&self.format);
            }
        }
        column
    }
}

static DATETIME_T: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap());
static DATETIME_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap());
static DATE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

fn classify(value: &Value) -> Option<(ColumnType, Option<String>)> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some((ColumnType::Boolean, None)),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some((ColumnType::Long, None))
            } else {
                Some((ColumnType::Double, None))
            }
        }
        Value::String(s) => Some(classify_string(s)),
        Value::Array(_) | Value::Object(_) => Some((ColumnType::Json, None)),
    }
}

fn classify_string(s: &str) -> (ColumnType, Option<String>) {
    if DATETIME_T.is_match(s) {
        (
            ColumnType::Timestamp,
            Some("%Y-%m-%dT%H:%M:%S".to_string()),
        )
    } else if DATETIME_SPACE.is_match(s) {
        (
            ColumnType::Timestamp,
            Some("%Y-%m-%d %H:%M:%S".to_string()),
        )
    } else if DATE_ONLY.is_match(s) {
        (ColumnType::Timestamp, Some("%Y-%m-%d".to_string()))
    } else {
        (ColumnType::String, None)
    }
}
