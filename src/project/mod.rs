//! Record projection onto the output schema
//!
//! Maps a raw event record (event name + nested property bag) to the
//! caller-supplied column list, adjusting the time column across
//! timezones and optionally appending one JSON overflow column for
//! unknown or custom properties.

mod reserved;

pub use reserved::{is_reserved, KNOWN_KEYS};

use crate::error::{Error, Result};
use crate::schema::{Column, EVENT_COLUMN, TIME_COLUMN};
use crate::timezone;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

/// A raw export record: event name plus unordered property bag
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    /// Event name; the one field that lives outside the property bag
    pub event: Option<Value>,
    /// Property name to value mapping as returned by the API
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RawRecord {
    /// Parse a decoded response line into a record
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::decode(format!("record is not an export event: {e}")))
    }
}

/// Overflow column behavior. The two modes are mutually exclusive;
/// [`ProjectorOptions::validate`] rejects the combination before any
/// network call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectorOptions {
    /// Append one JSON column of properties absent from the schema
    pub fetch_unknown_columns: bool,
    /// Append one JSON column of non-reserved, non-schema properties
    pub fetch_custom_properties: bool,
}

impl ProjectorOptions {
    pub fn validate(&self) -> Result<()> {
        if self.fetch_unknown_columns && self.fetch_custom_properties {
            return Err(Error::config(
                "Don't set true both `fetch_unknown_columns` and `fetch_custom_properties`.",
            ));
        }
        Ok(())
    }
}

/// Projects raw records onto a fixed output column list.
///
/// Timezone and schema are explicit construction parameters, never
/// ambient state, so projection is pure per record.
#[derive(Debug, Clone)]
pub struct RecordProjector<'a> {
    schema: &'a [Column],
    tz: Tz,
    options: ProjectorOptions,
}

impl<'a> RecordProjector<'a> {
    pub fn new(schema: &'a [Column], tz: Tz, options: ProjectorOptions) -> Self {
        Self {
            schema,
            tz,
            options,
        }
    }

    /// Project an export record into one output row.
    ///
    /// Returns [`Error::AmbiguousLocalTime`] when the time column falls
    /// in a DST gap; the caller skips and counts the record.
    pub fn project(&self, record: &RawRecord) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.schema.len() + 1);
        for column in self.schema {
            values.push(self.extract_value(record, &column.name)?);
        }

        if self.options.fetch_unknown_columns {
            values.push(self.unknown_overflow(record)?);
        } else if self.options.fetch_custom_properties {
            values.push(self.custom_overflow(record)?);
        }

        Ok(values)
    }

    /// Project a flat query-mode record (no nested property bag).
    ///
    /// Time-like fields falling in a DST gap are nudged forward one
    /// hour instead of skipped, matching the query API's semantics.
    pub fn project_flat(&self, record: &Map<String, Value>) -> Result<Vec<Value>> {
        self.schema
            .iter()
            .map(|column| match column.name.as_str() {
                name @ (TIME_COLUMN | "last_seen") => {
                    self.adjust_time_value(record.get(name), true)
                }
                name => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
            })
            .collect()
    }

    fn extract_value(&self, record: &RawRecord, name: &str) -> Result<Value> {
        match name {
            EVENT_COLUMN => Ok(record.event.clone().unwrap_or(Value::Null)),
            TIME_COLUMN => self.adjust_time_value(record.properties.get(TIME_COLUMN), false),
            _ => Ok(record.properties.get(name).cloned().unwrap_or(Value::Null)),
        }
    }

    fn adjust_time_value(&self, value: Option<&Value>, nudge: bool) -> Result<Value> {
        match value {
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                let epoch = n.as_i64().unwrap_or_default();
                let adjusted = if nudge {
                    timezone::adjust_to_utc_nudged(epoch, self.tz)?
                } else {
                    timezone::adjust_to_utc(epoch, self.tz)?
                };
                Ok(Value::from(adjusted))
            }
            Some(other) => Ok(other.clone()),
            None => Ok(Value::Null),
        }
    }

    /// One JSON column of `(record keys ∪ {event}) − schema keys`
    fn unknown_overflow(&self, record: &RawRecord) -> Result<Value> {
        let unknown_keys: Vec<&str> = record
            .properties
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(EVENT_COLUMN))
            .filter(|key| !self.schema.iter().any(|c| c.name == *key))
            .collect();

        if !unknown_keys.is_empty() {
            warn!("Unknown columns exist in record: {}", unknown_keys.join(", "));
        }

        let mut overflow = Map::new();
        for key in unknown_keys {
            overflow.insert(key.to_string(), self.extract_value(record, key)?);
        }
        Ok(Value::String(Value::Object(overflow).to_string()))
    }

    /// One JSON column of `record keys − reserved keys − schema keys`
    fn custom_overflow(&self, record: &RawRecord) -> Result<Value> {
        let mut overflow = Map::new();
        for (key, value) in &record.properties {
            if is_reserved(key) || self.schema.iter().any(|c| c.name == *key) {
                continue;
            }
            overflow.insert(key.clone(), value.clone());
        }
        Ok(Value::String(Value::Object(overflow).to_string()))
    }
}
