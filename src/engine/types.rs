//! Engine types
//!
//! The sink seam the host implements, plus run reporting.

use crate::error::Result;
use crate::state::IncrementalState;
use serde_json::Value;

/// Receives projected rows; implemented by the host's page builder
pub trait PageSink: Send {
    /// Append one output row
    fn add(&mut self, row: Vec<Value>) -> Result<()>;

    /// Flush whatever the sink buffered; called once at the end of a
    /// successful run
    fn finish(&mut self) -> Result<()>;
}

/// How much of the planned range a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Every planned slice
    #[default]
    Full,
    /// Stop after the first slice; used by interactive previews
    Preview,
}

/// Outcome of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Rows handed to the sink
    pub records_emitted: usize,
    /// Records dropped because a previous run already covered them
    pub records_skipped_seen: usize,
    /// Records dropped because their time fell in a DST gap
    pub records_skipped_dst_gap: usize,
    /// Slices fetched, including the per-day fallback ones
    pub slices_fetched: usize,
    /// Slices whose response was cut short but kept via partial import
    pub truncated_slices: usize,
    /// Resume state for the next run; absent in non-incremental mode
    /// or when the planned range was empty
    pub state: Option<IncrementalState>,
}

impl RunReport {
    /// The config override the host persists for the next run
    pub fn next_config_diff(&self) -> Option<crate::state::NextConfigDiff> {
        self.state.as_ref().map(IncrementalState::next_config_diff)
    }
}

/// Sink that collects rows in memory; handy for previews and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Collected rows, in emission order
    pub rows: Vec<Vec<Value>>,
    /// Whether `finish` ran
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageSink for MemorySink {
    fn add(&mut self, row: Vec<Value>) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
