//! Resume state produced at the end of each run
//!
//! The host persists the state object and feeds it back into the next
//! invocation's config to continue where this run left off.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Progress captured by a completed (or partially completed) run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalState {
    /// Highest incremental marker value observed this run (epoch-ms
    /// for explicit markers, epoch-seconds for the default time field)
    pub latest_fetched_time: i64,

    /// Last date this run fetched, inclusive
    pub to_date: NaiveDate,
}

/// The config fields the next run overrides when resuming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextConfigDiff {
    /// First unfetched date: the day after this run's last date
    pub from_date: NaiveDate,

    /// Carried high-water mark
    pub latest_fetched_time: i64,
}

impl IncrementalState {
    pub fn new(latest_fetched_time: i64, to_date: NaiveDate) -> Self {
        Self {
            latest_fetched_time,
            to_date,
        }
    }

    /// Compute the config override for the next incremental run
    pub fn next_config_diff(&self) -> NextConfigDiff {
        NextConfigDiff {
            from_date: self.to_date + Days::new(1),
            latest_fetched_time: self.latest_fetched_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_next_config_diff_resumes_at_following_day() {
        let state = IncrementalState::new(1_600_000_000_000, date("2020-09-13"));
        let diff = state.next_config_diff();
        assert_eq!(diff.from_date, date("2020-09-14"));
        assert_eq!(diff.latest_fetched_time, 1_600_000_000_000);
    }

    #[test]
    fn test_next_config_diff_crosses_month_boundary() {
        let state = IncrementalState::new(0, date("2020-01-31"));
        assert_eq!(state.next_config_diff().from_date, date("2020-02-01"));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let state = IncrementalState::new(42, date("2020-09-13"));
        let json = serde_json::to_string(&state).unwrap();
        let back: IncrementalState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
