//! Date range planning
//!
//! Computes the inclusive sequence of calendar dates a run will fetch,
//! anchored to "today" in the project's timezone, and derives the fetch
//! slices and schema-guess windows from it.

use crate::error::{Error, Result};
use crate::timezone;
use chrono::{Days, NaiveDate};
use tracing::{info, warn};

/// Default slice width in days
pub const DEFAULT_SLICE_RANGE: usize = 7;

/// Plans the inclusive date range for a run.
///
/// The range never includes dates after "today" in the target timezone.
/// Out-of-bounds dates are clipped with a warning, and a from-date in the
/// future yields an empty range rather than an error.
#[derive(Debug, Clone)]
pub struct DateRangePlanner {
    from_date: String,
    fetch_days: Option<i64>,
    timezone: String,
    back_fill_days: i64,
    today_override: Option<NaiveDate>,
}

impl DateRangePlanner {
    /// Create a planner for the given from-date, optional day count and
    /// timezone name
    pub fn new(
        from_date: impl Into<String>,
        fetch_days: Option<i64>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            from_date: from_date.into(),
            fetch_days,
            timezone: timezone.into(),
            back_fill_days: 0,
            today_override: None,
        }
    }

    /// Shift the start date back and widen the day count, for resuming an
    /// incremental run with a configured marker column
    #[must_use]
    pub fn with_back_fill(mut self, days: i64) -> Self {
        self.back_fill_days = days;
        self
    }

    /// Pin "today" instead of resolving it from the timezone (tests and
    /// replay runs)
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today_override = Some(today);
        self
    }

    /// Compute the ascending, contiguous, end-inclusive date sequence.
    ///
    /// Fails with a config error if the from-date does not parse or the
    /// day count is below 1. An empty result means there is nothing to
    /// fetch yet, not a failure.
    pub fn plan(&self) -> Result<Vec<NaiveDate>> {
        let mut from = parse_date(&self.from_date)?;

        if let Some(days) = self.fetch_days {
            if days < 1 {
                return Err(Error::invalid_value(
                    "fetch_days",
                    format!("'{days}' is invalid, specify a number bigger than 0"),
                ));
            }
        }

        let mut fetch_days = self.fetch_days;
        if self.back_fill_days > 0 {
            info!("Backfill days {}", self.back_fill_days);
            from = from - Days::new(self.back_fill_days as u64);
            fetch_days = fetch_days.map(|d| d + self.back_fill_days);
        }

        let today = self
            .today_override
            .unwrap_or_else(|| timezone::today_in(&self.timezone));

        if from > today {
            warn!("from_date {from} is after today {today}, no data to fetch yet");
            return Ok(Vec::new());
        }

        let raw_end = match fetch_days {
            Some(days) => from + Days::new((days - 1) as u64),
            None => today,
        };

        let range: Vec<NaiveDate> = date_sequence(from, raw_end);
        let (present, clipped): (Vec<_>, Vec<_>) = range.into_iter().partition(|d| *d <= today);

        if let (Some(first), Some(last)) = (clipped.first(), clipped.last()) {
            warn!("These dates are not accessible yet, ignored them: from {first} to {last}");
        }

        Ok(present)
    }
}

/// A contiguous sub-range of a planned date range, bounded by the
/// configured slice width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSlice {
    /// First date, inclusive
    pub from: NaiveDate,
    /// Last date, inclusive
    pub to: NaiveDate,
}

impl FetchSlice {
    /// The individual days of the slice, for the per-day fallback path
    pub fn days(&self) -> Vec<NaiveDate> {
        date_sequence(self.from, self.to)
    }
}

impl std::fmt::Display for FetchSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Split a planned range into slices of at most `width` days
pub fn slices(dates: &[NaiveDate], width: usize) -> Vec<FetchSlice> {
    let width = width.max(1);
    dates
        .chunks(width)
        .map(|chunk| FetchSlice {
            from: chunk[0],
            to: chunk[chunk.len() - 1],
        })
        .collect()
}

/// Candidate end dates for the schema-guess probe.
///
/// Successively larger windows from the start date, capped at yesterday.
/// The sampler walks these until one yields at least one record.
pub fn guess_to_dates(from: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let yesterday = today - Days::new(1);
    let mut dates: Vec<NaiveDate> = [1u64, 10, 100, 1_000, 10_000]
        .iter()
        .map(|offset| from + Days::new(*offset))
        .chain(std::iter::once(yesterday))
        .filter(|d| *d <= yesterday)
        .collect();
    // The candidates are ascending, so a window landing exactly on
    // yesterday would otherwise appear twice.
    dates.dedup();
    dates
}

/// Parse an ISO-8601 date string, failing with a config error
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|_| Error::invalid_value("from_date", format!("'{s}' is invalid date")))
}

fn date_sequence(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = from;
    while current <= to {
        dates.push(current);
        current = current + Days::new(1);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_plan_with_fetch_days_in_the_past() {
        let dates = DateRangePlanner::new("2010-01-01", Some(5), "Asia/Tokyo")
            .plan()
            .unwrap();
        assert_eq!(
            dates,
            vec![
                d("2010-01-01"),
                d("2010-01-02"),
                d("2010-01-03"),
                d("2010-01-04"),
                d("2010-01-05"),
            ]
        );
    }

    #[test]
    fn test_plan_without_fetch_days_runs_to_today() {
        let today = d("2020-06-10");
        let dates = DateRangePlanner::new("2020-06-05", None, "UTC")
            .with_today(today)
            .plan()
            .unwrap();
        assert_eq!(dates.first(), Some(&d("2020-06-05")));
        assert_eq!(dates.last(), Some(&today));
        assert_eq!(dates.len(), 6);
    }

    #[test]
    fn test_plan_is_strictly_ascending_and_contiguous() {
        let dates = DateRangePlanner::new("2019-02-26", Some(6), "UTC")
            .with_today(d("2019-12-31"))
            .plan()
            .unwrap();
        for pair in dates.windows(2) {
            assert_eq!(pair[1], pair[0] + Days::new(1));
        }
    }

    #[test]
    fn test_plan_clips_future_dates() {
        let today = d("2020-01-03");
        let dates = DateRangePlanner::new("2020-01-01", Some(10), "UTC")
            .with_today(today)
            .plan()
            .unwrap();
        assert_eq!(dates, vec![d("2020-01-01"), d("2020-01-02"), d("2020-01-03")]);
    }

    #[test]
    fn test_plan_today_is_includable() {
        let today = d("2020-01-03");
        let dates = DateRangePlanner::new("2020-01-03", Some(1), "UTC")
            .with_today(today)
            .plan()
            .unwrap();
        assert_eq!(dates, vec![today]);
    }

    #[test]
    fn test_plan_future_from_date_is_empty_not_error() {
        let today = d("2020-01-03");
        let dates = DateRangePlanner::new("2020-01-08", Some(10), "UTC")
            .with_today(today)
            .plan()
            .unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn test_plan_invalid_from_date() {
        let err = DateRangePlanner::new("ME21", Some(3), "UTC").plan().unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));
        assert!(err.to_string().contains("ME21"));
    }

    #[test]
    fn test_plan_zero_fetch_days() {
        let err = DateRangePlanner::new("2020-01-01", Some(0), "UTC")
            .plan()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));
    }

    #[test]
    fn test_plan_negative_fetch_days() {
        let err = DateRangePlanner::new("2020-01-01", Some(-1), "UTC")
            .plan()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));
    }

    #[test]
    fn test_plan_back_fill_widens_range() {
        let today = d("2020-02-01");
        let dates = DateRangePlanner::new("2020-01-10", Some(3), "UTC")
            .with_back_fill(5)
            .with_today(today)
            .plan()
            .unwrap();
        assert_eq!(dates.first(), Some(&d("2020-01-05")));
        assert_eq!(dates.len(), 8);
    }

    #[test]
    fn test_slices_default_width() {
        let dates = DateRangePlanner::new("2015-02-22", Some(9), "UTC")
            .with_today(d("2015-12-31"))
            .plan()
            .unwrap();
        let slices = slices(&dates, DEFAULT_SLICE_RANGE);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].from, d("2015-02-22"));
        assert_eq!(slices[0].to, d("2015-02-28"));
        assert_eq!(slices[1].from, d("2015-03-01"));
        assert_eq!(slices[1].to, d("2015-03-02"));
    }

    #[test]
    fn test_slice_days() {
        let slice = FetchSlice {
            from: d("2020-01-01"),
            to: d("2020-01-03"),
        };
        assert_eq!(
            slice.days(),
            vec![d("2020-01-01"), d("2020-01-02"), d("2020-01-03")]
        );
    }

    #[test]
    fn test_guess_to_dates_old_from() {
        let from = d("2000-01-01");
        let today = d("2000-02-01");
        let yesterday = d("2000-01-31");
        let dates = guess_to_dates(from, today);
        assert_eq!(dates, vec![d("2000-01-02"), d("2000-01-11"), yesterday]);
    }

    #[test]
    fn test_guess_to_dates_recent_from() {
        let today = d("2020-05-10");
        let from = today - Days::new(3);
        let dates = guess_to_dates(from, today);
        // Only from+1 and yesterday fit.
        assert_eq!(dates, vec![d("2020-05-08"), d("2020-05-09")]);
    }

    #[test]
    fn test_guess_to_dates_window_landing_on_yesterday_not_repeated() {
        let today = d("2020-05-10");
        let from = today - Days::new(2);
        let dates = guess_to_dates(from, today);
        assert_eq!(dates, vec![d("2020-05-09")]);
    }
}
