//! Timezone validation and epoch adjustment
//!
//! The export API encodes event times as epoch seconds in the project's
//! local timezone. Converting them to UTC requires the offset in effect
//! at that local instant, which is where DST transitions bite: a local
//! time inside a spring-forward gap does not exist and must be surfaced
//! as a distinguishable error instead of a silently wrong value.

use crate::error::{Error, Result};
use chrono::{DateTime, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{error, warn};

/// Resolve a timezone name to a known IANA timezone.
///
/// Logs the offending name at error level before failing, so bad config
/// is visible even when the caller swallows the error message.
pub fn resolve(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|e| {
        error!("'{name}' is invalid timezone");
        Error::config(format!("Failed to identify timezone from '{name}': {e}"))
    })
}

/// Validate a timezone name, discarding the resolved zone.
///
/// Run once up front so that later lookups can fall back softly.
pub fn validate(name: &str) -> Result<()> {
    resolve(name).map(|_| ())
}

/// Today's calendar date in the given timezone.
///
/// Falls back to the system date with a warning when the name does not
/// resolve. The timezone was already validated at config time, so a
/// failure here is an anomaly worth logging but not worth aborting a run.
pub fn today_in(name: &str) -> NaiveDate {
    match name.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).date_naive(),
        Err(_) => {
            warn!("Couldn't find timezone support for {name}");
            Utc::now().date_naive()
        }
    }
}

/// Adjust a local-time epoch to UTC by subtracting the offset in effect
/// for that instant in `tz`.
///
/// Returns [`Error::AmbiguousLocalTime`] when the local time falls in a
/// DST spring-forward gap. For fall-back ambiguity the earlier (DST)
/// interpretation wins, matching the source API's own encoding.
pub fn adjust_to_utc(epoch_seconds: i64, tz: Tz) -> Result<i64> {
    let naive = DateTime::from_timestamp(epoch_seconds, 0)
        .ok_or_else(|| Error::decode(format!("epoch {epoch_seconds} out of range")))?
        .naive_utc();

    match tz.offset_from_local_datetime(&naive) {
        LocalResult::Single(offset) => Ok(epoch_seconds - i64::from(offset.fix().local_minus_utc())),
        LocalResult::Ambiguous(earlier, _later) => {
            Ok(epoch_seconds - i64::from(earlier.fix().local_minus_utc()))
        }
        LocalResult::None => Err(Error::AmbiguousLocalTime {
            epoch: epoch_seconds,
            timezone: tz.name().to_string(),
        }),
    }
}

/// Adjust to UTC, nudging the local time forward one hour and retrying
/// once if it falls in a DST gap.
///
/// The gap is at most an hour wide, so a single nudge always lands on a
/// resolvable instant.
pub fn adjust_to_utc_nudged(epoch_seconds: i64, tz: Tz) -> Result<i64> {
    match adjust_to_utc(epoch_seconds, tz) {
        Err(Error::AmbiguousLocalTime { .. }) => adjust_to_utc(epoch_seconds + 3600, tz),
        other => other,
    }
}
