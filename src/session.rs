//! Trading-session partitioning
//!
//! Bars are grouped into sessions by the calendar date of their timestamp,
//! read in a fixed UTC offset. Validation here is the only place detection
//! can fail.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::{Error, OHLCVExt, Result, OHLCV};

/// Contiguous run of bars sharing one calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Session {
    pub date: NaiveDate,
    /// First bar of the session (inclusive)
    pub start: usize,
    /// One past the last bar of the session
    pub end: usize,
}

impl Session {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Build a fixed offset from whole minutes east of UTC.
pub fn utc_offset(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| Error::Configuration(format!("utc offset of {minutes} minutes is out of range")))
}

/// Calendar date of an epoch-millisecond timestamp in `offset`.
pub fn session_date(timestamp_ms: i64, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|utc| utc.with_timezone(&offset).date_naive())
}

/// Validate every bar and require strictly increasing timestamps.
/// Returns the timestamps on success.
pub fn validate_series<T: OHLCV>(bars: &[T]) -> Result<Vec<i64>> {
    let mut timestamps = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            Error::MalformedInput { reason, .. } => Error::MalformedInput { index: i, reason },
            other => other,
        })?;

        let ts = bar.timestamp().ok_or(Error::MalformedInput {
            index: i,
            reason: "missing timestamp",
        })?;

        if let Some(&prev) = timestamps.last() {
            if ts <= prev {
                return Err(Error::MalformedInput {
                    index: i,
                    reason: "timestamps not strictly increasing",
                });
            }
        }
        timestamps.push(ts);
    }

    Ok(timestamps)
}

/// Split already-validated timestamps into per-date sessions, in time order.
pub fn partition(timestamps: &[i64], offset: FixedOffset) -> Result<Vec<Session>> {
    let mut sessions: Vec<Session> = Vec::new();

    for (i, &ts) in timestamps.iter().enumerate() {
        let date = session_date(ts, offset).ok_or(Error::MalformedInput {
            index: i,
            reason: "timestamp outside representable range",
        })?;

        match sessions.last_mut() {
            Some(current) if current.date == date => current.end = i + 1,
            _ => sessions.push(Session {
                date,
                start: i,
                end: i + 1,
            }),
        }
    }

    Ok(sessions)
}
