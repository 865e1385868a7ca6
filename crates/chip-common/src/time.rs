//! Time handling for acquisition dates and search windows.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChipError, ChipResult};

/// Parse an ISO 8601 timestamp into UTC.
///
/// Accepts a full RFC 3339 timestamp, a naive datetime (assumed UTC),
/// or a bare date (midnight UTC).
pub fn parse_utc_datetime(s: &str) -> ChipResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S")
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(ChipError::input(format!("unparseable UTC datetime: {}", s)))
}

/// An inclusive acquisition-time search window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window extending `tolerance_days` forward from an acquisition date.
    pub fn from_date(date: DateTime<Utc>, tolerance_days: i64) -> Self {
        Self {
            start: date,
            end: date + Duration::days(tolerance_days),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}
