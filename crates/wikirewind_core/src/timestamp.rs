use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// Timestamp layout accepted by `rvstart` and returned by the revisions API.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A point in time that may or may not carry a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointInTime {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl PointInTime {
    /// Naive values are labelled UTC as-is; aware values are converted.
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            Self::Naive(value) => value.and_utc(),
            Self::Aware(value) => value.with_timezone(&Utc),
        }
    }
}

impl From<NaiveDateTime> for PointInTime {
    fn from(value: NaiveDateTime) -> Self {
        Self::Naive(value)
    }
}

impl From<NaiveDate> for PointInTime {
    fn from(value: NaiveDate) -> Self {
        Self::Naive(value.and_time(NaiveTime::MIN))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for PointInTime {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Aware(value.fixed_offset())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{value}' is not a valid ISO 8601 date or datetime")]
pub struct CutoffDateError {
    pub value: String,
}

pub fn format_timestamp(instant: impl Into<PointInTime>) -> String {
    instant.into().to_utc().format(WIRE_FORMAT).to_string()
}

/// Parse a user supplied cutoff such as `2023-06-01`, `2023-06-01T12:30:00`
/// or `2023-06-01T12:30:00+02:00`.
pub fn parse_cutoff_date(value: &str) -> Result<PointInTime, CutoffDateError> {
    let invalid = || CutoffDateError {
        value: value.to_string(),
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.into());
    }

    let with_offset = match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(rest) => format!("{rest}+00:00"),
        None => trimmed.to_string(),
    };
    for format in AWARE_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&with_offset, format) {
            return Ok(PointInTime::Aware(parsed));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.into());
        }
    }

    Err(invalid())
}
