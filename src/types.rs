use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{PERIOD_ROW_LIMIT, RANGE_ROW_LIMIT};

// ---------------------------------------------------------------------------
// Store entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: i64,
    pub station_id: i64,
    /// Label as registered, e.g. `MP₁₀ (µg/m³)`. Not necessarily canonical.
    pub parameter: String,
}

/// Immutable measurement produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub id: i64,
    pub sensor_id: i64,
    pub station_id: i64,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Analyst judgement on one raw reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub raw_reading_id: i64,
    pub is_valid: bool,
    pub justification: String,
    pub operator_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// The local calendar day `date` in `tz`, as a UTC range.
    pub fn local_day(date: NaiveDate, tz: Tz) -> Self {
        let start = local_midnight(date, tz);
        let end = date
            .succ_opt()
            .map(|next| local_midnight(next, tz))
            .unwrap_or(start + Duration::hours(24));
        Self { start, end }
    }
}

/// First instant of `date` in `tz`. Zones that skip midnight on a DST change
/// start the day at the first local time that exists.
fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    (0..=3)
        .map(|h| midnight + Duration::hours(h))
        .find_map(|local: NaiveDateTime| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "Last 24h")]
    Last24h,
    #[serde(rename = "Last 7d")]
    Last7d,
    #[serde(rename = "Last 30d")]
    Last30d,
    #[serde(rename = "Last 90d")]
    Last90d,
}

impl Period {
    pub fn hours(self) -> i64 {
        match self {
            Period::Last24h => 24,
            Period::Last7d => 168,
            Period::Last30d => 720,
            Period::Last90d => 2160,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Period::Last24h => "Last 24h",
            Period::Last7d => "Last 7d",
            Period::Last30d => "Last 30d",
            Period::Last90d => "Last 90d",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Last 24h" | "24h" => Ok(Period::Last24h),
            "Last 7d" | "7d" => Ok(Period::Last7d),
            "Last 30d" | "30d" => Ok(Period::Last30d),
            "Last 90d" | "90d" => Ok(Period::Last90d),
            other => Err(format!("unknown period '{other}'")),
        }
    }
}

/// What a reconciliation call reads: a named period ending now, or an
/// explicit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingWindow {
    Period(Period),
    Range(TimeRange),
}

impl ReadingWindow {
    /// Concrete range and row cap for this window evaluated at `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> (TimeRange, usize) {
        match self {
            ReadingWindow::Period(p) => (
                TimeRange::new(now - Duration::hours(p.hours()), now),
                PERIOD_ROW_LIMIT,
            ),
            ReadingWindow::Range(r) => (*r, RANGE_ROW_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
}

impl Granularity {
    /// Bucket width in minutes; `None` for the native resolution.
    pub fn interval_minutes(self) -> Option<u32> {
        match self {
            Granularity::OneMinute => None,
            Granularity::FifteenMinutes => Some(15),
            Granularity::OneHour => Some(60),
            Granularity::OneDay => Some(1440),
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1min" => Ok(Granularity::OneMinute),
            "15min" => Ok(Granularity::FifteenMinutes),
            "1h" => Ok(Granularity::OneHour),
            "24h" => Ok(Granularity::OneDay),
            other => Err(format!("unknown granularity '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciled rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Valid,
    Invalid,
    /// Awaiting an analyst decision.
    Pending,
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadingStatus::Valid => "valid",
            ReadingStatus::Invalid => "invalid",
            ReadingStatus::Pending => "pending",
        };
        write!(f, "{s}")
    }
}

/// Display-ready reading after merging it with its validation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRow {
    pub sequence_id: usize,
    /// Local time, `DISPLAY_DATETIME_FORMAT`.
    pub date_time: String,
    pub raw_value: String,
    /// `-` when the row is invalid.
    pub final_value: String,
    pub unit: String,
    pub status: ReadingStatus,
    pub justification: String,
    pub operator: String,
    pub raw_data_id: Option<i64>,
}

/// Bucket average; same shape as a classified row with no decision attached.
pub type AggregatedRow = ClassifiedRow;
