//! Data models for shieldstats.
//!
//! Every type here is a transient value: records are read from the
//! statistics store, transformed into chart points and totals, and handed
//! to the caller. Nothing in this module owns storage or carries identity
//! across calls.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One bucket of historical request activity.
///
/// A bucket usually covers one calendar hour. Records of a category are not
/// guaranteed to be sorted by `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Timestamp identifying the bucket.
    pub date: DateTime<Utc>,

    /// Number of requests observed in the bucket.
    pub request_count: i64,

    /// Estimated bandwidth saved by blocking, in kilobytes.
    ///
    /// Only meaningful for records of the [`StatisticsCategory::Blocked`] category.
    pub saved_kilobytes: i64,
}

impl RequestRecord {
    pub fn new(date: DateTime<Utc>, request_count: i64) -> Self {
        Self {
            date,
            request_count,
            saved_kilobytes: 0,
        }
    }

    pub fn with_saved_kilobytes(mut self, saved_kilobytes: i64) -> Self {
        self.saved_kilobytes = saved_kilobytes;
        self
    }
}

/// Truncate a timestamp to the start of its calendar hour.
///
/// This is the bucket granularity used when recording new activity.
pub fn hour_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(chrono::Duration::hours(1))
        .unwrap_or(timestamp)
}

/// The kind of requests a record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsCategory {
    /// Every request seen.
    #[default]
    #[serde(alias = "requests")]
    All,

    /// Requests that were blocked.
    Blocked,
}

impl StatisticsCategory {
    /// Every category, in a stable order.
    pub const ALL: [StatisticsCategory; 2] = [StatisticsCategory::All, StatisticsCategory::Blocked];

    /// Name used on the wire and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticsCategory::All => "all",
            StatisticsCategory::Blocked => "blocked",
        }
    }
}

impl fmt::Display for StatisticsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known statistics category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown statistics category '{0}'")]
pub struct ParseCategoryError(pub String);

impl FromStr for StatisticsCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "requests" => Ok(StatisticsCategory::All),
            "blocked" => Ok(StatisticsCategory::Blocked),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// A caller-selected reporting interval.
///
/// All windows except [`TimeWindow::AllTime`] end at the current moment and
/// have a fixed calendar width. `AllTime` derives its bounds from the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// The last 24 hours.
    #[default]
    #[serde(alias = "today", alias = "24h")]
    Day,

    /// The last 7 days.
    #[serde(alias = "7d")]
    Week,

    /// The last calendar month.
    #[serde(alias = "30d")]
    Month,

    /// The last 12 calendar months.
    Year,

    /// From the earliest to the latest recorded bucket.
    #[serde(alias = "alltime", alias = "all-time", alias = "total")]
    AllTime,
}

impl TimeWindow {
    /// Every window, shortest first.
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::Day,
        TimeWindow::Week,
        TimeWindow::Month,
        TimeWindow::Year,
        TimeWindow::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::AllTime => "all_time",
        }
    }

    pub fn is_all_time(&self) -> bool {
        matches!(self, TimeWindow::AllTime)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known time window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown time window '{0}' (expected day, week, month, year or all_time)")]
pub struct ParseWindowError(pub String);

impl FromStr for TimeWindow {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "today" | "24h" => Ok(TimeWindow::Day),
            "week" | "7d" => Ok(TimeWindow::Week),
            "month" | "30d" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all_time" | "alltime" | "all-time" | "total" => Ok(TimeWindow::AllTime),
            _ => Err(ParseWindowError(s.to_string())),
        }
    }
}

/// One plotted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Sequential index along the chart, not a timestamp.
    pub x: usize,

    /// Summed request count for this index.
    pub y: i64,
}

/// Plot-ready points for one category plus the window's totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownsampleResult {
    /// At most [`crate::aggregation::MAX_CHART_POINTS`] points, in order.
    pub points: Vec<ChartPoint>,

    /// Sum of request counts over the records inside the window.
    pub request_total: i64,

    /// Sum of saved kilobytes over the records inside the window.
    pub saved_kilobytes: i64,
}

impl DownsampleResult {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.request_total == 0 && self.saved_kilobytes == 0
    }
}

/// Counters summed over every stored record, regardless of window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStats {
    /// Requests seen.
    pub requests_total: i64,

    /// Requests blocked.
    pub blocked_total: i64,

    /// Estimated data saved by blocking, in kilobytes.
    pub saved_kilobytes: i64,
}

/// Request body for POST /records.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRequest {
    /// Category to record the activity under.
    pub category: StatisticsCategory,

    /// When the activity happened. Defaults to the server's current time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Number of requests (defaults to 1).
    #[serde(default = "default_request_count")]
    pub request_count: i64,

    /// Saved kilobytes (defaults to 0).
    #[serde(default)]
    pub saved_kilobytes: i64,
}

fn default_request_count() -> i64 {
    1
}

/// Largest count a single record may carry.
///
/// Keeps bucket sums and window totals far away from `i64` overflow.
pub const MAX_RECORD_COUNT: i64 = 1_000_000_000_000;

/// Returned when a record's counts are negative or larger than [`MAX_RECORD_COUNT`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} must be between 0 and {max}, got {value}", max = MAX_RECORD_COUNT)]
pub struct InvalidCountError {
    pub field: &'static str,
    pub value: i64,
}

fn check_count(field: &'static str, value: i64) -> Result<(), InvalidCountError> {
    if (0..=MAX_RECORD_COUNT).contains(&value) {
        Ok(())
    } else {
        Err(InvalidCountError { field, value })
    }
}

impl RecordRequest {
    /// Reject counts outside `0..=MAX_RECORD_COUNT`.
    pub fn validate(&self) -> Result<(), InvalidCountError> {
        check_count("request_count", self.request_count)?;
        check_count("saved_kilobytes", self.saved_kilobytes)
    }
}

/// Query parameters for GET /chart.
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    /// Reporting window (default: day).
    #[serde(default)]
    pub window: TimeWindow,

    /// Category to chart (default: all).
    #[serde(default)]
    pub category: StatisticsCategory,
}

/// Request body for PUT /chart/live/window.
#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub window: TimeWindow,
}
