//! Time windows for content fingerprints

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named time range a fingerprint is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Whole table
    All,

    /// Rows dated on or after the first day of the as-of month
    ThisMonth,

    /// Rows dated in the calendar month before the as-of month
    LastMonth,

    /// Rows dated before the first day of last month
    BeforeLastMonth,
}

impl Window {
    /// Every window, in evaluation order
    pub const ALL: [Window; 4] = [
        Window::All,
        Window::ThisMonth,
        Window::LastMonth,
        Window::BeforeLastMonth,
    ];

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ThisMonth => "this_month",
            Self::LastMonth => "last_month",
            Self::BeforeLastMonth => "before_last_month",
        }
    }

    /// Whether the window filters on a date column
    pub fn requires_date_column(&self) -> bool {
        !matches!(self, Self::All)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|w| w.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "Unknown window '{}'. Expected one of: all, this_month, last_month, before_last_month",
                    s
                )
            })
    }
}

/// Month boundaries derived from an explicit reference instant
///
/// Nothing in the engine reads the wall clock; callers pass `as_of` so runs
/// are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Reference instant
    pub as_of: DateTime<Utc>,

    /// First day of the as-of month
    pub this_month_start: NaiveDate,

    /// First day of the month before
    pub last_month_start: NaiveDate,
}

impl WindowBounds {
    /// Compute the boundaries for a reference instant
    pub fn from_as_of(as_of: DateTime<Utc>) -> Self {
        let this_month_start = first_of_month(as_of.date_naive());
        let last_month_start = first_of_month(this_month_start - Days::new(1));

        Self {
            as_of,
            this_month_start,
            last_month_start,
        }
    }

    /// Placeholder values for window predicate templates
    pub fn placeholders(&self) -> [(&'static str, String); 2] {
        [
            ("this_month_start", self.this_month_start.format("%Y-%m-%d").to_string()),
            ("last_month_start", self.last_month_start.format("%Y-%m-%d").to_string()),
        ]
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}
