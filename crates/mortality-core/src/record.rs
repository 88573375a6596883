//! Value types carried through parse, store, and query.
//!
//! Deaths are `Option<u32>`: `None` means the figure was not reported
//! (`:` in the source feed) and is kept distinct from a reported zero all
//! the way to the JSON response, where it serializes as `null`.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Highest week number a year can have under ISO 8601.
pub const MAX_ISO_WEEK: u8 = 53;

/// Deaths reported for one week of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyDeaths {
    /// ISO week number (1..=53).
    pub week: u8,
    /// Number of deaths, `None` when not reported.
    pub deaths: Option<u32>,
}

/// Deaths for one week, tagged with the year it belongs to.
///
/// This is the element type of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekYearDeaths {
    /// ISO week number (1..=53).
    pub week: u8,
    /// Calendar year.
    pub year: i32,
    /// Number of deaths, `None` when not reported.
    pub deaths: Option<u32>,
}

/// A `<year>W<week>` column label from the dataset header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekOfYear {
    /// Calendar year.
    pub year: i32,
    /// Week number as it appears in the label. May exceed 53 for the
    /// feed's sentinel columns.
    pub week: u32,
}

impl WeekOfYear {
    /// The week as an ISO week number, or `None` for columns outside
    /// 1..=53 (week 0 and the sentinels from week 54 up).
    pub fn iso_week(&self) -> Option<u8> {
        u8::try_from(self.week)
            .ok()
            .filter(|week| (1..=MAX_ISO_WEEK).contains(week))
    }
}

impl fmt::Display for WeekOfYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}W{:02}", self.year, self.week)
    }
}

/// Errors that can occur when parsing a week label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeekLabelError {
    /// The label does not split into exactly two parts on `W`.
    #[error("bad week of year value `{0}`")]
    Malformed(String),

    /// The year part is not an integer.
    #[error("extracting year value from `{label}`: {source}")]
    Year {
        /// The offending label.
        label: String,
        /// The underlying integer parse error.
        source: ParseIntError,
    },

    /// The week part is not a non-negative integer.
    #[error("extracting week value from `{label}`: {source}")]
    Week {
        /// The offending label.
        label: String,
        /// The underlying integer parse error.
        source: ParseIntError,
    },
}

impl FromStr for WeekOfYear {
    type Err = WeekLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let mut parts = label.split('W');

        let (Some(year), Some(week), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(WeekLabelError::Malformed(label.to_owned()));
        };

        let year = year.parse::<i32>().map_err(|source| WeekLabelError::Year {
            label: label.to_owned(),
            source,
        })?;
        let week = week.parse::<u32>().map_err(|source| WeekLabelError::Week {
            label: label.to_owned(),
            source,
        })?;

        Ok(Self { year, week })
    }
}
