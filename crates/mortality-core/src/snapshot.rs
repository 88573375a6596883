//! Immutable parsed dataset plus its capture time.
//!
//! Snapshot files and archive objects are named after the capture time as
//! `YYYYMMDDThhmmss.tsv.gz`; [`timestamp_from_name`] and
//! [`snapshot_file_name`] are the two directions of that convention.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;

use crate::key::{KeyError, SeriesKey};
use crate::parser::{ParseError, SeriesMap, parse_weekly_deaths};
use crate::record::{WeekYearDeaths, WeeklyDeaths};

/// `chrono` format of the timestamp embedded in snapshot names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Extension of snapshot files and archive objects.
pub const SNAPSHOT_EXTENSION: &str = ".tsv.gz";

/// Errors that can occur when decoding a compressed snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The payload is not valid gzip or not valid UTF-8 text.
    #[error("failed to decompress snapshot: {0}")]
    Decompress(#[source] std::io::Error),

    /// The decompressed text is not a valid dataset.
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] ParseError),
}

/// A snapshot name does not carry a `YYYYMMDDThhmmss` timestamp.
#[derive(Debug, thiserror::Error)]
#[error("unparsable snapshot name `{name}`: {source}")]
pub struct TimestampError {
    /// The name that was rejected.
    pub name: String,
    /// The underlying `chrono` error.
    pub source: chrono::ParseError,
}

/// Parsed weekly deaths data captured at a point in time.
///
/// Never mutated after construction. The store hands out shared
/// references so a reader keeps a consistent view across a swap.
#[derive(Debug)]
pub struct Snapshot {
    data: SeriesMap,
    captured_at: DateTime<Utc>,
    years: Option<(i32, i32)>,
}

impl Snapshot {
    /// Build a snapshot from parsed series.
    ///
    /// Each series is sorted by week so hand-built data satisfies the
    /// same ordering as parser output.
    pub fn new(mut data: SeriesMap, captured_at: DateTime<Utc>) -> Self {
        for series in data.values_mut() {
            series.sort_by_key(|entry| entry.week);
        }

        let years = data.keys().map(SeriesKey::year).fold(None::<(i32, i32)>, |bounds, year| {
            Some(match bounds {
                None => (year, year),
                Some((low, high)) => (low.min(year), high.max(year)),
            })
        });

        Self {
            data,
            captured_at,
            years,
        }
    }

    /// Decompress and parse a gzip-compressed dataset.
    ///
    /// CPU-bound; async callers should run it on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Decompress`] for a bad gzip stream and
    /// [`SnapshotError::Parse`] for malformed content.
    pub fn from_gzip(bytes: &[u8], captured_at: DateTime<Utc>) -> Result<Self, SnapshotError> {
        let mut text = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut text)
            .map_err(SnapshotError::Decompress)?;

        let data = parse_weekly_deaths(&text)?;
        Ok(Self::new(data, captured_at))
    }

    /// When the underlying data was captured.
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Number of series in the snapshot.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the snapshot holds no series at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Look up a single series.
    pub fn series(&self, key: &SeriesKey) -> Option<&[WeeklyDeaths]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// Collect weekly deaths for every year in `year_from..=year_to`.
    ///
    /// Results are ordered by year, then by week. An empty range yields an
    /// empty result; years with no series contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when `country`, `age` or `gender` is empty and
    /// the range is non-empty.
    pub fn weekly_deaths(
        &self,
        country: &str,
        age: &str,
        gender: &str,
        year_from: i32,
        year_to: i32,
    ) -> Result<Vec<WeekYearDeaths>, KeyError> {
        let mut results = Vec::new();
        if year_from > year_to {
            return Ok(results);
        }

        SeriesKey::new(country, gender, age, year_from)?;

        // Years outside the data cannot match; skip them instead of
        // building a key per year of an arbitrarily wide range.
        let Some((low, high)) = self.years else {
            return Ok(results);
        };

        for year in year_from.max(low)..=year_to.min(high) {
            let key = SeriesKey::new(country, gender, age, year)?;
            if let Some(series) = self.data.get(&key) {
                results.extend(series.iter().map(|entry| WeekYearDeaths {
                    week: entry.week,
                    year,
                    deaths: entry.deaths,
                }));
            }
        }

        Ok(results)
    }
}

/// Recover the capture time from a snapshot file name or object key.
///
/// Only the last path segment is considered, and the `.tsv.gz` extension
/// is stripped before matching `YYYYMMDDThhmmss`.
///
/// # Errors
///
/// Returns [`TimestampError`] when the name does not match the pattern.
pub fn timestamp_from_name(name: &str) -> Result<DateTime<Utc>, TimestampError> {
    let base = Path::new(name)
        .file_name()
        .and_then(|file| file.to_str())
        .unwrap_or(name);
    let stem = base.strip_suffix(SNAPSHOT_EXTENSION).unwrap_or(base);

    NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| TimestampError {
            name: name.to_owned(),
            source,
        })
}

/// The file name or object key a snapshot captured at `captured_at` is
/// stored under.
pub fn snapshot_file_name(captured_at: DateTime<Utc>) -> String {
    format!("{}{SNAPSHOT_EXTENSION}", captured_at.format(TIMESTAMP_FORMAT))
}
