//! Parser for the Eurostat weekly deaths TSV table.
//!
//! # Format
//!
//! ```text
//! age,sex,unit,geo\time<TAB>2021W03<TAB>2021W02<TAB>2021W01
//! TOTAL,F,NR,AD<TAB>:<TAB>:<TAB>1
//! TOTAL,M,NR,GB<TAB>25 p<TAB>13<TAB>:
//! ```
//!
//! The first header cell is a placeholder; every other header cell is a
//! `<year>W<week>` label. The first cell of each data row holds four
//! comma-separated metadata fields (`age,gender,unit,country`) and the
//! remaining cells line up with the header labels.
//!
//! Parsing is all-or-nothing: any error discards the whole result.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::key::{KeyError, SeriesKey};
use crate::record::{WeekOfYear, WeeklyDeaths};

pub use crate::record::WeekLabelError;

/// Weekly series keyed by [`SeriesKey`], each sorted by week ascending.
pub type SeriesMap = HashMap<SeriesKey, Vec<WeeklyDeaths>>;

/// Errors that abort a parse.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The input has no header line.
    #[error("input is empty, expected a header line")]
    EmptyInput,

    /// A header cell is not a valid week label.
    #[error("header column {column}: {source}")]
    Header {
        /// 1-based header column (the placeholder is column 0).
        column: usize,
        /// Why the label was rejected.
        source: WeekLabelError,
    },

    /// Two header cells name the same week.
    #[error("header column {column}: week {week} appears more than once")]
    DuplicateWeek {
        /// 1-based header column of the repeated label.
        column: usize,
        /// The repeated week.
        week: WeekOfYear,
    },

    /// A data row could not be parsed.
    #[error("parsing line no {row}: {source}")]
    Row {
        /// 1-based data row index (the header is not counted).
        row: usize,
        /// Why the row was rejected.
        source: RowError,
    },
}

/// Errors for a single data row.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// The metadata cell does not have exactly four fields.
    #[error("bad line metadata `{metadata}`: expected 4 fields, found {found}")]
    MetadataFields {
        /// The raw metadata cell.
        metadata: String,
        /// Number of fields found.
        found: usize,
    },

    /// The metadata produced an invalid series key.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A cell is neither a number nor an unreported marker.
    #[error("column {column}: unparsable deaths value `{value}`")]
    Deaths {
        /// 1-based column of the cell.
        column: usize,
        /// The cell after marker stripping.
        value: String,
    },

    /// The row has a value in a column the header does not define.
    #[error("column {column} has no week label in the header")]
    UnexpectedColumn {
        /// 1-based column of the cell.
        column: usize,
    },

    /// Another row already carried the same metadata.
    #[error("duplicate series for age {age}, gender {gender}, country {country}")]
    DuplicateSeries {
        /// Age band code.
        age: String,
        /// Gender code.
        gender: String,
        /// Country code.
        country: String,
    },
}

/// Metadata fields of one data row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowMetadata {
    age: String,
    gender: String,
    country: String,
}

/// Parse the decompressed dataset into weekly series.
///
/// Blank lines are skipped. Columns for week 54 and above are sentinel
/// columns in the feed and are dropped without validating their cells.
///
/// # Errors
///
/// Returns [`ParseError`] for a malformed header or the first malformed
/// row. No partial result is returned.
pub fn parse_weekly_deaths(input: &str) -> Result<SeriesMap, ParseError> {
    let mut lines = input.lines();
    let header = lines.next().ok_or(ParseError::EmptyInput)?;
    let columns = week_columns(header)?;

    let mut results = SeriesMap::new();
    let mut seen = HashSet::new();

    for (index, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        parse_row(line, &columns, &mut seen, &mut results).map_err(|source| ParseError::Row {
            row: index.saturating_add(1),
            source,
        })?;
    }

    for series in results.values_mut() {
        series.sort_by_key(|entry| entry.week);
    }

    debug!(
        columns = columns.len(),
        series = results.len(),
        "weekly deaths data parsed"
    );

    Ok(results)
}

/// Parse one deaths cell.
///
/// Markers `p` (provisional) and `:` (not available) are stripped and the
/// rest trimmed. An empty remainder means the value was not reported.
///
/// # Errors
///
/// Returns the stripped value when it is not a non-negative integer.
pub fn parse_deaths(cell: &str) -> Result<Option<u32>, String> {
    let stripped = cell.replace(['p', ':'], "");
    let value = stripped.trim();

    if value.is_empty() {
        return Ok(None);
    }

    value.parse::<u32>().map(Some).map_err(|_parse_err| value.to_owned())
}

/// Build the position index of week labels from the header line.
///
/// Element `i` describes data column `i + 1`.
fn week_columns(header: &str) -> Result<Vec<WeekOfYear>, ParseError> {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();

    for (index, label) in header.split('\t').enumerate().skip(1) {
        let week = label
            .parse::<WeekOfYear>()
            .map_err(|source| ParseError::Header {
                column: index,
                source,
            })?;
        if !seen.insert(week) {
            return Err(ParseError::DuplicateWeek {
                column: index,
                week,
            });
        }
        columns.push(week);
    }

    Ok(columns)
}

fn parse_metadata(cell: &str) -> Result<RowMetadata, RowError> {
    let cell = cell.trim();
    let fields: Vec<&str> = cell.split(',').collect();

    let [age, gender, _unit, country] = fields.as_slice() else {
        return Err(RowError::MetadataFields {
            metadata: cell.to_owned(),
            found: fields.len(),
        });
    };

    Ok(RowMetadata {
        age: (*age).to_owned(),
        gender: (*gender).to_owned(),
        country: (*country).to_owned(),
    })
}

fn parse_row(
    line: &str,
    columns: &[WeekOfYear],
    seen: &mut HashSet<RowMetadata>,
    results: &mut SeriesMap,
) -> Result<(), RowError> {
    let mut cells = line.split('\t');
    let metadata = parse_metadata(cells.next().unwrap_or_default())?;

    // Validate the key components once so an empty field fails even when
    // every column of the row is a sentinel column.
    SeriesKey::new(&metadata.country, &metadata.gender, &metadata.age, 0)?;

    if seen.contains(&metadata) {
        return Err(RowError::DuplicateSeries {
            age: metadata.age,
            gender: metadata.gender,
            country: metadata.country,
        });
    }

    for (index, cell) in cells.enumerate() {
        let column = index.saturating_add(1);

        let Some(week_of_year) = columns.get(index) else {
            if cell.trim().is_empty() {
                continue;
            }
            return Err(RowError::UnexpectedColumn { column });
        };

        let Some(week) = week_of_year.iso_week() else {
            continue;
        };

        let deaths = parse_deaths(cell).map_err(|value| RowError::Deaths { column, value })?;
        let key = SeriesKey::new(
            &metadata.country,
            &metadata.gender,
            &metadata.age,
            week_of_year.year,
        )?;

        results
            .entry(key)
            .or_default()
            .push(WeeklyDeaths { week, deaths });
    }

    seen.insert(metadata);
    Ok(())
}
