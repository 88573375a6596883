//! Snapshot lifecycle for the Eurostat weekly deaths dataset.
//!
//! This crate turns the raw `demo_r_mwk_05` bulk download (a gzip-compressed,
//! tab-separated table) into an immutable [`Snapshot`], keeps the current
//! snapshot in a [`SnapshotStore`] that can be hot-swapped while serving
//! concurrent readers, and answers range queries over it.
//!
//! # Architecture
//!
//! ```text
//! SnapshotSource (local | live | archive)
//!        |
//!        v
//!   parser -> Snapshot -> SnapshotStore <- QueryService <- HTTP layer
//! ```
//!
//! - [`parser`] builds a key-value map of weekly series from the raw text.
//! - [`source`] acquires a snapshot from disk, the live portal, or the
//!   object-storage [`archive`], with an ordered fallback chain.
//! - [`store`] holds the current snapshot behind a lock that only ever
//!   guards an [`Arc`](std::sync::Arc) pointer, never I/O.
//! - [`query`] validates request parameters and reads through the store.

pub mod archive;
pub mod key;
pub mod parser;
pub mod query;
pub mod record;
pub mod snapshot;
pub mod source;
pub mod store;

pub use archive::{
    ArchiveBackend, ArchiveError, CleanupReport, MemoryBucket, S3Bucket, SnapshotArchive,
};
pub use key::{KeyError, SeriesKey};
pub use parser::{ParseError, RowError, SeriesMap, WeekLabelError, parse_weekly_deaths};
pub use query::{
    FieldError, NOT_AN_INTEGER_MESSAGE, QueryError, QueryService, REQUIRED_MESSAGE,
    ValidationErrors, WeeklyDeathsParams, WeeklyDeathsRequest, WeeklyDeathsResponse,
};
pub use record::{WeekOfYear, WeekYearDeaths, WeeklyDeaths};
pub use snapshot::{
    Snapshot, SnapshotError, TimestampError, snapshot_file_name, timestamp_from_name,
};
pub use source::{
    DEFAULT_FETCH_TIMEOUT, EUROSTAT_WEEKLY_DEATHS_URL, LiveSource, LocalSource, SnapshotSource,
    SourceChain, SourceError,
};
pub use store::SnapshotStore;
