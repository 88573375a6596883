//! Snapshot acquisition: local file, live download, or archive.
//!
//! Sources share one capability, [`SnapshotSource::fetch`], dispatched over
//! a closed enum. A [`SourceChain`] tries several sources in order and
//! returns the first snapshot obtained.
//!
//! Decompression and parsing are CPU-bound and always run on the blocking
//! thread pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, SnapshotArchive};
use crate::snapshot::{Snapshot, SnapshotError, TimestampError, timestamp_from_name};

/// Eurostat bulk download of the `demo_r_mwk_05` weekly deaths dataset.
pub const EUROSTAT_WEEKLY_DEATHS_URL: &str = "https://ec.europa.eu/eurostat/estat-navtree-portlet-prod/BulkDownloadListing?file=data/demo_r_mwk_05.tsv.gz";

/// Default bound on a live download, connection through last byte.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when acquiring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading a local snapshot file failed.
    #[error("reading {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The payload could not be decompressed or parsed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The file or object name carries no capture timestamp.
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    /// The HTTP client could not be built.
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The live download failed at the transport level.
    #[error("GET {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// The underlying client error.
        source: reqwest::Error,
    },

    /// The live download answered with a non-success status.
    #[error("GET {url} returned {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status received.
        status: StatusCode,
    },

    /// The live download did not complete in time.
    #[error("GET {url} timed out after {timeout:?}")]
    Timeout {
        /// Requested URL.
        url: String,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The archive could not produce a snapshot.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The decode task panicked or was cancelled.
    #[error("snapshot decode task failed: {0}")]
    Task(#[from] JoinError),

    /// A source chain was built with no sources.
    #[error("no snapshot sources configured")]
    NoSources,
}

/// Decompress and parse `body` on the blocking pool.
pub(crate) async fn decode_snapshot(
    body: Bytes,
    captured_at: DateTime<Utc>,
) -> Result<Snapshot, SourceError> {
    let snapshot =
        tokio::task::spawn_blocking(move || Snapshot::from_gzip(&body, captured_at)).await??;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Local file
// ---------------------------------------------------------------------------

/// A snapshot file on disk named `YYYYMMDDThhmmss.tsv.gz`.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    /// Source reading the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, decompress, and parse the file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Timestamp`] when the file name does not carry
    /// a timestamp, [`SourceError::Io`] when it cannot be read, and
    /// [`SourceError::Snapshot`] when its content is invalid.
    pub async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let captured_at = timestamp_from_name(&self.path.to_string_lossy())?;

        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), bytes = body.len(), "Read local snapshot");
        decode_snapshot(Bytes::from(body), captured_at).await
    }
}

// ---------------------------------------------------------------------------
// Live download
// ---------------------------------------------------------------------------

/// Downloads the dataset over HTTP.
///
/// When an archive is attached, each successfully parsed download is
/// persisted to it on a detached task.
#[derive(Debug, Clone)]
pub struct LiveSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    archive: Option<SnapshotArchive>,
}

impl LiveSource {
    /// Source downloading from `url`, bounding each download by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Client`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
            archive: None,
        })
    }

    /// Persist every fetched payload to `archive`.
    #[must_use]
    pub fn with_persistence(mut self, archive: SnapshotArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// URL the dataset is downloaded from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download, decompress, and parse the dataset.
    ///
    /// The snapshot is stamped with the time the last body byte arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Timeout`], [`SourceError::Http`] or
    /// [`SourceError::HttpStatus`] for download failures and
    /// [`SourceError::Snapshot`] for invalid content.
    pub async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let (body, captured_at) = self.download().await?;
        let snapshot = decode_snapshot(body.clone(), captured_at).await?;

        info!(
            url = %self.url,
            series = snapshot.len(),
            %captured_at,
            "Fetched live snapshot"
        );

        if let Some(archive) = &self.archive {
            archive.persist_detached(body, captured_at);
        }

        Ok(snapshot)
    }

    async fn download(&self) -> Result<(Bytes, DateTime<Utc>), SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        Ok((body, Utc::now()))
    }

    fn request_error(&self, source: reqwest::Error) -> SourceError {
        if source.is_timeout() {
            SourceError::Timeout {
                url: self.url.clone(),
                timeout: self.timeout,
            }
        } else {
            SourceError::Http {
                url: self.url.clone(),
                source,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Any place a snapshot can come from.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    /// A file on disk.
    Local(LocalSource),
    /// A live download.
    Live(LiveSource),
    /// The latest archived snapshot.
    Archive(SnapshotArchive),
}

impl SnapshotSource {
    /// Acquire a snapshot from this source.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying source reports.
    pub async fn fetch(&self) -> Result<Snapshot, SourceError> {
        match self {
            Self::Local(source) => source.fetch().await,
            Self::Live(source) => source.fetch().await,
            Self::Archive(archive) => archive.latest_snapshot().await,
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Live(_) => "live",
            Self::Archive(_) => "archive",
        }
    }
}

/// Ordered fallback over several sources.
#[derive(Debug, Clone, Default)]
pub struct SourceChain {
    sources: Vec<SnapshotSource>,
}

impl SourceChain {
    /// Chain trying `sources` in the given order.
    pub const fn new(sources: Vec<SnapshotSource>) -> Self {
        Self { sources }
    }

    /// Names of the chained sources, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(SnapshotSource::name).collect()
    }

    /// Try each source in turn and return the first snapshot obtained.
    ///
    /// # Errors
    ///
    /// Returns the last source's error when every source fails, or
    /// [`SourceError::NoSources`] for an empty chain.
    pub async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let mut last_error = SourceError::NoSources;

        for source in &self.sources {
            match source.fetch().await {
                Ok(snapshot) => {
                    info!(
                        source = source.name(),
                        captured_at = %snapshot.captured_at(),
                        "Snapshot acquired"
                    );
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Snapshot source failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::snapshot::tests::gzip;

    const DATASET: &str = "age,sex,unit,geo\\time\t2021W02\t2021W01\nTOTAL,F,NR,AD\t3\t1\n";

    fn write_snapshot(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn local_source_reads_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "20210112T012012.tsv.gz", &gzip(DATASET));

        let snapshot = LocalSource::new(path).fetch().await.unwrap();
        assert_eq!(
            snapshot.captured_at(),
            Utc.with_ymd_and_hms(2021, 1, 12, 1, 20, 12).unwrap()
        );
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn local_source_rejects_untimestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "latest.tsv.gz", &gzip(DATASET));

        let err = LocalSource::new(path).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Timestamp(_)));
    }

    #[tokio::test]
    async fn local_source_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20210112T012012.tsv.gz");

        let err = LocalSource::new(&path).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Io { path: p, .. } if p == path));
    }

    #[tokio::test]
    async fn local_source_reports_corrupt_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "20210112T012012.tsv.gz", b"plain text");

        let err = LocalSource::new(path).fetch().await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::Snapshot(SnapshotError::Decompress(_))
        ));
    }

    #[tokio::test]
    async fn chain_falls_through_to_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_snapshot(dir.path(), "20220101T000000.tsv.gz", &gzip(DATASET));

        let chain = SourceChain::new(vec![
            SnapshotSource::Local(LocalSource::new(dir.path().join("missing"))),
            SnapshotSource::Archive(SnapshotArchive::in_memory(DEFAULT_FETCH_TIMEOUT)),
            SnapshotSource::Local(LocalSource::new(good)),
        ]);

        assert_eq!(chain.names(), vec!["local", "archive", "local"]);
        let snapshot = chain.fetch().await.unwrap();
        assert_eq!(
            snapshot.captured_at(),
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn chain_returns_last_error_when_all_fail() {
        let dir = tempfile::tempdir().unwrap();
        let chain = SourceChain::new(vec![
            SnapshotSource::Local(LocalSource::new(dir.path().join("missing"))),
            SnapshotSource::Archive(SnapshotArchive::in_memory(DEFAULT_FETCH_TIMEOUT)),
        ]);

        let err = chain.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Archive(ArchiveError::BucketEmpty)));
    }

    #[tokio::test]
    async fn empty_chain_has_no_sources() {
        let err = SourceChain::default().fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::NoSources));
    }
}
