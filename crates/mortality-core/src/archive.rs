//! Object-storage archive of compressed snapshots.
//!
//! Every archived object is a raw `demo_r_mwk_05` download stored under
//! `YYYYMMDDThhmmss.tsv.gz`. The archive can:
//!
//! - pick the chronologically latest object and load it as a [`Snapshot`],
//! - persist a freshly downloaded payload (optionally as a detached task),
//! - delete everything but the newest N objects.
//!
//! Storage is reached through [`ArchiveBackend`], an enum over the S3 client
//! and an in-memory bucket. Every storage call is bounded by the archive's
//! timeout.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::snapshot::{Snapshot, snapshot_file_name, timestamp_from_name};
use crate::source::{SourceError, decode_snapshot};

/// Errors that can occur when talking to the snapshot archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The listing returned no objects at all.
    #[error("snapshot archive is empty")]
    BucketEmpty,

    /// The listing returned objects but none is named after a timestamp.
    #[error("none of the {count} archived objects has a parsable snapshot name")]
    NoParsableObjects {
        /// Number of objects in the listing.
        count: usize,
    },

    /// The requested object does not exist.
    #[error("archived object `{0}` not found")]
    ObjectNotFound(String),

    /// The storage backend reported a failure.
    #[error("archive {operation} failed: {message}")]
    Storage {
        /// Storage operation that failed (`list`, `get`, `put`, `delete`).
        operation: &'static str,
        /// Backend error, including its source chain.
        message: String,
    },

    /// The storage call did not finish in time.
    #[error("archive {operation} timed out after {timeout:?}")]
    Timeout {
        /// Storage operation that timed out.
        operation: &'static str,
        /// The bound that was exceeded.
        timeout: Duration,
    },
}

/// Outcome of [`SnapshotArchive::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Objects deleted.
    pub deleted: usize,
    /// Deletions that failed.
    pub failed: usize,
    /// Most recent objects left in place.
    pub kept: usize,
}

impl CleanupReport {
    /// Whether every attempted deletion succeeded.
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn tally<I>(kept: usize, outcomes: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (deleted, failed) = outcomes
            .into_iter()
            .fold((0_usize, 0_usize), |(deleted, failed), ok| {
                if ok {
                    (deleted.saturating_add(1), failed)
                } else {
                    (deleted, failed.saturating_add(1))
                }
            });

        Self {
            deleted,
            failed,
            kept,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage backends
// ---------------------------------------------------------------------------

/// Where archived snapshots live.
#[derive(Debug, Clone)]
pub enum ArchiveBackend {
    /// An S3 bucket.
    S3(S3Bucket),
    /// A process-local bucket, used for tests and local runs.
    Memory(MemoryBucket),
}

impl ArchiveBackend {
    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::S3(_) => "s3",
            Self::Memory(_) => "memory",
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, ArchiveError> {
        match self {
            Self::S3(bucket) => bucket.list_keys().await,
            Self::Memory(bucket) => Ok(bucket.list_keys().await),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArchiveError> {
        match self {
            Self::S3(bucket) => bucket.get(key).await,
            Self::Memory(bucket) => bucket.get(key).await,
        }
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), ArchiveError> {
        match self {
            Self::S3(bucket) => bucket.put(key, body).await,
            Self::Memory(bucket) => {
                bucket.put(key, body).await;
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        match self {
            Self::S3(bucket) => bucket.delete(key).await,
            Self::Memory(bucket) => bucket.delete(key).await,
        }
    }
}

/// An S3 bucket holding archived snapshots at its root.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Bucket {
    /// Wrap an existing S3 client.
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the standard AWS environment, profile and
    /// instance-metadata credential chain.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = Box::pin(aws_config::load_from_env()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }

    /// Name of the bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_keys(&self) -> Result<Vec<String>, ArchiveError> {
        let mut keys = Vec::new();
        let mut continuation = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| storage_error("list", &e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(ToOwned::to_owned)),
            );

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_owned()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArchiveError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                    ArchiveError::ObjectNotFound(key.to_owned())
                } else {
                    storage_error("get", &e)
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| storage_error("get", &e))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), ArchiveError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| storage_error("put", &e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("delete", &e))?;
        Ok(())
    }
}

fn storage_error<E>(operation: &'static str, err: &E) -> ArchiveError
where
    E: std::error::Error,
{
    ArchiveError::Storage {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

/// A bucket kept in process memory. Clones share the same objects.
///
/// Objects can be locked against deletion, the way S3 object lock retains
/// them, so cleanup failures can be exercised without a real bucket.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucket {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    locked: Arc<RwLock<BTreeSet<String>>>,
}

impl MemoryBucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later deletion of `key` fail.
    pub async fn lock(&self, key: impl Into<String>) {
        self.locked.write().await.insert(key.into());
    }

    async fn list_keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArchiveError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ArchiveError::ObjectNotFound(key.to_owned()))
    }

    async fn put(&self, key: &str, body: Bytes) {
        self.objects.write().await.insert(key.to_owned(), body);
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        if self.locked.read().await.contains(key) {
            return Err(ArchiveError::Storage {
                operation: "delete",
                message: format!("object `{key}` is locked"),
            });
        }
        self.objects.write().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// The snapshot archive: a storage backend plus a per-call timeout.
///
/// Cheap to clone; clones share the backend.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    backend: ArchiveBackend,
    timeout: Duration,
}

impl SnapshotArchive {
    /// Create an archive over `backend`, bounding every storage call by
    /// `timeout`.
    pub const fn new(backend: ArchiveBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Archive in the named S3 bucket, credentials from the environment.
    pub async fn s3(bucket: &str, timeout: Duration) -> Self {
        Self::new(
            ArchiveBackend::S3(S3Bucket::from_env(bucket).await),
            timeout,
        )
    }

    /// Archive over a fresh in-memory bucket.
    pub fn in_memory(timeout: Duration) -> Self {
        Self::new(ArchiveBackend::Memory(MemoryBucket::new()), timeout)
    }

    /// The storage backend.
    pub const fn backend(&self) -> &ArchiveBackend {
        &self.backend
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ArchiveError>
    where
        F: Future<Output = Result<T, ArchiveError>>,
    {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ArchiveError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    /// Every object key in the archive, in backend order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Storage`] or [`ArchiveError::Timeout`].
    pub async fn list_keys(&self) -> Result<Vec<String>, ArchiveError> {
        self.bounded("list", self.backend.list_keys()).await
    }

    /// Raw bytes of one archived object.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::ObjectNotFound`] when `key` does not exist.
    pub async fn get(&self, key: &str) -> Result<Bytes, ArchiveError> {
        self.bounded("get", self.backend.get(key)).await
    }

    /// Key of the chronologically latest archived snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::BucketEmpty`] or
    /// [`ArchiveError::NoParsableObjects`] when there is nothing to pick.
    pub async fn latest_key(&self) -> Result<String, ArchiveError> {
        let keys = self.list_keys().await?;
        latest_key(&keys).map(ToOwned::to_owned)
    }

    /// Download and parse the latest archived snapshot.
    ///
    /// The snapshot's capture time is the timestamp in its object key.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Archive`] for storage failures and
    /// [`SourceError::Snapshot`] when the object does not decode.
    pub async fn latest_snapshot(&self) -> Result<Snapshot, SourceError> {
        let key = self.latest_key().await?;
        let captured_at = timestamp_from_name(&key)?;
        let body = self.get(&key).await?;

        debug!(%key, bytes = body.len(), "Downloaded archived snapshot");
        decode_snapshot(body, captured_at).await
    }

    /// Store a compressed payload under the name derived from
    /// `captured_at`, returning that key.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Storage`] or [`ArchiveError::Timeout`].
    pub async fn persist(
        &self,
        body: Bytes,
        captured_at: DateTime<Utc>,
    ) -> Result<String, ArchiveError> {
        let key = snapshot_file_name(captured_at);
        self.bounded("put", self.backend.put(&key, body)).await?;
        Ok(key)
    }

    /// Persist on a background task. Failures are logged, never returned.
    ///
    /// The handle may be dropped; it is only useful to wait for completion.
    pub fn persist_detached(&self, body: Bytes, captured_at: DateTime<Utc>) -> JoinHandle<()> {
        let archive = self.clone();
        tokio::spawn(async move {
            match archive.persist(body, captured_at).await {
                Ok(key) => info!(%key, backend = archive.backend.name(), "Persisted snapshot"),
                Err(e) => error!(error = %e, "Failed to persist snapshot"),
            }
        })
    }

    /// Delete every archived snapshot except the `keep` most recent.
    ///
    /// Deletions run concurrently; a failed deletion is counted and logged
    /// without stopping the rest. Objects whose names are not snapshot
    /// timestamps are never touched. An empty archive is nothing to do.
    ///
    /// # Errors
    ///
    /// Returns an error only when the listing itself fails.
    pub async fn cleanup(&self, keep: usize) -> Result<CleanupReport, ArchiveError> {
        let keys = self.list_keys().await?;
        let sorted = sort_snapshot_keys(&keys);

        let cutoff = sorted.len().saturating_sub(keep);
        let (stale, fresh) = sorted.split_at(cutoff);

        if stale.is_empty() {
            debug!(kept = fresh.len(), "No archived snapshots to clean up");
            return Ok(CleanupReport {
                kept: fresh.len(),
                ..CleanupReport::default()
            });
        }

        let deletions: Vec<JoinHandle<Result<(), ArchiveError>>> = stale
            .iter()
            .map(|&(_, key)| {
                let archive = self.clone();
                let key = key.to_owned();
                tokio::spawn(async move {
                    let result = archive
                        .bounded("delete", archive.backend.delete(&key))
                        .await;
                    match &result {
                        Ok(()) => debug!(%key, "Deleted archived snapshot"),
                        Err(e) => warn!(%key, error = %e, "Failed to delete archived snapshot"),
                    }
                    result
                })
            })
            .collect();

        let outcomes = futures::future::join_all(deletions).await;
        let report = CleanupReport::tally(
            fresh.len(),
            outcomes.into_iter().map(|joined| match joined {
                Ok(result) => result.is_ok(),
                Err(e) => {
                    warn!(error = %e, "Deletion task failed");
                    false
                }
            }),
        );

        info!(
            deleted = report.deleted,
            failed = report.failed,
            kept = report.kept,
            "Archive cleanup finished"
        );
        Ok(report)
    }
}

/// Pair each snapshot key with its timestamp, oldest first.
///
/// Keys that do not carry a timestamp are logged and skipped.
pub fn sort_snapshot_keys(keys: &[String]) -> Vec<(DateTime<Utc>, &str)> {
    let mut sorted: Vec<(DateTime<Utc>, &str)> = keys
        .iter()
        .filter_map(|key| match timestamp_from_name(key) {
            Ok(ts) => Some((ts, key.as_str())),
            Err(e) => {
                warn!(error = %e, "Skipping archived object");
                None
            }
        })
        .collect();
    sorted.sort_unstable();
    sorted
}

/// The chronologically latest snapshot key in `keys`.
///
/// # Errors
///
/// Returns [`ArchiveError::BucketEmpty`] for an empty listing and
/// [`ArchiveError::NoParsableObjects`] when no key carries a timestamp.
pub fn latest_key(keys: &[String]) -> Result<&str, ArchiveError> {
    if keys.is_empty() {
        return Err(ArchiveError::BucketEmpty);
    }

    sort_snapshot_keys(keys)
        .last()
        .map(|&(_, key)| key)
        .ok_or(ArchiveError::NoParsableObjects { count: keys.len() })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::snapshot::tests::gzip;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|&name| name.to_owned()).collect()
    }

    async fn seeded(names: &[&str]) -> SnapshotArchive {
        let archive = SnapshotArchive::in_memory(TIMEOUT);
        let body = Bytes::from(gzip("meta\t2021W01\nTOTAL,T,NR,PL\t7\n"));
        for name in names {
            archive.backend.put(name, body.clone()).await.unwrap();
        }
        archive
    }

    #[test]
    fn latest_key_picks_most_recent() {
        let listing = keys(&["20210112T012012.tsv.gz", "20240101T000000.tsv.gz"]);
        assert_eq!(latest_key(&listing).unwrap(), "20240101T000000.tsv.gz");

        let reversed = keys(&["20240101T000000.tsv.gz", "20210112T012012.tsv.gz"]);
        assert_eq!(latest_key(&reversed).unwrap(), "20240101T000000.tsv.gz");
    }

    #[test]
    fn latest_key_skips_unparsable_names() {
        let listing = keys(&[
            "20210112T012012,.tsv.gz",
            "20200101T000000.tsv.gz",
            "notes.txt",
        ]);
        assert_eq!(latest_key(&listing).unwrap(), "20200101T000000.tsv.gz");
    }

    #[test]
    fn empty_and_unparsable_listings_are_distinct_errors() {
        assert!(matches!(latest_key(&[]), Err(ArchiveError::BucketEmpty)));
        assert!(matches!(
            latest_key(&keys(&["20210112T012012,.tsv.gz"])),
            Err(ArchiveError::NoParsableObjects { count: 1 })
        ));
    }

    #[test]
    fn sort_orders_oldest_first() {
        let listing = keys(&[
            "20240101T000000.tsv.gz",
            "20210112T012012.tsv.gz",
            "20220601T120000.tsv.gz",
        ]);
        let order: Vec<&str> = sort_snapshot_keys(&listing)
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        assert_eq!(
            order,
            vec![
                "20210112T012012.tsv.gz",
                "20220601T120000.tsv.gz",
                "20240101T000000.tsv.gz",
            ]
        );
    }

    #[test]
    fn tally_counts_failures_without_stopping() {
        let report = CleanupReport::tally(2, [true, false, true, false, true]);
        assert_eq!(
            report,
            CleanupReport {
                deleted: 3,
                failed: 2,
                kept: 2,
            }
        );
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn latest_snapshot_uses_key_timestamp() {
        let archive = seeded(&["20210112T012012.tsv.gz", "20240101T000000.tsv.gz"]).await;
        let snapshot = archive.latest_snapshot().await.unwrap();
        assert_eq!(
            snapshot.captured_at(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn latest_snapshot_on_empty_archive_fails() {
        let archive = SnapshotArchive::in_memory(TIMEOUT);
        let err = archive.latest_snapshot().await.unwrap_err();
        assert!(matches!(err, SourceError::Archive(ArchiveError::BucketEmpty)));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let archive = SnapshotArchive::in_memory(TIMEOUT);
        let err = archive.get("20240101T000000.tsv.gz").await.unwrap_err();
        assert!(
            matches!(err, ArchiveError::ObjectNotFound(key) if key == "20240101T000000.tsv.gz")
        );
    }

    #[tokio::test]
    async fn persist_writes_under_timestamp_name() {
        let archive = SnapshotArchive::in_memory(TIMEOUT);
        let captured_at = Utc.with_ymd_and_hms(2023, 3, 4, 5, 6, 7).unwrap();

        archive
            .persist_detached(Bytes::from_static(b"payload"), captured_at)
            .await
            .unwrap();

        assert_eq!(archive.list_keys().await.unwrap(), vec!["20230304T050607.tsv.gz"]);
        assert_eq!(
            archive.get("20230304T050607.tsv.gz").await.unwrap(),
            Bytes::from_static(b"payload")
        );
    }

    #[tokio::test]
    async fn cleanup_keeps_newest_and_ignores_foreign_objects() {
        let archive = seeded(&[
            "20200101T000000.tsv.gz",
            "20210101T000000.tsv.gz",
            "20220101T000000.tsv.gz",
            "20230101T000000.tsv.gz",
            "README",
        ])
        .await;

        let report = archive.cleanup(2).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                deleted: 2,
                failed: 0,
                kept: 2,
            }
        );

        let mut remaining = archive.list_keys().await.unwrap();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["20220101T000000.tsv.gz", "20230101T000000.tsv.gz", "README"]
        );
    }

    #[tokio::test]
    async fn cleanup_counts_failed_deletions_and_finishes_the_rest() {
        let bucket = MemoryBucket::new();
        let archive = SnapshotArchive::new(ArchiveBackend::Memory(bucket.clone()), TIMEOUT);
        let body = Bytes::from(gzip("meta\t2021W01\nTOTAL,T,NR,PL\t7\n"));
        for name in [
            "20190101T000000.tsv.gz",
            "20200101T000000.tsv.gz",
            "20210101T000000.tsv.gz",
            "20220101T000000.tsv.gz",
            "20230101T000000.tsv.gz",
        ] {
            archive.persist(body.clone(), timestamp_from_name(name).unwrap()).await.unwrap();
        }
        bucket.lock("20200101T000000.tsv.gz").await;

        let report = archive.cleanup(1).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                deleted: 3,
                failed: 1,
                kept: 1,
            }
        );
        assert!(!report.is_clean());

        assert_eq!(
            archive.list_keys().await.unwrap(),
            vec!["20200101T000000.tsv.gz", "20230101T000000.tsv.gz"]
        );
    }

    #[tokio::test]
    async fn locked_object_survives_direct_delete() {
        let bucket = MemoryBucket::new();
        bucket.put("20200101T000000.tsv.gz", Bytes::from_static(b"x")).await;
        bucket.lock("20200101T000000.tsv.gz").await;

        let err = bucket.delete("20200101T000000.tsv.gz").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Storage { operation: "delete", .. }));
        assert!(bucket.get("20200101T000000.tsv.gz").await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_with_fewer_objects_than_kept_is_a_no_op() {
        let archive = seeded(&["20200101T000000.tsv.gz"]).await;
        let report = archive.cleanup(5).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.kept, 1);

        let empty = SnapshotArchive::in_memory(TIMEOUT);
        assert_eq!(empty.cleanup(5).await.unwrap(), CleanupReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_storage_times_out() {
        let archive = SnapshotArchive::in_memory(Duration::from_millis(50));
        let err = archive
            .bounded("list", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Timeout { operation: "list", .. }));
    }
}
