//! Holder of the snapshot currently being served.
//!
//! The store owns one `Arc<Snapshot>` behind a [`RwLock`]. The lock is held
//! only to clone or assign that pointer: fetching and parsing a replacement
//! happen before [`SnapshotStore::replace`] is called, and queries run
//! against a cloned handle after the lock is released. A reader that took a
//! handle before a swap keeps answering from the old snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::key::KeyError;
use crate::record::WeekYearDeaths;
use crate::snapshot::Snapshot;

/// Concurrency-safe holder of the current [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store serving `snapshot`.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Shared handle to the snapshot being served right now.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Weekly deaths for one series across `year_from..=year_to`.
    ///
    /// The whole query is answered from a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when a key component is empty.
    pub async fn query(
        &self,
        country: &str,
        age: &str,
        gender: &str,
        year_from: i32,
        year_to: i32,
    ) -> Result<Vec<WeekYearDeaths>, KeyError> {
        self.snapshot()
            .await
            .weekly_deaths(country, age, gender, year_from, year_to)
    }

    /// Swap in `snapshot`, returning the one it replaces.
    pub async fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let incoming = Arc::new(snapshot);
        let captured_at = incoming.captured_at();
        let series = incoming.len();

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, incoming)
        };

        info!(
            %captured_at,
            previous = %previous.captured_at(),
            series,
            "Snapshot replaced"
        );
        previous
    }

    /// Swap in `snapshot` unless the one being served was captured later.
    ///
    /// Returns whether the swap happened. Two overlapping refreshes can
    /// finish out of order; the older result is dropped.
    pub async fn replace_if_newer(&self, snapshot: Snapshot) -> bool {
        let captured_at = snapshot.captured_at();
        let mut current = self.current.write().await;
        let served = current.captured_at();
        if captured_at < served {
            drop(current);
            info!(%captured_at, %served, "Discarded snapshot older than the one served");
            return false;
        }

        *current = Arc::new(snapshot);
        drop(current);
        info!(%captured_at, previous = %served, "Snapshot replaced");
        true
    }

    /// Capture time of the snapshot being served.
    pub async fn captured_at(&self) -> DateTime<Utc> {
        self.current.read().await.captured_at()
    }

    /// Number of series in the snapshot being served.
    pub async fn series_count(&self) -> usize {
        self.current.read().await.len()
    }
}
