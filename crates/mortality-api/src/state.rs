//! Shared application state for the HTTP layer.
//!
//! [`AppState`] is built once at startup, wrapped in [`Arc`] and injected
//! into handlers through axum's `State` extractor. The snapshot store
//! inside it is the only mutable part; everything else is configuration.

use std::sync::Arc;

use mortality_core::{LiveSource, QueryService, SnapshotArchive, SnapshotStore};

use crate::auth::Credentials;

/// Default number of archived snapshots kept by a cleanup.
pub const DEFAULT_CLEANUP_KEEP: usize = 5;

/// Shared state for the axum application.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Query service reading through the snapshot store.
    pub query: QueryService,
    /// Source used by the refresh endpoint.
    pub live: LiveSource,
    /// Snapshot archive, when one is configured.
    pub archive: Option<SnapshotArchive>,
    /// Number of newest archived snapshots a cleanup keeps.
    pub cleanup_keep: usize,
    /// Commit the running build was made from.
    pub commit: String,
    /// Credentials guarding the administrative endpoints.
    pub credentials: Credentials,
}

impl AppState {
    /// State serving `store`, refreshing from `live`.
    pub fn new(store: Arc<SnapshotStore>, live: LiveSource, credentials: Credentials) -> Self {
        Self {
            query: QueryService::new(store),
            live,
            archive: None,
            cleanup_keep: DEFAULT_CLEANUP_KEEP,
            commit: String::new(),
            credentials,
        }
    }

    /// Attach an archive whose cleanup keeps the `keep` newest snapshots.
    #[must_use]
    pub fn with_archive(mut self, archive: SnapshotArchive, keep: usize) -> Self {
        self.archive = Some(archive);
        self.cleanup_keep = keep;
        self
    }

    /// Record the commit reported by `GET /api/info`.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = commit.into();
        self
    }

    /// The snapshot store.
    pub const fn store(&self) -> &Arc<SnapshotStore> {
        self.query.store()
    }
}
