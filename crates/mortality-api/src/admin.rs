//! Administrative endpoint handlers, guarded by basic auth.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/update_data` | Fetch the live dataset and swap it in |
//! | `POST` | `/api/cleanup_snapshots` | Delete all but the newest archived snapshots |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::SecondsFormat;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Response body of a successful refresh.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

// ---------------------------------------------------------------------------
// POST /api/update_data
// ---------------------------------------------------------------------------

/// Download a fresh snapshot and make it the served one.
///
/// The store is only touched after the download and parse succeed; on
/// failure the previous snapshot keeps being served and a 502 is returned.
/// A download that finishes after a newer one has been swapped in is
/// dropped.
pub async fn update_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    info!(url = state.live.url(), "Received request for data update");

    let snapshot = state.live.fetch().await.inspect_err(|e| {
        warn!(error = %e, "Data update failed");
    })?;

    let captured_at = snapshot.captured_at();
    state.store().replace_if_newer(snapshot).await;

    Ok(Json(MessageResponse {
        message: format!(
            "Successfully loaded snapshot for {}.",
            captured_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/cleanup_snapshots
// ---------------------------------------------------------------------------

/// Delete every archived snapshot except the configured number of newest.
///
/// Responds 200 with the report when every deletion succeeded and 500 with
/// the report when some failed.
pub async fn cleanup_snapshots(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let archive = state.archive.as_ref().ok_or(ApiError::ArchiveUnavailable)?;
    let report = archive.cleanup(state.cleanup_keep).await?;

    let status = if report.is_clean() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(report)))
}
