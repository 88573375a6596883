//! Public read-only endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/weekly_deaths` | Weekly deaths for one series over a year range |
//! | `GET` | `/api/labels` | Display labels for country, age and gender codes |
//! | `GET` | `/api/info` | Build commit and snapshot capture time |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use mortality_core::{WeeklyDeathsParams, WeeklyDeathsResponse};
use serde::Serialize;

use crate::error::ApiError;
use crate::labels::{MetadataLabel, all_labels};
use crate::state::AppState;

/// Response body of `GET /api/labels`.
#[derive(Debug, Serialize)]
pub struct LabelsResponse {
    /// Age, country and gender labels, in that order.
    pub data: Vec<MetadataLabel>,
}

/// Response body of `GET /api/info`.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    /// Commit the running build was made from.
    pub commit_hash: String,
    /// When the served snapshot was captured.
    pub data_downloaded_at_utc_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// GET /api/weekly_deaths
// ---------------------------------------------------------------------------

/// Weekly deaths for `country`, `gender` and `age` from `year_from`
/// through `year_to`.
///
/// All five parameters are required; every missing or malformed one is
/// reported in a single 400 response.
pub async fn weekly_deaths(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WeeklyDeathsParams>,
) -> Result<Json<WeeklyDeathsResponse>, ApiError> {
    let response = state.query.weekly_deaths(&params).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// GET /api/labels
// ---------------------------------------------------------------------------

/// Static label tables.
pub async fn labels() -> Json<LabelsResponse> {
    Json(LabelsResponse { data: all_labels() })
}

// ---------------------------------------------------------------------------
// GET /api/info
// ---------------------------------------------------------------------------

/// Build and data provenance.
pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        commit_hash: state.commit.clone(),
        data_downloaded_at_utc_time: state.store().captured_at().await,
    })
}
