//! Axum router construction.
//!
//! Public routes are open; administrative routes sit behind
//! [`require_basic_auth`](crate::auth::require_basic_auth). CORS is
//! permissive so a browser frontend on another origin can read the API.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{admin, auth, handlers};

/// Build the complete router.
///
/// - `GET /api/weekly_deaths` -- series query
/// - `GET /api/labels` -- label tables
/// - `GET /api/info` -- commit and snapshot time
/// - `POST /api/update_data` -- refresh from the live source (auth)
/// - `POST /api/cleanup_snapshots` -- prune the archive (auth)
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/api/update_data", post(admin::update_data))
        .route("/api/cleanup_snapshots", post(admin::cleanup_snapshots))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/api/weekly_deaths", get(handlers::weekly_deaths))
        .route("/api/labels", get(handlers::labels))
        .route("/api/info", get(handlers::info))
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
