//! HTTP API over the weekly deaths snapshot.
//!
//! This crate provides an axum server exposing:
//!
//! - **Public endpoints** for querying weekly deaths series, label tables,
//!   and build/data provenance
//! - **Administrative endpoints**, behind HTTP basic auth, that refresh the
//!   served snapshot from the live source and prune the snapshot archive
//!
//! All reads go through the [`SnapshotStore`](mortality_core::SnapshotStore)
//! held in [`AppState`]; a refresh swaps the store's snapshot only after the
//! new one has been fully downloaded and parsed.

pub mod admin;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod labels;
pub mod router;
pub mod server;
pub mod state;

pub use auth::Credentials;
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
