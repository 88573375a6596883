//! Error types for the server binary.
//!
//! [`AppError`] wraps every failure mode of startup and serving so `main`
//! can propagate with `?` and exit non-zero.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// No source produced a bootstrap snapshot.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The error of the last source tried.
        #[from]
        source: mortality_core::SourceError,
    },

    /// The HTTP server failed to start or crashed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: mortality_api::ServerError,
    },
}
