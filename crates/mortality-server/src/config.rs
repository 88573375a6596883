//! Configuration loading and typed config structures for the server binary.
//!
//! Configuration lives in an optional `mortality-config.yaml`. Every field
//! has a default, and environment variables override whatever the file
//! says. The merged result is validated before anything is started.
//!
//! Recognised environment variables:
//! - `DEPLOY_ENV` (`local` or `production`)
//! - `LOCAL_SNAPSHOT_PATH`
//! - `LIVE_DATA_URL`, `FETCH_TIMEOUT_SECS`
//! - `S3_BUCKET`, `USE_S3_AS_FALLBACK`, `PERSIST_LIVE_SNAPSHOTS`
//! - `CLEANUP_KEEP_N_LATEST_SNAPSHOTS`, `ARCHIVE_TIMEOUT_SECS`
//! - `AUTH_USERNAME`, `AUTH_PASSWORD`
//! - `COMMIT`
//! - `HOST`, `PORT`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mortality_api::state::DEFAULT_CLEANUP_KEEP;
use mortality_api::{Credentials, ServerConfig};
use mortality_core::{DEFAULT_FETCH_TIMEOUT, EUROSTAT_WEEKLY_DEATHS_URL};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment variable holds a value of the wrong shape.
    #[error("invalid {name}: {message}")]
    EnvVar {
        /// Variable name.
        name: &'static str,
        /// What is wrong with the value.
        message: String,
    },

    /// The merged configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// Top-level server configuration, mirroring `mortality-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Deployment mode and build metadata.
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Live Eurostat source.
    #[serde(default)]
    pub source: SourceConfig,

    /// S3 snapshot archive.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Admin endpoint credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Listen address.
    #[serde(default)]
    pub server: ListenConfig,
}

/// Where the bootstrap snapshot comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    /// Load a snapshot file from disk.
    Local,
    /// Download the live dataset, optionally falling back to the archive.
    #[default]
    Production,
}

impl FromStr for DeployEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!("expected `local` or `production`, got `{other}`")),
        }
    }
}

/// Deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployConfig {
    /// Deployment mode.
    #[serde(default)]
    pub env: DeployEnv,

    /// Snapshot file loaded in `local` mode. Its name must carry the
    /// capture timestamp.
    #[serde(default)]
    pub local_snapshot_path: Option<PathBuf>,

    /// Commit hash reported by `/info`.
    #[serde(default = "default_commit")]
    pub commit: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            env: DeployEnv::default(),
            local_snapshot_path: None,
            commit: default_commit(),
        }
    }
}

/// Live source settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Dataset download URL.
    #[serde(default = "default_live_data_url")]
    pub live_data_url: String,

    /// Total timeout for one download, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            live_data_url: default_live_data_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Archive settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArchiveConfig {
    /// Bucket holding archived snapshots.
    #[serde(default)]
    pub s3_bucket: Option<String>,

    /// Fall back to the newest archived snapshot when the live fetch fails.
    #[serde(default)]
    pub use_s3_as_fallback: bool,

    /// Upload every successfully parsed live download.
    #[serde(default)]
    pub persist_live_snapshots: bool,

    /// Number of newest snapshots a cleanup keeps.
    #[serde(default = "default_cleanup_keep")]
    pub cleanup_keep_n_latest_snapshots: usize,

    /// Timeout for each storage operation, in seconds.
    #[serde(default = "default_archive_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            s3_bucket: None,
            use_s3_as_fallback: false,
            persist_live_snapshots: false,
            cleanup_keep_n_latest_snapshots: default_cleanup_keep(),
            timeout_secs: default_archive_timeout_secs(),
        }
    }
}

/// Basic auth credentials for the admin endpoints.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthConfig {
    /// Admin user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Admin password.
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::EnvVar`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::EnvVar`] if an override is malformed.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvVar`] if a variable cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvVar`] if a variable cannot be parsed.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DEPLOY_ENV") {
            self.deploy.env = parse_var("DEPLOY_ENV", &val)?;
        }
        if let Some(val) = lookup("LOCAL_SNAPSHOT_PATH") {
            self.deploy.local_snapshot_path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("COMMIT") {
            self.deploy.commit = val;
        }
        if let Some(val) = lookup("LIVE_DATA_URL") {
            self.source.live_data_url = val;
        }
        if let Some(val) = lookup("FETCH_TIMEOUT_SECS") {
            self.source.fetch_timeout_secs = parse_var("FETCH_TIMEOUT_SECS", &val)?;
        }
        if let Some(val) = lookup("S3_BUCKET") {
            self.archive.s3_bucket = Some(val).filter(|bucket| !bucket.is_empty());
        }
        if let Some(val) = lookup("USE_S3_AS_FALLBACK") {
            self.archive.use_s3_as_fallback = parse_flag("USE_S3_AS_FALLBACK", &val)?;
        }
        if let Some(val) = lookup("PERSIST_LIVE_SNAPSHOTS") {
            self.archive.persist_live_snapshots = parse_flag("PERSIST_LIVE_SNAPSHOTS", &val)?;
        }
        if let Some(val) = lookup("CLEANUP_KEEP_N_LATEST_SNAPSHOTS") {
            self.archive.cleanup_keep_n_latest_snapshots =
                parse_var("CLEANUP_KEEP_N_LATEST_SNAPSHOTS", &val)?;
        }
        if let Some(val) = lookup("ARCHIVE_TIMEOUT_SECS") {
            self.archive.timeout_secs = parse_var("ARCHIVE_TIMEOUT_SECS", &val)?;
        }
        if let Some(val) = lookup("AUTH_USERNAME") {
            self.auth.username = Some(val);
        }
        if let Some(val) = lookup("AUTH_PASSWORD") {
            self.auth.password = Some(val);
        }
        if let Some(val) = lookup("HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("PORT") {
            self.server.port = parse_var("PORT", &val)?;
        }
        Ok(())
    }

    /// Check that the merged configuration can actually be started.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `local` mode has no snapshot
    /// path, admin credentials are missing, or an archive feature is
    /// enabled without a bucket.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deploy.env == DeployEnv::Local && self.deploy.local_snapshot_path.is_none() {
            return Err(ConfigError::Invalid(
                "local deploy mode requires LOCAL_SNAPSHOT_PATH".to_owned(),
            ));
        }
        if self.credentials().is_none() {
            return Err(ConfigError::Invalid(
                "AUTH_USERNAME and AUTH_PASSWORD must both be set".to_owned(),
            ));
        }
        if self.archive.s3_bucket.is_none() {
            if self.archive.use_s3_as_fallback {
                return Err(ConfigError::Invalid(
                    "USE_S3_AS_FALLBACK requires S3_BUCKET".to_owned(),
                ));
            }
            if self.archive.persist_live_snapshots {
                return Err(ConfigError::Invalid(
                    "PERSIST_LIVE_SNAPSHOTS requires S3_BUCKET".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Admin credentials, when both halves are present and non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.auth.username.as_deref(), self.auth.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credentials::new(user, pass))
            }
            _ => None,
        }
    }

    /// Live download timeout.
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.fetch_timeout_secs)
    }

    /// Per-operation archive timeout.
    pub const fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive.timeout_secs)
    }

    /// Listen address for the HTTP server.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
        }
    }
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::EnvVar {
        name,
        message: e.to_string(),
    })
}

/// Accepts `true`/`false`, `1`/`0` and `yes`/`no`, case-insensitively.
fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::EnvVar {
            name,
            message: format!("expected a boolean, got `{other}`"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_commit() -> String {
    "unknown".to_owned()
}

fn default_live_data_url() -> String {
    EUROSTAT_WEEKLY_DEATHS_URL.to_owned()
}

const fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

const fn default_cleanup_keep() -> usize {
    DEFAULT_CLEANUP_KEEP
}

const fn default_archive_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}
