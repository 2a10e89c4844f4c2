//! Configuration module for the CommitFeed monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `COMMITFEED_SERVER_URL` | No | prefs file | Server base URL (e.g., `https://git.example.com/`) |
//! | `COMMITFEED_PREFS_PATH` | No | `<config dir>/commitfeed/prefs.json` | Preference file |
//! | `COMMITFEED_POLL_INTERVAL_SECS` | No | 120 | Seconds between polls |
//! | `COMMITFEED_REQUEST_TIMEOUT_SECS` | No | 30 | Activity request timeout |
//! | `COMMITFEED_CHANNEL_SIZE` | No | 64 | Service command queue capacity |
//!
//! # Example
//!
//! ```no_run
//! use commitfeed_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Preferences: {}", config.prefs_path.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;
use tracing::debug;

use crate::prefs::{PreferenceSource, SharedPreferences};

use crate::fetcher::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::service::DEFAULT_CHANNEL_SIZE;

/// Default poll cadence in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;

/// Delay before the first poll after a connection is initialized.
pub const INITIAL_POLL_DELAY: Duration = Duration::from_millis(1000);

/// File name of the preference file inside the config directory.
const PREFS_FILE_NAME: &str = "prefs.json";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine the user configuration directory.
    #[error("failed to determine configuration directory")]
    NoConfigDirectory,
}

/// Timing parameters of the polling service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimings {
    /// Delay of the first poll after `initialize_connection`.
    pub initial_delay: Duration,

    /// Cadence after every completed poll.
    pub interval: Duration,

    /// Deadline of a single activity request.
    pub request_timeout: Duration,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_POLL_DELAY,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Configuration for the CommitFeed monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server URL override. When `None` the preference file decides.
    pub server_url: Option<String>,

    /// Path to the JSON preference file.
    pub prefs_path: PathBuf,

    /// Seconds between polls.
    pub poll_interval_secs: u64,

    /// Seconds before an activity request is abandoned.
    pub request_timeout_secs: u64,

    /// Capacity of the service command queue.
    pub channel_size: usize,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - a numeric variable is set but is not a positive integer
    /// - `COMMITFEED_PREFS_PATH` is unset and no config directory can be found
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: COMMITFEED_SERVER_URL (blank counts as unset)
        let server_url = env::var("COMMITFEED_SERVER_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        // Optional: COMMITFEED_PREFS_PATH (default: <config dir>/commitfeed/prefs.json)
        let prefs_path = match env::var("COMMITFEED_PREFS_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => ProjectDirs::from("", "", "commitfeed")
                .ok_or(ConfigError::NoConfigDirectory)?
                .config_dir()
                .join(PREFS_FILE_NAME),
        };

        let poll_interval_secs =
            parse_positive("COMMITFEED_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let request_timeout_secs =
            parse_positive("COMMITFEED_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let channel_size = parse_positive("COMMITFEED_CHANNEL_SIZE", DEFAULT_CHANNEL_SIZE as u64)?;

        Ok(Self {
            server_url,
            prefs_path,
            poll_interval_secs,
            request_timeout_secs,
            channel_size: usize::try_from(channel_size).unwrap_or(usize::MAX),
        })
    }

    /// Service timings derived from this configuration.
    #[must_use]
    pub fn timings(&self) -> PollTimings {
        PollTimings {
            initial_delay: INITIAL_POLL_DELAY,
            interval: Duration::from_secs(self.poll_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Configuration together with the preference file it points at.
#[derive(Debug)]
pub struct Settings {
    pub config: Config,
    pub prefs: SharedPreferences,
}

impl Settings {
    /// Loads the configuration and its preference file.
    ///
    /// `COMMITFEED_SERVER_URL`, when set, replaces the stored server in memory.
    /// The file itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MonitorError`] when a variable is invalid or the
    /// preference file cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        let config = Config::from_env()?;
        let prefs = SharedPreferences::open(config.prefs_path.clone())?;

        if let Some(url) = &config.server_url {
            debug!(server = %url, "Server overridden from environment");
            prefs.update(|p| p.user_server = url.clone());
        }

        Ok(Self { config, prefs })
    }

    /// The effective server URL, with a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when neither the environment nor
    /// the preference file names a server.
    pub fn require_server(&self) -> Result<String, ConfigError> {
        let server = self.prefs.get_user_server();
        if server.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "COMMITFEED_SERVER_URL".to_string(),
            ));
        }
        Ok(server)
    }
}

/// Reads an optional positive integer variable, falling back to `default`.
fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };

    let parsed = val
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected positive integer, got '{val}'"),
        })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }
    Ok(parsed)
}
