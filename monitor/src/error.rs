//! Error types for the CommitFeed monitor.
//!
//! Each module owns a focused `thiserror` enum; [`MonitorError`] aggregates
//! them for callers that drive several modules at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetcher::FetchError;
use crate::prefs::PreferencesError;

/// Errors returned by the service handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service task has stopped and no longer accepts commands.
    #[error("polling service has stopped")]
    Stopped,
}

/// Errors that can occur during monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Preference file error.
    #[error("preferences error: {0}")]
    Preferences(#[from] PreferencesError),

    /// HTTP client setup error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Polling service error.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
