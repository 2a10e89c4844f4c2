//! HTTP fetcher for the activity page.
//!
//! A fetch reports exactly one [`FetchOutcome`]: the page body on a 2xx
//! response, the status code on any other response (0 when the server could
//! not be reached), or a timeout. Fetches never return `Err`; the polling
//! service turns failures into its last error message.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use commitfeed_monitor::fetcher::{Fetcher, FetchOutcome, HttpFetcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = HttpFetcher::new(Duration::from_secs(30)).unwrap();
//!     match fetcher.fetch("https://git.example.com/activity/").await {
//!         FetchOutcome::Success { body, .. } => println!("{} bytes", body.len()),
//!         FetchOutcome::Failure { status } => println!("failed with {status}"),
//!         FetchOutcome::Timeout => println!("timed out"),
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

/// Default fetch timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Status reported when no HTTP response was received.
pub const STATUS_UNREACHABLE: u16 = 0;

/// Errors that can occur while building the fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result of one fetch of the activity page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx response with its body.
    Success { body: String, status: u16 },

    /// Non-2xx response, or [`STATUS_UNREACHABLE`] when the request failed
    /// before a response arrived.
    Failure { status: u16 },

    /// No complete response within the request timeout.
    Timeout,
}

impl FetchOutcome {
    /// Human-readable reason of a failed fetch, `None` on success.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::Failure {
                status: STATUS_UNREACHABLE,
            } => Some("network unreachable".to_string()),
            Self::Failure { status } => Some(format!("HTTP {status}")),
            Self::Timeout => Some("request timed out".to_string()),
        }
    }
}

/// Source of activity pages.
pub trait Fetcher: Send + Sync + 'static {
    /// Issues one GET request for `url`.
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;
}

/// [`Fetcher`] backed by a reqwest client.
///
/// The client keeps a cookie store so the server session travels with each
/// request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        debug!(url = %url, "Fetching activity page");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(url = %url, "Activity request timed out");
                return FetchOutcome::Timeout;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Activity request failed");
                return FetchOutcome::Failure {
                    status: STATUS_UNREACHABLE,
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Activity request rejected");
            return FetchOutcome::Failure {
                status: status.as_u16(),
            };
        }

        match response.text().await {
            Ok(body) => {
                debug!(status = status.as_u16(), bytes = body.len(), "Activity page received");
                FetchOutcome::Success {
                    body,
                    status: status.as_u16(),
                }
            }
            Err(e) if e.is_timeout() => {
                warn!(url = %url, "Activity body timed out");
                FetchOutcome::Timeout
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read activity body");
                FetchOutcome::Failure {
                    status: STATUS_UNREACHABLE,
                }
            }
        }
    }
}
