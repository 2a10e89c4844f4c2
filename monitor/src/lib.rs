//! CommitFeed Monitor - activity feed notifier.
//!
//! This crate polls the activity page of a Gitblit server, keeps a deduplicated
//! list of the commits it has seen and announces the new ones.
//!
//! # Overview
//!
//! A [`Controller`] lazily spawns the [`service`] task, which owns the
//! connection state machine. Every poll runs the [`fetcher`], hands the page
//! to an [`parser::ActivityParser`] and merges the result into the
//! [`store::CommitStore`]. New commits trigger [`notify::Notifier`] side
//! effects, and every state change is broadcast through the [`hub`].
//!
//! # Modules
//!
//! - [`types`]: Commit value type and connection state
//! - [`fetcher`]: HTTP GET of the activity page
//! - [`parser`]: Versioned activity page parsers
//! - [`store`]: Newest-first, deduplicated commit list
//! - [`scheduler`]: Single-flight poll timer
//! - [`service`]: Polling service actor and its handle
//! - [`hub`]: Refresh event fan-out to listeners
//! - [`controller`]: Facade with lazy service creation
//! - [`notify`]: Sound, notification and URL side effects
//! - [`prefs`]: User preferences
//! - [`badge`]: Toolbar icon and counter
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`utils`]: Text helpers

pub mod badge;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod hub;
pub mod notify;
pub mod parser;
pub mod prefs;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use badge::{Badge, BadgeIcon};
pub use config::{Config, ConfigError, PollTimings, Settings};
pub use controller::Controller;
pub use error::{MonitorError, Result, ServiceError};
pub use fetcher::{FetchError, FetchOutcome, Fetcher, HttpFetcher};
pub use hub::{ListenerHub, ListenerId, RefreshEvent, RefreshListener, Subscription};
pub use notify::{Notifier, TerminalNotifier};
pub use parser::{parser_for, ActivityParser, GitblitActivityParser, LayoutVersion};
pub use prefs::{PreferenceSource, Preferences, PreferencesError, SharedPreferences};
pub use service::{Collaborators, PollingService, ServiceHandle, ServiceSnapshot};
pub use store::{CommitStore, IngestReport};
pub use types::{Commit, ConnectionState, RawCommit};
pub use utils::max_string_length;
