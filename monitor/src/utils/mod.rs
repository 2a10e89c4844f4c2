//! Utility modules for the CommitFeed monitor.
//!
//! # Modules
//!
//! - [`text`]: Display helpers for commit text (truncation)

pub mod text;

pub use text::{max_string_length, ELLIPSIS};
