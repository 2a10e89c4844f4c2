//! Commit and connection types shared across the monitor.
//!
//! A [`Commit`] is created from a [`RawCommit`] scraped off the activity page
//! and is owned by the [`CommitStore`](crate::store::CommitStore) from then on.
//! All fields are immutable after construction except the read flag, which
//! only the store may flip. Consumers receive clones or shared references.
//!
//! The external shape serializes to camelCase JSON:
//! `{date, time, project, comment, author, sha1, branch, link, isRead}`.

use serde::{Deserialize, Serialize};

/// Connection state of the polling service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No polling in progress and no confirmed contact with the server.
    #[default]
    Disconnected,
    /// Polling armed, waiting for the first successful fetch.
    Connecting,
    /// At least one fetch succeeded since the last (re)connect.
    Connected,
}

impl ConnectionState {
    /// Returns the lowercase label used in logs and CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the activity page, exactly as scraped.
///
/// Produced by an [`ActivityParser`](crate::parser::ActivityParser) and turned
/// into a [`Commit`] when the store ingests it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCommit {
    pub date: String,
    pub time: String,
    pub project: String,
    pub comment: String,
    pub author: String,
    pub sha1: String,
    pub branch: String,
    /// Deep link to the commit page, empty when the row carried no commit anchor.
    pub link: String,
}

/// A commit seen on the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    date: String,
    time: String,
    project: String,
    comment: String,
    author: String,
    sha1: String,
    branch: String,
    link: String,
    is_read: bool,
}

impl From<RawCommit> for Commit {
    fn from(raw: RawCommit) -> Self {
        Self {
            date: raw.date,
            time: raw.time,
            project: raw.project,
            comment: raw.comment,
            author: raw.author,
            sha1: raw.sha1,
            branch: raw.branch,
            link: raw.link,
            is_read: false,
        }
    }
}

impl Commit {
    /// Display date of the activity group the commit belongs to.
    #[must_use]
    pub fn date(&self) -> &str {
        &self.date
    }

    #[must_use]
    pub fn time(&self) -> &str {
        &self.time
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Identity key of the commit; unique within a store.
    #[must_use]
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[must_use]
    pub fn link(&self) -> &str {
        &self.link
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub(crate) fn mark_read(&mut self) {
        self.is_read = true;
    }
}
