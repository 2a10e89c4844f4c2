//! Authoritative list of known commits.
//!
//! The store keeps commits newest-first and never holds two commits with the
//! same sha1. Ingestion only ever adds commits; nothing is removed except by
//! [`CommitStore::clear`] when the connection is closed.
//!
//! # Ordering
//!
//! A fetch yields commits oldest-to-newest, so each batch of new commits is
//! reversed and placed ahead of the existing contents. Fetching `[A, B, C]`
//! into an empty store gives `[C, B, A]`; a later fetch of `[B, C, D]` gives
//! `[D, C, B, A]`.

use std::collections::HashSet;

use tracing::debug;

use crate::types::{Commit, RawCommit};

/// Outcome of ingesting one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Commits that were not in the store before, in fetch order.
    ///
    /// Empty after a bootstrap ingest since those commits are already read.
    pub new_commits: Vec<Commit>,

    /// Number of commits inserted (read or unread).
    pub inserted: usize,
}

/// Newest-first, sha1-unique list of commits with read/unread bookkeeping.
#[derive(Debug, Default)]
pub struct CommitStore {
    commits: Vec<Commit>,
    known: HashSet<String>,
}

impl CommitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the commits of one successful fetch.
    ///
    /// With `bootstrap` set every unknown commit is inserted already read and
    /// none is reported as new. Otherwise unknown commits are inserted unread
    /// and returned in [`IngestReport::new_commits`]. Known commits are left
    /// untouched either way.
    pub fn ingest(&mut self, fetched: Vec<RawCommit>, bootstrap: bool) -> IngestReport {
        let mut batch: Vec<Commit> = Vec::new();

        for raw in fetched {
            if self.contains(&raw.sha1) {
                continue;
            }
            self.known.insert(raw.sha1.clone());

            let mut commit = Commit::from(raw);
            if bootstrap {
                commit.mark_read();
            }
            batch.push(commit);
        }

        let inserted = batch.len();
        let new_commits = if bootstrap { Vec::new() } else { batch.clone() };

        batch.reverse();
        batch.append(&mut self.commits);
        self.commits = batch;

        debug!(
            inserted,
            bootstrap,
            total = self.commits.len(),
            "Ingested fetched commits"
        );

        IngestReport {
            new_commits,
            inserted,
        }
    }

    /// Marks the commit with `sha1` and every commit ahead of it as read.
    ///
    /// Commits behind it (older) keep their state. Returns the number of
    /// commits whose flag changed; 0 when `sha1` is unknown.
    pub fn confirm_read_up_to(&mut self, sha1: &str) -> usize {
        let Some(position) = self.commits.iter().position(|c| c.sha1() == sha1) else {
            return 0;
        };

        let mut changed = 0;
        for commit in &mut self.commits[..=position] {
            if !commit.is_read() {
                commit.mark_read();
                changed += 1;
            }
        }
        changed
    }

    /// All commits, newest first.
    #[must_use]
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn unread(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter().filter(|c| !c.is_read())
    }

    pub fn read(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter().filter(|c| c.is_read())
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread().count()
    }

    #[must_use]
    pub fn contains(&self, sha1: &str) -> bool {
        self.known.contains(sha1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn clear(&mut self) {
        self.commits.clear();
        self.known.clear();
    }
}
