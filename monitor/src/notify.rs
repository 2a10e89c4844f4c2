//! Notification side effects.
//!
//! The polling service calls a [`Notifier`] once per newly ingested commit.
//! [`TerminalNotifier`] is the implementation used by the binary: it writes
//! notifications to stdout, rings the terminal bell for sounds and hands URLs
//! to the platform opener.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::types::Commit;
use crate::utils::max_string_length;

/// Maximum length of a notification title, in characters.
pub const NOTIFY_MAX_LEN_TITLE: usize = 75;

/// Sink for user-facing notification effects.
pub trait Notifier: Send + Sync {
    fn play_sound(&self);

    /// Shows a notification for `duration`.
    fn show_notification(&self, title: &str, body: &str, duration: Duration);

    fn open_url(&self, url: &str);
}

/// Title of the notification announcing `commit`.
#[must_use]
pub fn new_commit_title(commit: &Commit) -> String {
    max_string_length(
        &format!(
            "New commit of {} on project {}",
            commit.author(),
            commit.project()
        ),
        NOTIFY_MAX_LEN_TITLE,
    )
}

/// [`Notifier`] for terminal sessions.
#[derive(Debug, Default, Clone)]
pub struct TerminalNotifier;

impl TerminalNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for TerminalNotifier {
    fn play_sound(&self) {
        let mut stderr = io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|()| stderr.flush()) {
            debug!(error = %e, "Failed to ring terminal bell");
        }
    }

    fn show_notification(&self, title: &str, body: &str, duration: Duration) {
        info!(duration_secs = duration.as_secs(), title = %title, "Notification");
        println!("* {title}");
        if !body.is_empty() {
            println!("  {body}");
        }
    }

    fn open_url(&self, url: &str) {
        if url.is_empty() {
            return;
        }

        let mut command = opener_command(url);
        match command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => debug!(url = %url, "Opened URL"),
            Err(e) => warn!(url = %url, error = %e, "Failed to open URL"),
        }
    }
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}
