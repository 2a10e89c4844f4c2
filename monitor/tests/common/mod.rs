//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use commitfeed_monitor::config::PollTimings;
use commitfeed_monitor::fetcher::{FetchOutcome, Fetcher};
use commitfeed_monitor::hub::{ListenerHub, RefreshEvent};
use commitfeed_monitor::notify::Notifier;
use commitfeed_monitor::parser::{parser_for, LayoutVersion};
use commitfeed_monitor::prefs::{Preferences, SharedPreferences};
use commitfeed_monitor::service::{Collaborators, PollingService, ServiceHandle};
use tokio::time::Instant;

pub const SERVER: &str = "https://git.example.com/";

// =============================================================================
// Activity pages
// =============================================================================

/// One activity row whose sha1 is `sha1`, author `dev-<sha1>` and comment
/// `commit <sha1>`.
pub fn activity_row(sha1: &str) -> String {
    format!(
        "<tr>\n\t<td class=\"date\">12:00</td>\n\t<td class=\"icon\"></td>\n\t\
         <td><a href=\"../summary/demo.git\">demo.git</a></td>\n\t\
         <td class=\"message\"><a href=\"../commit/demo.git/{sha1}\" target=\"_blank\">commit {sha1}</a></td>\n\t\
         <td class=\"author\">dev-{sha1}</td>\n\t<td class=\"sha1\">{sha1}</td>\n\t\
         <td><span class=\"branch\">master</span></td>\n</tr>\n"
    )
}

/// Activity page with one day group listing `sha1s` in page order.
pub fn activity_page(sha1s: &[&str]) -> String {
    let rows: String = sha1s.iter().map(|sha1| activity_row(sha1)).collect();
    format!(
        "<html><body>\n<div class=\"header\" title=\"Monday, March 2, 2026\"></div>\n\
         <table class=\"table activity\">\n{rows}</table>\n</body></html>"
    )
}

pub fn ok(sha1s: &[&str]) -> FetchOutcome {
    FetchOutcome::Success {
        body: activity_page(sha1s),
        status: 200,
    }
}

// =============================================================================
// Scripted fetcher
// =============================================================================

/// What the next fetch does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Completes immediately.
    Respond(FetchOutcome),
    /// Completes after the delay.
    Delayed(Duration, FetchOutcome),
    /// Never completes.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub url: String,
}

/// Fetcher that plays back a script, then repeats the last outcome.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<FetchOutcome>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFetcher {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_step(&self, url: &str) -> Step {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            url: url.to_string(),
        });

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if let Step::Respond(outcome) | Step::Delayed(_, outcome) = &step {
                    *self.last.lock().unwrap() = Some(outcome.clone());
                }
                step
            }
            None => match self.last.lock().unwrap().clone() {
                Some(outcome) => Step::Respond(outcome),
                None => Step::Hang,
            },
        }
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        match self.next_step(url) {
            Step::Respond(outcome) => outcome,
            Step::Delayed(delay, outcome) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Recording notifier
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shown {
    pub title: String,
    pub body: String,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sounds: Mutex<usize>,
    shown: Mutex<Vec<Shown>>,
    opened: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sounds(&self) -> usize {
        *self.sounds.lock().unwrap()
    }

    pub fn shown(&self) -> Vec<Shown> {
        self.shown.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn play_sound(&self) {
        *self.sounds.lock().unwrap() += 1;
    }

    fn show_notification(&self, title: &str, body: &str, duration: Duration) {
        self.shown.lock().unwrap().push(Shown {
            title: title.to_string(),
            body: body.to_string(),
            duration,
        });
    }

    fn open_url(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
}

// =============================================================================
// Service harness
// =============================================================================

pub fn prefs_for(server: &str) -> Arc<SharedPreferences> {
    let prefs = Preferences {
        user_server: server.to_string(),
        ..Preferences::default()
    };
    Arc::new(SharedPreferences::new(prefs))
}

pub fn collaborators(
    fetcher: &Arc<ScriptedFetcher>,
    prefs: &Arc<SharedPreferences>,
    notifier: &Arc<RecordingNotifier>,
) -> Collaborators<ScriptedFetcher> {
    Collaborators {
        fetcher: Arc::clone(fetcher),
        prefs: Arc::clone(prefs) as _,
        notifier: Arc::clone(notifier) as _,
        parser: Arc::from(parser_for(LayoutVersion::GitblitV1)),
    }
}

/// Records every event dispatched by `hub`.
pub fn record_events(hub: &ListenerHub) -> Arc<Mutex<Vec<RefreshEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    hub.add_listener(Arc::new(move |event: &RefreshEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    events
}

pub struct Harness {
    pub handle: ServiceHandle,
    pub fetcher: Arc<ScriptedFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub prefs: Arc<SharedPreferences>,
    pub events: Arc<Mutex<Vec<RefreshEvent>>>,
}

impl Harness {
    /// Spawns a service against `SERVER` with default timings.
    pub fn start(steps: Vec<Step>) -> Self {
        Self::start_with(SERVER, steps)
    }

    pub fn start_with(server: &str, steps: Vec<Step>) -> Self {
        Self::start_timed(server, steps, PollTimings::default())
    }

    pub fn start_timed(server: &str, steps: Vec<Step>, timings: PollTimings) -> Self {
        let fetcher = Arc::new(ScriptedFetcher::new(steps));
        let notifier = Arc::new(RecordingNotifier::default());
        let prefs = prefs_for(server);
        let hub = ListenerHub::new();
        let events = record_events(&hub);

        let handle = PollingService::spawn(
            collaborators(&fetcher, &prefs, &notifier),
            hub,
            timings,
            16,
        );

        Self {
            handle,
            fetcher,
            notifier,
            prefs,
            events,
        }
    }

    pub fn events(&self) -> Vec<RefreshEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Initializes the connection and lets the first poll complete.
    pub async fn connect(&self) {
        self.handle.initialize_connection().await.unwrap();
        advance(Duration::from_millis(1001)).await;
    }

    /// Requests an immediate poll and lets it run.
    pub async fn poll_now(&self) {
        self.handle.check_now().await.unwrap();
        advance(Duration::from_millis(1)).await;
    }
}

/// Advances the paused clock, running every task that becomes ready.
pub async fn advance(by: Duration) {
    tokio::time::sleep(by).await;
}

/// Asserts `actual` is within 5ms above `expected`.
pub fn assert_about(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}

pub fn sha1s(commits: &[commitfeed_monitor::types::Commit]) -> Vec<String> {
    commits.iter().map(|c| c.sha1().to_string()).collect()
}
