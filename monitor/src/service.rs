//! Polling service: the connection state machine.
//!
//! The service runs as a single tokio task that owns all mutable state: the
//! connection state, the last error message, the commit store, the scheduler
//! and the in-flight fetch. Public operations reach it through a cloneable
//! [`ServiceHandle`] and are processed one at a time in arrival order, so no
//! two operations ever interleave.
//!
//! # Lifecycle
//!
//! ```text
//!                 initialize_connection
//!  Disconnected ─────────────────────────▶ Connecting
//!       ▲   ▲                                 │
//!       │   └────── failed first fetch ───────┤
//!       │                                     │ successful fetch
//!       └──────── close_connection ───── Connected
//! ```
//!
//! Each accepted scheduler tick emits [`RefreshEvent::Started`], starts a
//! fetch and re-arms the standard cadence, whatever the fetch outcome will be.
//! The fetch completion updates state, ingests commits and emits
//! [`RefreshEvent::Completed`].
//!
//! A tick that arrives while a fetch is still in flight starts no second
//! request; the pending completion answers it. Every fetch carries a
//! generation number, and completions from a fetch that was aborted by
//! [`ServiceHandle::close_connection`] are discarded.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PollTimings;
use crate::error::ServiceError;
use crate::fetcher::{FetchOutcome, Fetcher, STATUS_UNREACHABLE};
use crate::hub::{ListenerHub, RefreshEvent};
use crate::notify::{new_commit_title, Notifier};
use crate::parser::ActivityParser;
use crate::prefs::PreferenceSource;
use crate::scheduler::Scheduler;
use crate::store::CommitStore;
use crate::types::{Commit, ConnectionState};

/// Default capacity of the service command queue.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Path of the activity page relative to the server base URL.
pub const ACTIVITY_PATH: &str = "activity/";

/// Builds the error message shown for a failed poll.
#[must_use]
pub fn unreachable_message(reason: &str) -> String {
    format!("Unable to reach the server: {reason}")
}

/// Messages processed by the service task.
#[derive(Debug)]
enum Command {
    InitializeConnection { ack: oneshot::Sender<()> },
    CloseConnection { ack: oneshot::Sender<()> },
    CheckNow { ack: oneshot::Sender<()> },
    ConfirmRead {
        sha1: Option<String>,
        ack: oneshot::Sender<()>,
    },
    PrefsUpdated { ack: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<ServiceSnapshot> },
    Shutdown { ack: oneshot::Sender<()> },
    Tick { epoch: u64 },
    FetchCompleted { generation: u64, outcome: FetchOutcome },
}

fn tick(epoch: u64) -> Command {
    Command::Tick { epoch }
}

/// Point-in-time copy of the service state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub state: ConnectionState,
    /// Empty when the last poll succeeded.
    pub last_error_message: String,
    /// All known commits, newest first.
    pub commits: Vec<Commit>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Time until the next scheduled poll, `None` when nothing is armed.
    #[serde(skip)]
    pub next_poll_in: Option<Duration>,
    pub fetch_in_flight: bool,
}

impl ServiceSnapshot {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    /// Unread commits, newest first.
    #[must_use]
    pub fn unread_commits(&self) -> Vec<Commit> {
        self.commits.iter().filter(|c| !c.is_read()).cloned().collect()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.commits.iter().filter(|c| !c.is_read()).count()
    }

    /// At most `n` read commits, newest first.
    #[must_use]
    pub fn last_read_commits(&self, n: usize) -> Vec<Commit> {
        self.commits
            .iter()
            .filter(|c| c.is_read())
            .take(n)
            .cloned()
            .collect()
    }
}

/// Collaborators injected into the polling service.
pub struct Collaborators<F> {
    pub fetcher: Arc<F>,
    pub prefs: Arc<dyn PreferenceSource>,
    pub notifier: Arc<dyn Notifier>,
    pub parser: Arc<dyn ActivityParser>,
}

impl<F> Clone for Collaborators<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            prefs: Arc::clone(&self.prefs),
            notifier: Arc::clone(&self.notifier),
            parser: Arc::clone(&self.parser),
        }
    }
}

/// Entry point for spawning the service task.
pub struct PollingService;

impl PollingService {
    /// Spawns the service task on the current tokio runtime.
    ///
    /// The service starts `Disconnected` with nothing scheduled. It stops when
    /// [`ServiceHandle::shutdown`] is called or every handle has been dropped.
    #[must_use]
    pub fn spawn<F: Fetcher>(
        collaborators: Collaborators<F>,
        hub: ListenerHub,
        timings: PollTimings,
        channel_size: usize,
    ) -> ServiceHandle {
        let (tx, rx) = mpsc::channel(channel_size.max(1));

        let actor = ServiceActor {
            fetcher: collaborators.fetcher,
            prefs: collaborators.prefs,
            notifier: collaborators.notifier,
            parser: collaborators.parser,
            hub,
            timings,
            state: ConnectionState::Disconnected,
            last_error_message: String::new(),
            awaiting_first_response: true,
            store: CommitStore::new(),
            scheduler: Scheduler::new(tx.downgrade(), tick),
            completions: tx.downgrade(),
            in_flight: None,
            next_generation: 0,
            last_success_at: None,
        };

        info!(
            layout = actor.parser.layout().as_str(),
            interval_secs = timings.interval.as_secs(),
            "Polling service started"
        );
        tokio::spawn(actor.run(rx));

        ServiceHandle { tx }
    }
}

/// Cloneable handle to a running polling service.
///
/// Every method waits until the service has processed the request, so state
/// observed right after a call reflects it.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Command>,
}

impl ServiceHandle {
    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), ServiceError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(make(ack))
            .await
            .map_err(|_| ServiceError::Stopped)?;
        done.await.map_err(|_| ServiceError::Stopped)
    }

    /// Starts polling after the initial delay. No-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn initialize_connection(&self) -> Result<(), ServiceError> {
        self.request(|ack| Command::InitializeConnection { ack }).await
    }

    /// Stops polling, aborts any in-flight fetch and forgets all commits.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn close_connection(&self) -> Result<(), ServiceError> {
        self.request(|ack| Command::CloseConnection { ack }).await
    }

    /// Schedules an immediate poll, whatever the connection state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn check_now(&self) -> Result<(), ServiceError> {
        self.request(|ack| Command::CheckNow { ack }).await
    }

    /// Marks the commit with `sha1` and every newer commit as read.
    ///
    /// `None` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn confirm_last_commit_read(
        &self,
        sha1: Option<&str>,
    ) -> Result<(), ServiceError> {
        let sha1 = sha1.map(str::to_string);
        self.request(|ack| Command::ConfirmRead { sha1, ack }).await
    }

    /// Tells the service that preferences changed.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn prefs_updated(&self) -> Result<(), ServiceError> {
        self.request(|ack| Command::PrefsUpdated { ack }).await
    }

    /// Closes the connection and stops the service task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task had already exited.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.request(|ack| Command::Shutdown { ack }).await
    }

    /// Returns a copy of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn snapshot(&self) -> Result<ServiceSnapshot, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn is_connected(&self) -> Result<bool, ServiceError> {
        Ok(self.snapshot().await?.is_connected())
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn is_connecting(&self) -> Result<bool, ServiceError> {
        Ok(self.snapshot().await?.is_connecting())
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_last_error_message(&self) -> Result<String, ServiceError> {
        Ok(self.snapshot().await?.last_error_message)
    }

    /// Unread commits, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_unread_commit(&self) -> Result<Vec<Commit>, ServiceError> {
        Ok(self.snapshot().await?.unread_commits())
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_unread_commit_count(&self) -> Result<usize, ServiceError> {
        Ok(self.snapshot().await?.unread_count())
    }

    /// At most `n` read commits, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_last_read_commit(&self, n: usize) -> Result<Vec<Commit>, ServiceError> {
        Ok(self.snapshot().await?.last_read_commits(n))
    }

    /// Returns `true` once the service task has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
}

struct ServiceActor<F> {
    fetcher: Arc<F>,
    prefs: Arc<dyn PreferenceSource>,
    notifier: Arc<dyn Notifier>,
    parser: Arc<dyn ActivityParser>,
    hub: ListenerHub,
    timings: PollTimings,

    state: ConnectionState,
    last_error_message: String,
    /// Set until the first successful fetch after a (re)connect.
    awaiting_first_response: bool,
    store: CommitStore,
    scheduler: Scheduler<Command>,
    completions: mpsc::WeakSender<Command>,
    in_flight: Option<InFlight>,
    next_generation: u64,
    last_success_at: Option<DateTime<Utc>>,
}

impl<F: Fetcher> ServiceActor<F> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }

        self.scheduler.cancel();
        self.abort_fetch();
        info!("Polling service stopped");
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::InitializeConnection { ack } => {
                self.initialize_connection();
                let _ = ack.send(());
            }
            Command::CloseConnection { ack } => {
                self.close_connection();
                let _ = ack.send(());
            }
            Command::CheckNow { ack } => {
                debug!("Immediate poll requested");
                self.scheduler.reschedule(Duration::ZERO);
                let _ = ack.send(());
            }
            Command::ConfirmRead { sha1, ack } => {
                if let Some(sha1) = sha1 {
                    let changed = self.store.confirm_read_up_to(&sha1);
                    debug!(sha1 = %sha1, changed, "Confirmed commits read");
                    self.emit_completed();
                }
                let _ = ack.send(());
            }
            Command::PrefsUpdated { ack } => {
                info!(server = %self.prefs.get_user_server(), "Preferences updated");
                let _ = ack.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { ack } => {
                self.close_connection();
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
            Command::Tick { epoch } => self.on_tick(epoch),
            Command::FetchCompleted {
                generation,
                outcome,
            } => self.on_fetch_completed(generation, outcome),
        }
        ControlFlow::Continue(())
    }

    fn initialize_connection(&mut self) {
        if self.state == ConnectionState::Connected {
            debug!("Already connected, ignoring initialize");
            return;
        }

        info!(server = %self.prefs.get_user_server(), "Connecting");
        self.state = ConnectionState::Connecting;
        self.last_error_message.clear();
        self.scheduler.reschedule(self.timings.initial_delay);
        self.emit_completed();
    }

    fn close_connection(&mut self) {
        info!(state = %self.state, "Closing connection");
        self.state = ConnectionState::Disconnected;
        self.awaiting_first_response = true;
        self.abort_fetch();
        self.last_error_message.clear();
        self.store.clear();
        self.scheduler.cancel();
        self.last_success_at = None;
        self.emit_completed();
    }

    fn on_tick(&mut self, epoch: u64) {
        if !self.scheduler.fire(epoch) {
            debug!(epoch, "Dropping stale poll tick");
            return;
        }

        if self.in_flight.is_some() {
            debug!("Fetch already in flight, coalescing poll");
        } else {
            self.hub.event(&RefreshEvent::Started);
            self.start_fetch();
        }
        self.scheduler.reschedule(self.timings.interval);
    }

    fn start_fetch(&mut self) {
        self.next_generation += 1;
        let generation = self.next_generation;

        let server = self.prefs.get_user_server();
        let url = format!("{server}{ACTIVITY_PATH}");
        let fetcher = Arc::clone(&self.fetcher);
        let deadline = self.timings.request_timeout;
        let completions = self.completions.clone();

        debug!(generation, url = %url, "Starting fetch");
        let task = tokio::spawn(async move {
            let outcome = if server.is_empty() {
                FetchOutcome::Failure {
                    status: STATUS_UNREACHABLE,
                }
            } else {
                timeout(deadline, fetcher.fetch(&url))
                    .await
                    .unwrap_or(FetchOutcome::Timeout)
            };

            if let Some(tx) = completions.upgrade() {
                let _ = tx
                    .send(Command::FetchCompleted {
                        generation,
                        outcome,
                    })
                    .await;
            }
        });

        self.in_flight = Some(InFlight { generation, task });
    }

    fn abort_fetch(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(generation = in_flight.generation, "Aborting in-flight fetch");
            in_flight.task.abort();
        }
    }

    fn on_fetch_completed(&mut self, generation: u64, outcome: FetchOutcome) {
        match &self.in_flight {
            Some(in_flight) if in_flight.generation == generation => self.in_flight = None,
            _ => {
                debug!(generation, "Discarding stale fetch completion");
                return;
            }
        }

        match outcome {
            FetchOutcome::Success { body, status } => self.on_success(&body, status),
            failed => {
                let reason = failed
                    .failure_reason()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.on_failure(&reason);
            }
        }

        self.emit_completed();
    }

    fn on_success(&mut self, body: &str, status: u16) {
        self.state = ConnectionState::Connected;
        self.last_error_message.clear();
        self.last_success_at = Some(Utc::now());

        let fetched = self.parser.parse(body, &self.prefs.get_user_server());
        let fetched_count = fetched.len();
        let bootstrap = self.awaiting_first_response;
        let report = self.store.ingest(fetched, bootstrap);
        self.awaiting_first_response = false;

        info!(
            status,
            fetched = fetched_count,
            inserted = report.inserted,
            new_commits = report.new_commits.len(),
            bootstrap,
            unread = self.store.unread_count(),
            "Poll succeeded"
        );

        self.announce(&report.new_commits);
    }

    fn on_failure(&mut self, reason: &str) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Disconnected;
        }
        self.last_error_message = unreachable_message(reason);
        warn!(reason = %reason, state = %self.state, "Poll failed");
    }

    /// Fires sound and system notifications for each new commit, in fetch order.
    fn announce(&self, new_commits: &[Commit]) {
        if new_commits.is_empty() {
            return;
        }

        let sound = self.prefs.is_sound_notification_enabled();
        let system = self.prefs.is_system_notification_enabled();
        let duration = self.prefs.get_notification_duration();

        for commit in new_commits {
            if sound {
                self.notifier.play_sound();
            }
            if system {
                self.notifier
                    .show_notification(&new_commit_title(commit), commit.comment(), duration);
            }
        }
    }

    fn emit_completed(&self) {
        self.hub
            .event(&RefreshEvent::completed(&self.last_error_message));
    }

    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            state: self.state,
            last_error_message: self.last_error_message.clone(),
            commits: self.store.commits().to_vec(),
            last_success_at: self.last_success_at,
            next_poll_in: self.scheduler.remaining(),
            fetch_in_flight: self.in_flight.is_some(),
        }
    }
}
