//! CommitFeed Monitor - activity feed notifier.
//!
//! This binary polls a Gitblit server's activity page and announces new
//! commits in the terminal.
//!
//! # Commands
//!
//! - `commitfeed-monitor run`: Start the polling daemon
//! - `commitfeed-monitor check`: Fetch the activity page once and print it
//! - `commitfeed-monitor prefs`: Show or change preferences
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commitfeed_monitor::badge::Badge;
use commitfeed_monitor::config::{Config, Settings};
use commitfeed_monitor::controller::Controller;
use commitfeed_monitor::fetcher::{FetchOutcome, Fetcher, HttpFetcher};
use commitfeed_monitor::hub::RefreshEvent;
use commitfeed_monitor::notify::TerminalNotifier;
use commitfeed_monitor::parser::{parser_for, LayoutVersion};
use commitfeed_monitor::prefs::{PreferenceSource, SharedPreferences};
use commitfeed_monitor::service::{unreachable_message, Collaborators, ACTIVITY_PATH};
use commitfeed_monitor::types::Commit;
use commitfeed_monitor::utils::max_string_length;

/// Characters of the sha1 shown by `check`.
const SHORT_SHA1_LEN: usize = 8;

/// CommitFeed Monitor - activity feed notifier.
///
/// Polls a Gitblit server's activity page and notifies about new commits.
#[derive(Parser, Debug)]
#[command(name = "commitfeed-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    COMMITFEED_SERVER_URL            Server URL (overrides the preference file)
    COMMITFEED_PREFS_PATH            Preference file (default: <config dir>/commitfeed/prefs.json)
    COMMITFEED_POLL_INTERVAL_SECS    Seconds between polls (default: 120)
    COMMITFEED_REQUEST_TIMEOUT_SECS  Request timeout (default: 30)
    COMMITFEED_CHANNEL_SIZE          Service command queue capacity (default: 64)

EXAMPLES:
    # Remember the server
    commitfeed-monitor prefs --set userServer=https://git.example.com

    # Fetch the activity page once
    commitfeed-monitor check --json

    # Start the monitor
    commitfeed-monitor run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the polling daemon.
    ///
    /// Connects to the configured server and prints a notification for every
    /// new commit until interrupted.
    Run,

    /// Fetch the activity page once and print the commits found.
    Check {
        /// Print commits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the effective preferences, optionally changing some first.
    Prefs {
        /// Set a preference, e.g. `--set notificationDuration=5`.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Prefs { set } => run_prefs(&set),
        Command::Run => build_runtime()?.block_on(run_monitor()),
        Command::Check { json } => build_runtime()?.block_on(run_check(json)),
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Loads configuration and preferences, applying the server override.
fn load_settings() -> Result<(Config, Arc<SharedPreferences>)> {
    let Settings { config, prefs } = Settings::load().context("Failed to load settings")?;

    info!(
        server = %prefs.get_user_server(),
        prefs_path = %config.prefs_path.display(),
        "Configuration loaded"
    );
    Ok((config, Arc::new(prefs)))
}

/// Runs the monitor daemon.
async fn run_monitor() -> Result<()> {
    info!("Starting CommitFeed Monitor");

    let (config, prefs) = load_settings()?;
    let timings = config.timings();
    let fetcher = HttpFetcher::new(timings.request_timeout).context("Failed to create HTTP client")?;

    let controller = Controller::new(
        Collaborators {
            fetcher: Arc::new(fetcher),
            prefs: prefs.clone(),
            notifier: Arc::new(TerminalNotifier::new()),
            parser: Arc::from(parser_for(LayoutVersion::default())),
        },
        timings,
        config.channel_size,
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RefreshEvent>();
    let _subscription = controller.subscribe(Arc::new(move |event: &RefreshEvent| {
        let _ = event_tx.send(event.clone());
    }));

    if !controller.auto_connect().await? {
        bail!(
            "No server configured. Set COMMITFEED_SERVER_URL or run \
             'commitfeed-monitor prefs --set userServer=<url>'."
        );
    }

    info!("Monitor running. Press Ctrl+C to stop.");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut badge = Badge::default();

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            Some(event) = event_rx.recv() => {
                let snapshot = controller.snapshot().await?;
                let next = Badge::compute(&event, snapshot.as_ref(), &badge.text);
                if next != badge {
                    info!(badge = %next, "Badge updated");
                }
                if let RefreshEvent::Completed { error: Some(error) } = &event {
                    warn!(error = %error, "Last poll failed");
                }
                badge = next;
            }
        }
    }

    info!("Shutting down...");
    controller.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

/// Fetches and parses the activity page once.
async fn run_check(json: bool) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let server = settings
        .require_server()
        .context("No server configured. Set COMMITFEED_SERVER_URL or userServer in the preferences")?;
    let Settings { config, prefs } = settings;

    let timings = config.timings();
    let fetcher = HttpFetcher::new(timings.request_timeout).context("Failed to create HTTP client")?;
    let url = format!("{server}{ACTIVITY_PATH}");

    let outcome = tokio::time::timeout(timings.request_timeout, fetcher.fetch(&url))
        .await
        .unwrap_or(FetchOutcome::Timeout);

    let body = match outcome {
        FetchOutcome::Success { body, .. } => body,
        failed => {
            let reason = failed.failure_reason().unwrap_or_default();
            bail!(unreachable_message(&reason));
        }
    };

    let commits: Vec<Commit> = parser_for(LayoutVersion::default())
        .parse(&body, &server)
        .into_iter()
        .map(Commit::from)
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&commits).context("Failed to serialize commits")?
        );
        return Ok(());
    }

    if commits.is_empty() {
        println!("No activity found at {url}");
        return Ok(());
    }

    let max_comment = prefs.get_commit_nb_characters_displayed();
    for commit in &commits {
        let short_sha1: String = commit.sha1().chars().take(SHORT_SHA1_LEN).collect();
        println!(
            "{} {}  {} [{}] {} {}",
            commit.date(),
            commit.time(),
            commit.project(),
            commit.branch(),
            short_sha1,
            commit.author()
        );
        println!("    {}", max_string_length(commit.comment(), max_comment));
    }

    Ok(())
}

/// Applies `KEY=VALUE` assignments and prints the resulting preferences.
fn run_prefs(assignments: &[String]) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let prefs = SharedPreferences::open(config.prefs_path.clone()).context(format!(
        "Failed to load preferences from {}",
        config.prefs_path.display()
    ))?;

    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{assignment}'");
        };
        prefs
            .set(key.trim(), value)
            .context(format!("Failed to set {}", key.trim()))?;
    }

    if !assignments.is_empty() {
        prefs.save().context("Failed to save preferences")?;
        eprintln!("Preferences saved to {}", config.prefs_path.display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&prefs.snapshot()).context("Failed to serialize preferences")?
    );
    Ok(())
}

/// Initializes the tracing subscriber for logging.
///
/// Logs go to stderr so command output on stdout stays clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
