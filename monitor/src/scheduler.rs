//! Single-flight poll scheduler.
//!
//! At most one timer is pending at any time. [`Scheduler::reschedule`] cancels
//! the pending timer before arming a new one, so double-arming is impossible.
//! When the timer fires, a tick message built from the current epoch is sent
//! to the owning task. The owner checks [`Scheduler::fire`] before acting on
//! a tick, which drops ticks that were already queued when a newer timer was
//! armed.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{trace, warn};

/// Deadline used when `now + delay` does not fit in an [`Instant`].
///
/// Same horizon tokio falls back to for unbounded timeouts.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Cancellable one-shot timer that posts ticks to an mpsc channel.
#[derive(Debug)]
pub struct Scheduler<T> {
    target: mpsc::WeakSender<T>,
    make_tick: fn(u64) -> T,
    epoch: u64,
    pending: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl<T: Send + 'static> Scheduler<T> {
    /// Creates an idle scheduler.
    ///
    /// The scheduler only keeps a weak sender so it never keeps the owner's
    /// channel open on its own.
    #[must_use]
    pub fn new(target: mpsc::WeakSender<T>, make_tick: fn(u64) -> T) -> Self {
        Self {
            target,
            make_tick,
            epoch: 0,
            pending: None,
            deadline: None,
        }
    }

    /// Cancels any pending timer and arms a new one firing after `delay`.
    pub fn reschedule(&mut self, delay: Duration) {
        self.cancel();

        self.epoch += 1;
        let epoch = self.epoch;
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or_else(|| {
            warn!(delay_secs = delay.as_secs(), "Poll delay out of range, clamping");
            now + FAR_FUTURE
        });
        let target = self.target.clone();
        let tick = (self.make_tick)(epoch);

        trace!(epoch, delay_ms = delay.as_millis() as u64, "Poll timer armed");

        self.deadline = Some(deadline);
        self.pending = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(tx) = target.upgrade() {
                let _ = tx.send(tick).await;
            }
        }));
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.deadline = None;
    }

    /// Accepts a tick carrying `epoch`.
    ///
    /// Returns `false` for ticks of a timer that has since been cancelled or
    /// replaced. An accepted tick disarms the scheduler.
    pub fn fire(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.deadline.is_none() {
            return false;
        }
        self.pending = None;
        self.deadline = None;
        true
    }

    /// Time left until the pending timer fires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Tick(u64);

    fn make_tick(epoch: u64) -> Tick {
        Tick(epoch)
    }

    /// The paused clock rounds timers up to the next millisecond.
    fn assert_about(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(2),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);
        let start = Instant::now();

        scheduler.reschedule(Duration::from_millis(1000));
        let Tick(epoch) = rx.recv().await.unwrap();

        assert_about(start.elapsed(), Duration::from_millis(1000));
        assert!(scheduler.fire(epoch));
        assert_eq!(scheduler.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);
        let start = Instant::now();

        scheduler.reschedule(Duration::from_secs(120));
        scheduler.reschedule(Duration::from_secs(5));

        let Tick(epoch) = rx.recv().await.unwrap();
        assert_about(start.elapsed(), Duration::from_secs(5));
        assert!(scheduler.fire(epoch));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(rx.try_recv().is_err(), "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ticks_are_rejected() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);

        scheduler.reschedule(Duration::ZERO);
        let Tick(stale) = rx.recv().await.unwrap();
        scheduler.reschedule(Duration::from_secs(120));

        assert!(!scheduler.fire(stale));
        assert!(scheduler.remaining().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);

        scheduler.reschedule(Duration::from_secs(1));
        scheduler.cancel();

        assert_eq!(scheduler.remaining(), None);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_reports_time_to_deadline() {
        let (tx, _rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);

        scheduler.reschedule(Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(20)).await;

        let remaining = scheduler.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(100));
        assert!(remaining >= Duration::from_millis(99_998));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_delay_is_clamped_instead_of_overflowing() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx.downgrade(), make_tick);

        scheduler.reschedule(Duration::from_secs(u64::MAX));

        let remaining = scheduler.remaining().unwrap();
        assert!(remaining >= FAR_FUTURE - Duration::from_millis(1));
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert!(rx.try_recv().is_err());

        scheduler.reschedule(Duration::ZERO);
        let Tick(epoch) = rx.recv().await.unwrap();
        assert!(scheduler.fire(epoch));
    }
}
