//! Refresh fan-out to UI subscribers.
//!
//! Listeners are called synchronously, in registration order, every time the
//! polling service changes something observers may care about. Registration
//! returns a [`ListenerId`] for manual removal, or use
//! [`ListenerHub::subscribe`] to get a [`Subscription`] that unregisters itself
//! when dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use commitfeed_monitor::hub::{ListenerHub, RefreshEvent};
//!
//! let hub = ListenerHub::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//!
//! let subscription = hub.subscribe(Arc::new(move |_: &RefreshEvent| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! hub.event(&RefreshEvent::Started);
//! drop(subscription);
//! hub.event(&RefreshEvent::Started);
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::trace;

/// Payload delivered to every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// A poll has started; observers typically show a busy indicator.
    Started,

    /// State changed or a poll finished. `error` mirrors the service's last
    /// error message, `None` when there is none.
    Completed { error: Option<String> },
}

impl RefreshEvent {
    /// Builds a `Completed` event from a possibly empty error message.
    #[must_use]
    pub fn completed(last_error_message: &str) -> Self {
        let error = (!last_error_message.is_empty()).then(|| last_error_message.to_string());
        Self::Completed { error }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Receiver of refresh events.
pub trait RefreshListener: Send + Sync {
    fn refresh(&self, event: &RefreshEvent);
}

impl<F> RefreshListener for F
where
    F: Fn(&RefreshEvent) + Send + Sync,
{
    fn refresh(&self, event: &RefreshEvent) {
        self(event);
    }
}

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn RefreshListener>)>,
}

/// Ordered registry of refresh listeners.
///
/// Cloning the hub yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ListenerHub {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHub")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener at the end of the call order.
    pub fn add_listener(&self, listener: Arc<dyn RefreshListener>) -> ListenerId {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.push((id, listener));
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    /// Registers a listener for the lifetime of the returned [`Subscription`].
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(&self, listener: Arc<dyn RefreshListener>) -> Subscription {
        let id = self.add_listener(listener);
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Calls every registered listener with `event`, in registration order.
    ///
    /// The registry lock is released before listeners run, so a listener may
    /// add or remove listeners; such changes apply from the next event on.
    pub fn event(&self, event: &RefreshEvent) {
        let listeners: Vec<Arc<dyn RefreshListener>> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(listeners = listeners.len(), ?event, "Dispatching refresh");
        for listener in listeners {
            listener.refresh(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposer for a listener registered with [`ListenerHub::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unregisters the listener now. Same as dropping the subscription.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let hub = ListenerHub { registry };
            hub.remove_listener(self.id);
        }
    }
}
