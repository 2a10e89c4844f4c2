//! Facade over the polling service.
//!
//! The controller owns the listener hub and creates the service lazily, the
//! first time a connection is requested. Until then every query returns its
//! empty default and every command is a no-op.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::config::PollTimings;
use crate::error::ServiceError;
use crate::fetcher::Fetcher;
use crate::hub::{ListenerHub, ListenerId, RefreshEvent, RefreshListener, Subscription};
use crate::service::{Collaborators, PollingService, ServiceHandle, ServiceSnapshot};
use crate::types::Commit;

/// Entry point used by front ends.
pub struct Controller<F> {
    collaborators: Collaborators<F>,
    timings: PollTimings,
    channel_size: usize,
    hub: ListenerHub,
    service: OnceLock<ServiceHandle>,
}

impl<F: Fetcher> Controller<F> {
    #[must_use]
    pub fn new(collaborators: Collaborators<F>, timings: PollTimings, channel_size: usize) -> Self {
        Self {
            collaborators,
            timings,
            channel_size,
            hub: ListenerHub::new(),
            service: OnceLock::new(),
        }
    }

    /// The hub listeners are registered on.
    #[must_use]
    pub fn hub(&self) -> &ListenerHub {
        &self.hub
    }

    pub fn add_listener(&self, listener: Arc<dyn RefreshListener>) -> ListenerId {
        self.hub.add_listener(listener)
    }

    /// Removes a listener. Removing an unknown listener is a no-op.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.hub.remove_listener(id)
    }

    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(&self, listener: Arc<dyn RefreshListener>) -> Subscription {
        self.hub.subscribe(listener)
    }

    /// Sends `event` to every listener.
    pub fn event(&self, event: &RefreshEvent) {
        self.hub.event(event);
    }

    fn service(&self, create: bool) -> Option<&ServiceHandle> {
        if create {
            Some(self.service.get_or_init(|| {
                debug!("Creating polling service");
                PollingService::spawn(
                    self.collaborators.clone(),
                    self.hub.clone(),
                    self.timings,
                    self.channel_size,
                )
            }))
        } else {
            self.service.get()
        }
    }

    /// Returns `true` once the service exists and is running.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.service(false).is_some_and(|s| !s.is_stopped())
    }

    fn running(&self) -> Option<&ServiceHandle> {
        self.service(false).filter(|s| !s.is_stopped())
    }

    /// Connects if a server is configured. Returns whether a connection was
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn auto_connect(&self) -> Result<bool, ServiceError> {
        if self.collaborators.prefs.get_user_server().is_empty() {
            info!("No server configured, skipping auto-connect");
            return Ok(false);
        }
        self.initialize_connection().await
    }

    /// Creates the service if needed and starts connecting, unless already
    /// connected. Returns whether a connection was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn initialize_connection(&self) -> Result<bool, ServiceError> {
        if self.is_connected().await? {
            return Ok(false);
        }
        if let Some(service) = self.service(true) {
            service.initialize_connection().await?;
        }
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn close_connection(&self) -> Result<(), ServiceError> {
        match self.running() {
            Some(service) => service.close_connection().await,
            None => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn check_now(&self) -> Result<(), ServiceError> {
        match self.running() {
            Some(service) => service.check_now().await,
            None => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn confirm_last_commit_read(&self, sha1: Option<&str>) -> Result<(), ServiceError> {
        match self.running() {
            Some(service) => service.confirm_last_commit_read(sha1).await,
            None => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn prefs_updated(&self) -> Result<(), ServiceError> {
        match self.running() {
            Some(service) => service.prefs_updated().await,
            None => Ok(()),
        }
    }

    /// Opens the server's web interface. No-op before initialization.
    pub fn open_web_interface(&self) {
        if !self.is_initialized() {
            return;
        }
        let server = self.collaborators.prefs.get_user_server();
        self.collaborators.notifier.open_url(&server);
    }

    /// Snapshot of the service, `None` before initialization.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn snapshot(&self) -> Result<Option<ServiceSnapshot>, ServiceError> {
        match self.running() {
            Some(service) => service.snapshot().await.map(Some),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn is_connected(&self) -> Result<bool, ServiceError> {
        Ok(self.snapshot().await?.is_some_and(|s| s.is_connected()))
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn is_connecting(&self) -> Result<bool, ServiceError> {
        Ok(self.snapshot().await?.is_some_and(|s| s.is_connecting()))
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_last_error_message(&self) -> Result<String, ServiceError> {
        Ok(self
            .snapshot()
            .await?
            .map(|s| s.last_error_message)
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_unread_commit(&self) -> Result<Vec<Commit>, ServiceError> {
        Ok(self
            .snapshot()
            .await?
            .map(|s| s.unread_commits())
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_unread_commit_count(&self) -> Result<usize, ServiceError> {
        Ok(self.snapshot().await?.map_or(0, |s| s.unread_count()))
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task has exited.
    pub async fn get_last_read_commit(&self, n: usize) -> Result<Vec<Commit>, ServiceError> {
        Ok(self
            .snapshot()
            .await?
            .map(|s| s.last_read_commits(n))
            .unwrap_or_default())
    }

    /// Stops the service, if one was created.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the service task had already exited.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        match self.running() {
            Some(service) => service.shutdown().await,
            None => Ok(()),
        }
    }
}
