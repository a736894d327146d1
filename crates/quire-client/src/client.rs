//! The composition root.
//!
//! A [`QuireClient`] bundles one backend handle with the state every client
//! component shares. Construct one explicitly and pass it (or clones of it)
//! wherever client state is needed; there is no global instance.

use std::sync::Arc;

use quire_types::DocumentId;

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::history::Historian;
use crate::notify::NotificationCenter;
use crate::refresh::Refresher;
use crate::session::SessionManager;
use crate::staleness::StalenessGuard;
use crate::store::DocumentStore;

/// Shared client context. Cheap to clone.
#[derive(Clone)]
pub struct QuireClient {
    backend: Arc<dyn Backend>,
    store: Arc<DocumentStore>,
    guard: Arc<StalenessGuard>,
    notifications: Arc<NotificationCenter>,
    config: Arc<ClientConfig>,
}

impl QuireClient {
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        let notifications = NotificationCenter::from_config(&config.notifications);
        Self {
            backend,
            store: Arc::new(DocumentStore::new(config.fallback_editor_name.clone())),
            guard: Arc::new(StalenessGuard::new()),
            notifications: Arc::new(notifications),
            config: Arc::new(config),
        }
    }

    /// Client with default configuration.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, ClientConfig::default())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<StalenessGuard> {
        &self.guard
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn refresher(&self) -> Refresher {
        Refresher::new(
            self.backend.clone(),
            self.store.clone(),
            self.guard.clone(),
            self.notifications.clone(),
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.backend.clone(),
            self.store.clone(),
            self.refresher(),
            self.notifications.clone(),
            self.config.notifications.success_notifications,
        )
    }

    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(
            self.backend.clone(),
            self.store.clone(),
            self.guard.clone(),
            self.refresher(),
            self.notifications.clone(),
        )
    }

    pub fn historian(&self) -> Historian {
        Historian::new(
            self.backend.clone(),
            self.store.clone(),
            self.guard.clone(),
            self.notifications.clone(),
        )
    }

    /// The document most UI intents should target.
    pub fn active_document(&self) -> Option<DocumentId> {
        self.store.active_document()
    }
}
