//! Document session lifecycle: open, create, close, save.
//!
//! Bring-up is all or nothing. Every collection is fetched into a detached
//! [`FileState`] first; only when all of them arrived is the state
//! registered, in one step. A failure part way leaves nothing registered and
//! releases the backend handle the session itself acquired.

use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};

use quire_types::DocumentId;

use crate::backend::{Backend, BackendError};
use crate::error::{ClientError, ClientResult};
use crate::history;
use crate::notify::NotificationCenter;
use crate::refresh::Refresher;
use crate::staleness::StalenessGuard;
use crate::store::{ActiveEditorHeal, DocumentStore, FileState};

/// Opens and closes documents against the backend and the store.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: Arc<DocumentStore>,
    guard: Arc<StalenessGuard>,
    refresher: Refresher,
    notifications: Arc<NotificationCenter>,
}

/// How a document handle came to be, which decides cleanup on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// We opened or created it; release it if bring-up fails.
    Acquired,
    /// Someone else opened it; leave it alone.
    Attached,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<DocumentStore>,
        guard: Arc<StalenessGuard>,
        refresher: Refresher,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            backend,
            store,
            guard,
            refresher,
            notifications,
        }
    }

    /// Open an existing document and make it active.
    pub async fn open(&self, path: &str) -> ClientResult<DocumentId> {
        let span = info_span!("session.open", path);
        async {
            let id = self.backend.open_document(path).await?;
            self.register(id, Origin::Acquired).await
        }
        .instrument(span)
        .await
        .inspect_err(|e| {
            self.notifications
                .error(format!("Could not open {path}"), Some(e.to_string()));
        })
    }

    /// Create a new document and make it active.
    pub async fn create(&self, path: &str) -> ClientResult<DocumentId> {
        let span = info_span!("session.create", path);
        async {
            let id = self.backend.create_document(path).await?;
            self.register(id, Origin::Acquired).await
        }
        .instrument(span)
        .await
        .inspect_err(|e| {
            self.notifications
                .error(format!("Could not create {path}"), Some(e.to_string()));
        })
    }

    /// Bring up every document the backend reports open that is not yet
    /// registered. Returns the newly registered IDs.
    ///
    /// A document that fails bring-up is skipped with a warning.
    pub async fn attach_open_documents(&self) -> ClientResult<Vec<DocumentId>> {
        let span = info_span!("session.attach");
        async {
            let open = self.backend.list_open_documents().await?;
            let mut attached = Vec::new();
            for id in open {
                if self.store.contains(&id) {
                    continue;
                }
                match self.register(id.clone(), Origin::Attached).await {
                    Ok(id) => attached.push(id),
                    Err(e) => {
                        warn!(document = %id, error = %e, "skipping document that failed bring-up");
                        self.notifications
                            .warning(format!("Could not load {}", id.short()), Some(e.to_string()));
                    }
                }
            }
            info!(count = attached.len(), "attached open documents");
            Ok(attached)
        }
        .instrument(span)
        .await
    }

    /// Release a document. The most recently opened remaining document
    /// becomes active.
    pub async fn close(&self, document: &DocumentId) -> ClientResult<()> {
        let span = info_span!("session.close", document = %document);
        async {
            if !self.store.contains(document) {
                return Err(ClientError::UnknownDocument(document.clone()));
            }
            self.backend.close_document(document).await?;
            // Guard before store; in-flight refreshes for this document go stale.
            self.guard.forget(document);
            self.store.remove(document)?;
            info!("document closed");
            Ok(())
        }
        .instrument(span)
        .await
        .inspect_err(|e| {
            self.notifications
                .error(format!("Could not close {}", document.short()), Some(e.to_string()));
        })
    }

    pub async fn save(&self, document: &DocumentId) -> ClientResult<()> {
        let span = info_span!("session.save", document = %document);
        self.backend
            .save_document(document)
            .instrument(span)
            .await
            .map_err(ClientError::from)
            .inspect_err(|e| {
                self.notifications
                    .error(format!("Could not save {}", document.short()), Some(e.to_string()));
            })
    }

    // ── Bring-up ────────────────────────────────────────────────────────

    async fn register(&self, id: DocumentId, origin: Origin) -> ClientResult<DocumentId> {
        if self.store.contains(&id) {
            self.store.set_active_document(&id)?;
            return Ok(id);
        }

        let (state, heal) = match self.bring_up(&id).await {
            Ok(built) => built,
            Err(e) => {
                if origin == Origin::Acquired
                    && let Err(close_err) = self.backend.close_document(&id).await
                {
                    warn!(document = %id, error = %close_err, "failed to release document after bring-up failure");
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.insert(state) {
            // Someone registered it while we were fetching; theirs stands.
            warn!(document = %id, error = %e, "document registered concurrently");
            self.store.set_active_document(&id)?;
            return Ok(id);
        }

        if let Some(heal) = heal {
            self.refresher
                .push_active_editor(&id, heal.resolved.as_ref())
                .await;
        }
        info!(document = %id, "document registered");
        Ok(id)
    }

    /// Fetch everything about a document into a detached state.
    async fn bring_up(
        &self,
        id: &DocumentId,
    ) -> Result<(FileState, Option<ActiveEditorHeal>), BackendError> {
        let fallback = self.store.fallback_editor_name();
        let (info, blocks, editors, reported, grants, events) = tokio::try_join!(
            self.backend.get_document_info(id),
            self.backend.list_blocks(id),
            self.backend.list_editors(id),
            self.backend.get_active_editor(id),
            self.backend.list_grants(id),
            self.backend.list_events(id),
        )?;
        if info.id != *id {
            return Err(BackendError::Decode {
                what: "document info".to_string(),
                message: format!("asked for {id}, got {}", info.id),
            });
        }

        let mut state = FileState::new(info);
        state.set_blocks(blocks);
        state.set_editors(editors, fallback);
        let heal = state.apply_reported_active_editor(reported, fallback);
        state.set_grants(grants);
        state.set_events(history::order(events));
        Ok((state, heal))
    }
}
