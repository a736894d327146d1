//! Guarded read-backs of cached collections.
//!
//! A refresh takes a staleness ticket, asks the backend for one collection,
//! and replaces the cached collection only if the ticket is still current when
//! the response lands. Failures keep the last known good state and raise one
//! warning; nothing is retried.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{Instrument, debug, info_span, trace, warn};

use quire_types::{Collection, DocumentId, EditorId, Invalidation};

use crate::backend::{Backend, BackendResult};
use crate::error::{ClientError, ClientResult};
use crate::history;
use crate::notify::NotificationCenter;
use crate::staleness::{Stale, StalenessGuard, Ticket};
use crate::store::DocumentStore;

/// Result of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The response was applied; `count` items are now cached.
    Applied { count: usize },
    /// The response was discarded (see reason).
    Skipped { reason: SkipReason },
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }
}

/// Reason why a response was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A newer read for the same collection was issued meanwhile.
    Superseded { seq: u64, latest: u64 },
    /// The document was closed while the read was in flight.
    DocumentClosed,
}

impl From<Stale> for SkipReason {
    fn from(stale: Stale) -> Self {
        match stale.latest {
            Some(latest) => SkipReason::Superseded {
                seq: stale.ticket.seq(),
                latest,
            },
            None => SkipReason::DocumentClosed,
        }
    }
}

/// Issues guarded refreshes against one backend and store.
#[derive(Clone)]
pub struct Refresher {
    backend: Arc<dyn Backend>,
    store: Arc<DocumentStore>,
    guard: Arc<StalenessGuard>,
    notifications: Arc<NotificationCenter>,
}

impl Refresher {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<DocumentStore>,
        guard: Arc<StalenessGuard>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            backend,
            store,
            guard,
            notifications,
        }
    }

    /// Refresh every collection in `scope` concurrently.
    ///
    /// Each collection has its own ticket, so results are independent.
    pub async fn refresh_scope(
        &self,
        document: &DocumentId,
        scope: Invalidation,
    ) -> Vec<(Collection, ClientResult<RefreshOutcome>)> {
        let collections = scope.collections();
        let results = join_all(collections.iter().map(|c| self.refresh(document, *c))).await;
        collections.into_iter().zip(results).collect()
    }

    /// Refresh one collection.
    pub async fn refresh(
        &self,
        document: &DocumentId,
        collection: Collection,
    ) -> ClientResult<RefreshOutcome> {
        let ticket = self.guard.issue(document, collection);
        self.refresh_issued(ticket).await
    }

    /// Take a ticket now and refresh later with [`Refresher::refresh_issued`].
    ///
    /// Lets a caller fix its place in line before an unrelated round trip.
    pub fn issue(&self, document: &DocumentId, collection: Collection) -> Ticket {
        self.guard.issue(document, collection)
    }

    /// Refresh the collection named by an already issued ticket.
    pub async fn refresh_issued(&self, ticket: Ticket) -> ClientResult<RefreshOutcome> {
        let document = ticket.document().clone();
        let collection = ticket.collection();
        let span = info_span!("refresh", document = %document, %collection, seq = ticket.seq());
        async {
            let document = &document;
            match collection {
                Collection::Blocks => {
                    let response = self.backend.list_blocks(document).await;
                    self.settle(&ticket, response, |blocks| {
                        self.store.replace_blocks(document, blocks, ticket.seq())
                    })
                }
                Collection::Editors => {
                    let response = self.backend.list_editors(document).await;
                    let mut heal = None;
                    let outcome = self.settle(&ticket, response, |editors| {
                        let count = editors.len();
                        heal = self.store.replace_editors(document, editors)?;
                        Ok(count)
                    })?;
                    if let Some(heal) = heal {
                        self.push_active_editor(document, heal.resolved.as_ref()).await;
                    }
                    Ok(outcome)
                }
                Collection::Grants => {
                    let response = self.backend.list_grants(document).await;
                    self.settle(&ticket, response, |grants| {
                        let count = grants.len();
                        self.store.replace_grants(document, grants)?;
                        Ok(count)
                    })
                }
                Collection::Events => {
                    let response = self.backend.list_events(document).await;
                    self.settle(&ticket, response, |events| {
                        let count = events.len();
                        self.store.replace_events(document, history::order(events))?;
                        Ok(count)
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Tell the backend about a locally healed active editor. Best effort.
    pub(crate) async fn push_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
    ) {
        match self.backend.set_active_editor(document, editor).await {
            Ok(()) => debug!(document = %document, editor = ?editor, "pushed healed active editor"),
            Err(e) => warn!(document = %document, error = %e, "failed to push healed active editor"),
        }
    }

    /// Apply `response` if `ticket` is still current.
    fn settle<T>(
        &self,
        ticket: &Ticket,
        response: BackendResult<T>,
        apply: impl FnOnce(T) -> ClientResult<usize>,
    ) -> ClientResult<RefreshOutcome> {
        match response {
            Ok(value) => match self.guard.commit(ticket, || apply(value)) {
                Ok(applied) => {
                    let count = applied?;
                    trace!(ticket = %ticket, count, "refresh applied");
                    Ok(RefreshOutcome::Applied { count })
                }
                Err(stale) => {
                    debug!(ticket = %ticket, latest = ?stale.latest, "discarding stale response");
                    Ok(RefreshOutcome::Skipped {
                        reason: stale.into(),
                    })
                }
            },
            Err(source) => {
                if !self.guard.is_current(ticket) {
                    // A newer read owns this key; its result is what matters.
                    let latest = self.guard.latest(ticket.document(), ticket.collection());
                    debug!(ticket = %ticket, error = %source, "ignoring failure of superseded read");
                    return Ok(RefreshOutcome::Skipped {
                        reason: Stale {
                            ticket: ticket.clone(),
                            latest,
                        }
                        .into(),
                    });
                }
                warn!(ticket = %ticket, error = %source, "refresh failed, keeping last known state");
                self.notifications.warning(
                    format!("Could not refresh {}", ticket.collection()),
                    Some(source.to_string()),
                );
                Err(ClientError::RefreshFailed {
                    document: ticket.document().clone(),
                    collection: ticket.collection(),
                    source,
                })
            }
        }
    }
}
