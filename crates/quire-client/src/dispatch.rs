//! Command dispatch.
//!
//! Turns a UI intent into a backend command and brings the cache back in
//! line afterwards:
//!
//! ```text
//! intent ─► resolve editor ─► Command ─► backend.execute ─► Events
//!                                                  │
//!                     capability.invalidates() ◄───┘
//!                                │
//!                     guarded refresh of exactly those collections
//! ```
//!
//! A failed dispatch leaves local state untouched and raises exactly one
//! error notification. There is no automatic retry.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};

use quire_types::capability::{
    CORE_CREATE, CORE_DELETE, CORE_GRANT, CORE_LINK, CORE_RENAME, CORE_REVOKE, CORE_UNLINK,
    EDITOR_CREATE, EDITOR_DELETE,
};
use quire_types::{
    BlockContent, BlockId, BlockKind, CapabilityId, Collection, Command, ContentError, DocumentId,
    EditorId, EditorKind, Event,
};

use crate::backend::{Backend, BackendError};
use crate::error::{ClientError, ClientResult};
use crate::notify::NotificationCenter;
use crate::refresh::Refresher;
use crate::store::DocumentStore;

/// Sends commands on behalf of editors and refreshes what they invalidate.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    store: Arc<DocumentStore>,
    refresher: Refresher,
    notifications: Arc<NotificationCenter>,
    success_notifications: bool,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<DocumentStore>,
        refresher: Refresher,
        notifications: Arc<NotificationCenter>,
        success_notifications: bool,
    ) -> Self {
        Self {
            backend,
            store,
            refresher,
            notifications,
            success_notifications,
        }
    }

    // ========================================================================
    // Core dispatch
    // ========================================================================

    /// Execute `capability` on `block` as `editor` (or the fallback actor).
    ///
    /// Returns the events the backend produced. Refresh failures after a
    /// successful execute do not fail the dispatch; they are reported through
    /// notifications and the cache keeps its last good state.
    pub async fn dispatch(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        capability: CapabilityId,
        block: BlockId,
        payload: Value,
    ) -> ClientResult<Vec<Event>> {
        let result = self
            .dispatch_quiet(document, editor, capability.clone(), block, payload)
            .await;
        self.report(&capability, &result);
        result
    }

    /// Dispatch without notifying; callers report the combined outcome.
    async fn dispatch_quiet(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        capability: CapabilityId,
        block: BlockId,
        payload: Value,
    ) -> ClientResult<Vec<Event>> {
        let span = info_span!(
            "dispatch.command",
            document = %document,
            capability = %capability,
            block = %block,
        );
        async {
            if !self.store.contains(document) {
                return Err(ClientError::UnknownDocument(document.clone()));
            }
            let editor = self.resolve_editor(document, editor).await?;
            let command = Command::new(editor, capability.clone(), block, payload);
            debug!(command = %command.id, editor = %command.editor_id, "executing");

            let events = self
                .backend
                .execute(document, &command)
                .await
                .map_err(|e| rejection(&capability, e))?;
            info!(events = events.len(), "command accepted");

            for (collection, result) in self
                .refresher
                .refresh_scope(document, capability.invalidates())
                .await
            {
                if let Err(e) = result {
                    warn!(%collection, error = %e, "post-dispatch refresh failed");
                }
            }
            Ok(events)
        }
        .instrument(span)
        .await
    }

    /// Explicit editor, else the document's active editor, else the backend's
    /// configured system editor.
    async fn resolve_editor(
        &self,
        document: &DocumentId,
        explicit: Option<&EditorId>,
    ) -> ClientResult<EditorId> {
        if let Some(editor) = explicit {
            return Ok(editor.clone());
        }
        if let Some(active) = self.store.active_editor_id(document)? {
            return Ok(active);
        }
        match self.backend.system_editor_id().await? {
            Some(system) => {
                debug!(editor = %system, "no active editor, acting as system editor");
                Ok(system)
            }
            None => Err(ClientError::MissingActor),
        }
    }

    fn report<T>(&self, capability: &CapabilityId, result: &ClientResult<T>) {
        match result {
            Ok(_) if self.success_notifications => {
                self.notifications.success(format!("{capability} done"), None);
            }
            Ok(_) => {}
            Err(e) => {
                self.notifications
                    .error(format!("{capability} failed"), Some(e.to_string()));
            }
        }
    }

    // ========================================================================
    // Block intents
    // ========================================================================

    /// Create a block. Returns its backend-assigned ID.
    pub async fn create_block(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        name: &str,
        kind: BlockKind,
    ) -> ClientResult<BlockId> {
        let capability = CapabilityId::new(CORE_CREATE);
        let result = async {
            let events = self
                .dispatch_quiet(
                    document,
                    editor,
                    capability.clone(),
                    BlockId::wildcard(),
                    json!({ "name": name, "block_type": kind.as_str() }),
                )
                .await?;
            created_entity(&events, &capability).map(BlockId::new)
        }
        .await;
        self.report(&capability, &result);
        result
    }

    /// Replace a block's content with `content`, using the write capability
    /// for its type.
    pub async fn write_block(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        block: &BlockId,
        content: BlockContent,
    ) -> ClientResult<Vec<Event>> {
        let capability = CapabilityId::write_for(content.kind());
        let result = async {
            check_content(document, &self.store, block, &content)
                .map_err(|e| ClientError::CommandRejected {
                    capability: capability.clone(),
                    reason: e.to_string(),
                })?;
            self.dispatch_quiet(
                document,
                editor,
                capability.clone(),
                block.clone(),
                content.to_payload(),
            )
            .await
        }
        .await;
        self.report(&capability, &result);
        result
    }

    pub async fn rename_block(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        block: &BlockId,
        name: &str,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_RENAME),
            block.clone(),
            json!({ "name": name }),
        )
        .await
    }

    pub async fn delete_block(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        block: &BlockId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_DELETE),
            block.clone(),
            Value::Null,
        )
        .await
    }

    /// Add `from --relation--> to`.
    pub async fn link_blocks(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        from: &BlockId,
        relation: &str,
        to: &BlockId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_LINK),
            from.clone(),
            json!({ "relation": relation, "target_id": to }),
        )
        .await
    }

    /// Remove `from --relation--> to`.
    pub async fn unlink_blocks(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        from: &BlockId,
        relation: &str,
        to: &BlockId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_UNLINK),
            from.clone(),
            json!({ "relation": relation, "target_id": to }),
        )
        .await
    }

    // ========================================================================
    // Grant intents
    // ========================================================================

    /// Grant `target` the right to exercise `capability` on `block` (or `*`).
    pub async fn grant(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        target: &EditorId,
        capability: &CapabilityId,
        block: &BlockId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_GRANT),
            block.clone(),
            grant_payload(target, capability, block),
        )
        .await
    }

    pub async fn revoke(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        target: &EditorId,
        capability: &CapabilityId,
        block: &BlockId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(CORE_REVOKE),
            block.clone(),
            grant_payload(target, capability, block),
        )
        .await
    }

    // ========================================================================
    // Editor intents
    // ========================================================================

    /// Register a new editor. Returns its backend-assigned ID.
    pub async fn create_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        name: &str,
        kind: EditorKind,
    ) -> ClientResult<EditorId> {
        let capability = CapabilityId::new(EDITOR_CREATE);
        let result = async {
            let events = self
                .dispatch_quiet(
                    document,
                    editor,
                    capability.clone(),
                    BlockId::wildcard(),
                    json!({ "name": name, "editor_type": kind }),
                )
                .await?;
            created_entity(&events, &capability).map(EditorId::new)
        }
        .await;
        self.report(&capability, &result);
        result
    }

    pub async fn delete_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
        target: &EditorId,
    ) -> ClientResult<Vec<Event>> {
        self.dispatch(
            document,
            editor,
            CapabilityId::new(EDITOR_DELETE),
            BlockId::wildcard(),
            json!({ "editor_id": target }),
        )
        .await
    }

    // ========================================================================
    // Local pointers
    // ========================================================================

    /// Switch the active editor.
    ///
    /// The selection is cleared and the local pointer moves before the backend
    /// is asked. The grants refresh ticket is also taken up front, so among
    /// overlapping switches the last one issued decides what is visible. If the
    /// backend refuses, the pointer reverts unless a later switch already moved
    /// it; the selection stays cleared.
    pub async fn set_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<EditorId>,
    ) -> ClientResult<()> {
        let span = info_span!("dispatch.set_active_editor", document = %document, editor = ?editor);
        let result = async {
            let previous = self.store.switch_active_editor(document, editor.clone())?;
            let ticket = self.refresher.issue(document, Collection::Grants);

            let pushed = self.backend.set_active_editor(document, editor.as_ref()).await;
            if let Err(e) = &pushed {
                let reverted = self
                    .store
                    .revert_active_editor(document, editor.as_ref(), previous)?;
                warn!(error = %e, reverted, "backend refused active editor switch");
            }

            // Runs either way so the ticket taken above never strands the key.
            if let Err(e) = self.refresher.refresh_issued(ticket).await {
                warn!(error = %e, "grants refresh after editor switch failed");
            }
            pushed.map_err(ClientError::from)
        }
        .instrument(span)
        .await;

        if let Err(e) = &result {
            self.notifications
                .error("Could not switch editor", Some(e.to_string()));
        }
        result
    }

    /// Select a block, or clear the selection. Local only.
    pub fn select_block(&self, document: &DocumentId, block: Option<BlockId>) -> ClientResult<()> {
        let result = self.store.select_block(document, block);
        if let Err(e) = &result {
            self.notifications
                .error("Could not select block", Some(e.to_string()));
        }
        result
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn rejection(capability: &CapabilityId, error: BackendError) -> ClientError {
    match error {
        BackendError::Rejected(reason) | BackendError::NotFound(reason) => {
            ClientError::CommandRejected {
                capability: capability.clone(),
                reason,
            }
        }
        other => ClientError::Backend(other),
    }
}

fn grant_payload(target: &EditorId, capability: &CapabilityId, block: &BlockId) -> Value {
    json!({
        "target_editor": target,
        "capability": capability,
        "target_block": block,
    })
}

/// The entity a creation command produced.
fn created_entity(events: &[Event], capability: &CapabilityId) -> ClientResult<String> {
    events
        .iter()
        .find(|e| e.capability_id().as_ref() == Some(capability))
        .map(|e| e.entity.clone())
        .ok_or_else(|| {
            ClientError::InvariantViolation(format!("{capability} produced no creation event"))
        })
}

/// Client-side content checks before a write leaves.
fn check_content(
    document: &DocumentId,
    store: &DocumentStore,
    block: &BlockId,
    content: &BlockContent,
) -> Result<(), ContentError> {
    content.validate()?;
    if let Ok(Some(existing)) = store.block(document, block)
        && existing.kind() != content.kind()
    {
        return Err(ContentError::KindMismatch {
            expected: content.kind(),
            actual: existing.kind(),
        });
    }
    Ok(())
}
