//! In-memory document state.
//!
//! One [`FileState`] per open document, owned by the [`DocumentStore`]. Nested
//! collections are only ever replaced wholesale from backend responses; the
//! client never patches a block or grant in place. Invariants are enforced at
//! mutation time:
//!
//! - `selected_block_id`, if set, names a block that is present. Replacing
//!   blocks clears a dangling selection in the same step.
//! - `active_editor_id`, if set, names an editor that is present. A dangling
//!   pointer is healed to the fallback editor and the heal is reported back to
//!   the caller, which pushes it to the backend.
//! - Switching the active editor clears the selection.
//!
//! # Concurrency Model
//!
//! - `parking_lot::RwLock` around the whole map, never held across `.await`
//! - Change events broadcast on a `tokio::sync::broadcast` channel

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use quire_types::{
    Block, BlockId, CapabilityId, Collection, DocumentId, DocumentInfo, Editor, EditorId, Event,
    Grant,
};

use crate::capability::{self, AuthContext};
use crate::constants::STORE_CHANGE_CAPACITY;
use crate::error::{ClientError, ClientResult};

// ============================================================================
// Change events
// ============================================================================

/// Broadcast when the store changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    DocumentOpened { document: DocumentId },
    DocumentClosed { document: DocumentId },
    ActiveDocumentChanged { document: Option<DocumentId> },
    /// A whole collection was replaced by a refresh.
    CollectionReplaced {
        document: DocumentId,
        collection: Collection,
    },
    /// One block was replaced (history restore).
    BlockReplaced {
        document: DocumentId,
        block_id: BlockId,
    },
    SelectionChanged {
        document: DocumentId,
        block_id: Option<BlockId>,
    },
    ActiveEditorChanged {
        document: DocumentId,
        editor_id: Option<EditorId>,
    },
}

// ============================================================================
// Active editor resolution
// ============================================================================

/// A dangling active-editor pointer that was corrected locally.
///
/// The caller is expected to push `resolved` to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveEditorHeal {
    pub reported: Option<EditorId>,
    pub resolved: Option<EditorId>,
}

/// Pick the active editor given what the backend reported.
///
/// A reported editor that exists wins. An unknown one falls back to the editor
/// named `fallback_name`, then to the first editor, then to none.
pub fn resolve_active_editor(
    reported: Option<&EditorId>,
    editors: &[Editor],
    fallback_name: &str,
) -> Option<EditorId> {
    let reported = reported?;
    if editors.iter().any(|e| &e.id == reported) {
        return Some(reported.clone());
    }
    editors
        .iter()
        .find(|e| e.name == fallback_name)
        .or_else(|| editors.first())
        .map(|e| e.id.clone())
}

// ============================================================================
// FileState
// ============================================================================

fn upsert_block(blocks: &mut Vec<Block>, block: Block) {
    match blocks.iter_mut().find(|b| b.id == block.id) {
        Some(slot) => *slot = block,
        None => blocks.push(block),
    }
}

/// Everything the client knows about one open document.
#[derive(Clone, Debug, PartialEq)]
pub struct FileState {
    info: DocumentInfo,
    blocks: Vec<Block>,
    editors: Vec<Editor>,
    active_editor_id: Option<EditorId>,
    selected_block_id: Option<BlockId>,
    grants: Vec<Grant>,
    events: Vec<Event>,
    /// Blocks restored from history, each with the blocks sequence number
    /// that was latest when the restore landed.
    restored: Vec<(u64, Block)>,
}

impl FileState {
    /// Empty state for a document.
    pub fn new(info: DocumentInfo) -> Self {
        Self {
            info,
            blocks: Vec::new(),
            editors: Vec::new(),
            active_editor_id: None,
            selected_block_id: None,
            grants: Vec::new(),
            events: Vec::new(),
            restored: Vec::new(),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.info.id
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn editors(&self) -> &[Editor] {
        &self.editors
    }

    pub fn editor(&self, id: &EditorId) -> Option<&Editor> {
        self.editors.iter().find(|e| &e.id == id)
    }

    pub fn active_editor_id(&self) -> Option<&EditorId> {
        self.active_editor_id.as_ref()
    }

    pub fn active_editor(&self) -> Option<&Editor> {
        self.active_editor_id.as_ref().and_then(|id| self.editor(id))
    }

    pub fn selected_block_id(&self) -> Option<&BlockId> {
        self.selected_block_id.as_ref()
    }

    pub fn selected_block(&self) -> Option<&Block> {
        self.selected_block_id.as_ref().and_then(|id| self.block(id))
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Whether `block` currently shows a local restore rather than the
    /// backend's version.
    pub fn is_restored(&self, block: &BlockId) -> bool {
        self.restored.iter().any(|(_, b)| &b.id == block)
    }

    /// Grants that apply to `block`, including wildcard grants.
    pub fn grants_for(&self, block: &BlockId) -> Vec<&Grant> {
        self.grants.iter().filter(|g| g.covers_block(block)).collect()
    }

    /// Events as last reported by the backend (unordered).
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Advisory capability check against this document's cached state.
    pub fn can_perform(&self, editor: &EditorId, cap: &CapabilityId, block: &BlockId) -> bool {
        capability::can_perform(editor, cap, block, self)
    }

    // ── Mutation (crate-internal; invariants enforced here) ─────────────

    pub(crate) fn set_info(&mut self, info: DocumentInfo) {
        self.info = info;
    }

    pub(crate) fn set_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
        self.restored.clear();
        self.clear_dangling_selection();
    }

    /// Adopt a block listing read under ticket `seq`.
    ///
    /// Restores that landed after `seq` was issued are laid back over the
    /// listing; older ones are dropped.
    pub(crate) fn set_blocks_as_of(&mut self, blocks: Vec<Block>, seq: u64) {
        self.blocks = blocks;
        self.restored.retain(|(mark, _)| *mark >= seq);
        for (_, block) in &self.restored {
            upsert_block(&mut self.blocks, block.clone());
        }
        self.clear_dangling_selection();
    }

    /// Replace one block by ID, appending it if absent.
    pub(crate) fn replace_block(&mut self, block: Block) {
        upsert_block(&mut self.blocks, block);
    }

    /// Show `block` as restored until a listing issued after `mark` arrives.
    pub(crate) fn restore_block(&mut self, block: Block, mark: u64) {
        self.restored.retain(|(_, b)| b.id != block.id);
        self.restored.push((mark, block.clone()));
        upsert_block(&mut self.blocks, block);
    }

    pub(crate) fn set_editors(
        &mut self,
        editors: Vec<Editor>,
        fallback_name: &str,
    ) -> Option<ActiveEditorHeal> {
        self.editors = editors;
        let current = self.active_editor_id.clone();
        self.apply_reported_active_editor(current, fallback_name)
    }

    /// Adopt the backend's active editor, healing it if it names no known editor.
    pub(crate) fn apply_reported_active_editor(
        &mut self,
        reported: Option<EditorId>,
        fallback_name: &str,
    ) -> Option<ActiveEditorHeal> {
        let resolved = resolve_active_editor(reported.as_ref(), &self.editors, fallback_name);
        let heal = (resolved != reported).then(|| ActiveEditorHeal {
            reported: reported.clone(),
            resolved: resolved.clone(),
        });
        if heal.is_some() {
            warn!(
                document = %self.info.id,
                reported = ?reported,
                resolved = ?resolved,
                "active editor is not a known editor, falling back"
            );
        }
        if self.active_editor_id != resolved {
            self.selected_block_id = None;
        }
        self.active_editor_id = resolved;
        heal
    }

    pub(crate) fn set_grants(&mut self, grants: Vec<Grant>) {
        self.grants = grants;
    }

    pub(crate) fn set_events(&mut self, events: Vec<Event>) {
        self.events = events;
    }

    pub(crate) fn select_block(&mut self, block: Option<BlockId>) -> ClientResult<()> {
        if let Some(id) = &block
            && self.block(id).is_none()
        {
            return Err(ClientError::UnknownBlock(id.clone()));
        }
        self.selected_block_id = block;
        Ok(())
    }

    /// Point at another editor (or none), clearing the selection. Returns the
    /// previous pointer.
    pub(crate) fn switch_active_editor(
        &mut self,
        editor: Option<EditorId>,
    ) -> ClientResult<Option<EditorId>> {
        if let Some(id) = &editor
            && self.editor(id).is_none()
        {
            return Err(ClientError::UnknownEditor(id.clone()));
        }
        self.selected_block_id = None;
        Ok(std::mem::replace(&mut self.active_editor_id, editor))
    }

    fn clear_dangling_selection(&mut self) {
        if let Some(id) = &self.selected_block_id
            && self.block(id).is_none()
        {
            debug!(document = %self.info.id, block = %id, "selected block is gone, clearing selection");
            self.selected_block_id = None;
        }
    }
}

impl AuthContext for FileState {
    fn owner_of(&self, block: &BlockId) -> Option<&EditorId> {
        self.block(block).map(|b| &b.owner)
    }

    fn grants(&self) -> &[Grant] {
        &self.grants
    }
}

// ============================================================================
// DocumentStore
// ============================================================================

#[derive(Debug, Default)]
struct StoreInner {
    /// Open documents in the order they were opened.
    documents: IndexMap<DocumentId, FileState>,
    active: Option<DocumentId>,
}

/// All open documents, keyed by ID.
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
    fallback_editor_name: String,
    change_tx: broadcast::Sender<StoreEvent>,
}

impl DocumentStore {
    /// An empty store. `fallback_editor_name` names the editor a dangling
    /// active-editor pointer heals to.
    pub fn new(fallback_editor_name: impl Into<String>) -> Self {
        let (change_tx, _) = broadcast::channel(STORE_CHANGE_CAPACITY);
        Self {
            inner: RwLock::new(StoreInner::default()),
            fallback_editor_name: fallback_editor_name.into(),
            change_tx,
        }
    }

    /// Get the change receiver for subscribing to updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.change_tx.subscribe()
    }

    pub fn fallback_editor_name(&self) -> &str {
        &self.fallback_editor_name
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.change_tx.send(event);
    }

    // ── Documents ───────────────────────────────────────────────────────

    /// Register a fully built document and make it active.
    ///
    /// Fails if the document is already registered.
    pub fn insert(&self, state: FileState) -> ClientResult<()> {
        let id = state.id().clone();
        {
            let mut inner = self.inner.write();
            if inner.documents.contains_key(&id) {
                return Err(ClientError::InvariantViolation(format!(
                    "document {id} is already open"
                )));
            }
            inner.documents.insert(id.clone(), state);
            inner.active = Some(id.clone());
        }
        self.emit(StoreEvent::DocumentOpened {
            document: id.clone(),
        });
        self.emit(StoreEvent::ActiveDocumentChanged { document: Some(id) });
        Ok(())
    }

    /// Insert or wholesale replace a document, keeping its position if present.
    pub fn upsert(&self, state: FileState) {
        let id = state.id().clone();
        let opened = {
            let mut inner = self.inner.write();
            let opened = inner.documents.insert(id.clone(), state).is_none();
            if inner.active.is_none() {
                inner.active = Some(id.clone());
            }
            opened
        };
        if opened {
            self.emit(StoreEvent::DocumentOpened { document: id });
        } else {
            for collection in [
                Collection::Blocks,
                Collection::Editors,
                Collection::Grants,
                Collection::Events,
            ] {
                self.emit(StoreEvent::CollectionReplaced {
                    document: id.clone(),
                    collection,
                });
            }
        }
    }

    /// Unregister a document. If it was active, the most recently opened
    /// remaining document becomes active.
    pub fn remove(&self, document: &DocumentId) -> ClientResult<FileState> {
        let (state, active_changed) = {
            let mut inner = self.inner.write();
            let state = inner
                .documents
                .shift_remove(document)
                .ok_or_else(|| ClientError::UnknownDocument(document.clone()))?;
            let was_active = inner.active.as_ref() == Some(document);
            if was_active {
                inner.active = inner.documents.keys().last().cloned();
            }
            (state, was_active.then(|| inner.active.clone()))
        };
        self.emit(StoreEvent::DocumentClosed {
            document: document.clone(),
        });
        if let Some(active) = active_changed {
            self.emit(StoreEvent::ActiveDocumentChanged { document: active });
        }
        Ok(state)
    }

    /// Snapshot of one document.
    pub fn get(&self, document: &DocumentId) -> Option<FileState> {
        self.inner.read().documents.get(document).cloned()
    }

    pub fn contains(&self, document: &DocumentId) -> bool {
        self.inner.read().documents.contains_key(document)
    }

    /// Open documents, oldest first.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.inner.read().documents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().documents.is_empty()
    }

    pub fn active_document(&self) -> Option<DocumentId> {
        self.inner.read().active.clone()
    }

    pub fn set_active_document(&self, document: &DocumentId) -> ClientResult<()> {
        {
            let mut inner = self.inner.write();
            if !inner.documents.contains_key(document) {
                return Err(ClientError::UnknownDocument(document.clone()));
            }
            inner.active = Some(document.clone());
        }
        self.emit(StoreEvent::ActiveDocumentChanged {
            document: Some(document.clone()),
        });
        Ok(())
    }

    // ── Readers ─────────────────────────────────────────────────────────

    /// Run `f` against one document under the read lock.
    pub fn read<R>(&self, document: &DocumentId, f: impl FnOnce(&FileState) -> R) -> ClientResult<R> {
        let inner = self.inner.read();
        let state = inner
            .documents
            .get(document)
            .ok_or_else(|| ClientError::UnknownDocument(document.clone()))?;
        Ok(f(state))
    }

    pub fn blocks(&self, document: &DocumentId) -> ClientResult<Vec<Block>> {
        self.read(document, |s| s.blocks().to_vec())
    }

    pub fn block(&self, document: &DocumentId, block: &BlockId) -> ClientResult<Option<Block>> {
        self.read(document, |s| s.block(block).cloned())
    }

    pub fn selected_block(&self, document: &DocumentId) -> ClientResult<Option<Block>> {
        self.read(document, |s| s.selected_block().cloned())
    }

    pub fn editors(&self, document: &DocumentId) -> ClientResult<Vec<Editor>> {
        self.read(document, |s| s.editors().to_vec())
    }

    pub fn active_editor(&self, document: &DocumentId) -> ClientResult<Option<Editor>> {
        self.read(document, |s| s.active_editor().cloned())
    }

    pub fn active_editor_id(&self, document: &DocumentId) -> ClientResult<Option<EditorId>> {
        self.read(document, |s| s.active_editor_id().cloned())
    }

    pub fn grants(&self, document: &DocumentId) -> ClientResult<Vec<Grant>> {
        self.read(document, |s| s.grants().to_vec())
    }

    pub fn grants_for(&self, document: &DocumentId, block: &BlockId) -> ClientResult<Vec<Grant>> {
        self.read(document, |s| s.grants_for(block).into_iter().cloned().collect())
    }

    pub fn events(&self, document: &DocumentId) -> ClientResult<Vec<Event>> {
        self.read(document, |s| s.events().to_vec())
    }

    pub fn can_perform(
        &self,
        document: &DocumentId,
        editor: &EditorId,
        cap: &CapabilityId,
        block: &BlockId,
    ) -> ClientResult<bool> {
        self.read(document, |s| s.can_perform(editor, cap, block))
    }

    // ── Mutation ────────────────────────────────────────────────────────

    fn mutate<R>(
        &self,
        document: &DocumentId,
        f: impl FnOnce(&mut FileState) -> ClientResult<R>,
    ) -> ClientResult<R> {
        let mut inner = self.inner.write();
        let state = inner
            .documents
            .get_mut(document)
            .ok_or_else(|| ClientError::UnknownDocument(document.clone()))?;
        f(state)
    }

    /// Select a block, or clear the selection with `None`.
    pub fn select_block(&self, document: &DocumentId, block: Option<BlockId>) -> ClientResult<()> {
        self.mutate(document, |s| s.select_block(block.clone()))?;
        self.emit(StoreEvent::SelectionChanged {
            document: document.clone(),
            block_id: block,
        });
        Ok(())
    }

    /// Point the document at another editor. Clears the selection. Returns the
    /// previous pointer.
    pub fn switch_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<EditorId>,
    ) -> ClientResult<Option<EditorId>> {
        let previous = self.mutate(document, |s| s.switch_active_editor(editor.clone()))?;
        self.emit(StoreEvent::SelectionChanged {
            document: document.clone(),
            block_id: None,
        });
        self.emit(StoreEvent::ActiveEditorChanged {
            document: document.clone(),
            editor_id: editor,
        });
        Ok(previous)
    }

    /// Undo a switch, but only if nothing switched again since.
    ///
    /// Returns whether the pointer was reverted. The selection stays cleared.
    pub fn revert_active_editor(
        &self,
        document: &DocumentId,
        switched_to: Option<&EditorId>,
        previous: Option<EditorId>,
    ) -> ClientResult<bool> {
        let restored = self.mutate(document, |s| {
            if s.active_editor_id() != switched_to {
                return Ok(None);
            }
            // The previous editor may have been removed by a refresh since.
            let restore = previous.filter(|id| s.editor(id).is_some());
            s.active_editor_id = restore.clone();
            Ok(Some(restore))
        })?;
        let Some(editor_id) = restored else {
            return Ok(false);
        };
        self.emit(StoreEvent::ActiveEditorChanged {
            document: document.clone(),
            editor_id,
        });
        Ok(true)
    }

    pub fn replace_info(&self, document: &DocumentId, info: DocumentInfo) -> ClientResult<()> {
        self.mutate(document, |s| {
            s.set_info(info);
            Ok(())
        })
    }

    /// Replace the block list with a listing read under ticket `seq`.
    ///
    /// Blocks restored from history stay on top unless the listing was issued
    /// after the restore landed. Returns the number of visible blocks.
    pub fn replace_blocks(
        &self,
        document: &DocumentId,
        blocks: Vec<Block>,
        seq: u64,
    ) -> ClientResult<usize> {
        let (count, selection_cleared) = self.mutate(document, |s| {
            let had_selection = s.selected_block_id.is_some();
            s.set_blocks_as_of(blocks, seq);
            Ok((s.blocks.len(), had_selection && s.selected_block_id.is_none()))
        })?;
        self.emit(StoreEvent::CollectionReplaced {
            document: document.clone(),
            collection: Collection::Blocks,
        });
        if selection_cleared {
            self.emit(StoreEvent::SelectionChanged {
                document: document.clone(),
                block_id: None,
            });
        }
        Ok(count)
    }

    /// Replace editors, healing the active pointer if it now dangles.
    pub fn replace_editors(
        &self,
        document: &DocumentId,
        editors: Vec<Editor>,
    ) -> ClientResult<Option<ActiveEditorHeal>> {
        let heal = self.mutate(document, |s| {
            Ok(s.set_editors(editors, &self.fallback_editor_name))
        })?;
        self.emit(StoreEvent::CollectionReplaced {
            document: document.clone(),
            collection: Collection::Editors,
        });
        if let Some(heal) = &heal {
            self.emit(StoreEvent::ActiveEditorChanged {
                document: document.clone(),
                editor_id: heal.resolved.clone(),
            });
        }
        Ok(heal)
    }

    pub fn replace_grants(&self, document: &DocumentId, grants: Vec<Grant>) -> ClientResult<()> {
        self.mutate(document, |s| {
            s.set_grants(grants);
            Ok(())
        })?;
        self.emit(StoreEvent::CollectionReplaced {
            document: document.clone(),
            collection: Collection::Grants,
        });
        Ok(())
    }

    pub fn replace_events(&self, document: &DocumentId, events: Vec<Event>) -> ClientResult<()> {
        self.mutate(document, |s| {
            s.set_events(events);
            Ok(())
        })?;
        self.emit(StoreEvent::CollectionReplaced {
            document: document.clone(),
            collection: Collection::Events,
        });
        Ok(())
    }

    /// Replace one block by ID, appending it if absent.
    pub fn replace_block(&self, document: &DocumentId, block: Block) -> ClientResult<()> {
        let block_id = block.id.clone();
        self.mutate(document, |s| {
            s.replace_block(block);
            Ok(())
        })?;
        self.emit(StoreEvent::BlockReplaced {
            document: document.clone(),
            block_id,
        });
        Ok(())
    }

    /// Replace one block and the whole grant set in one step.
    ///
    /// `mark` is the latest blocks sequence number at the time of the restore.
    /// Block listings issued up to it keep the restored block on top.
    pub fn restore_snapshot(
        &self,
        document: &DocumentId,
        block: Block,
        grants: Vec<Grant>,
        mark: u64,
    ) -> ClientResult<()> {
        let block_id = block.id.clone();
        self.mutate(document, |s| {
            s.restore_block(block, mark);
            s.set_grants(grants);
            Ok(())
        })?;
        self.emit(StoreEvent::BlockReplaced {
            document: document.clone(),
            block_id,
        });
        self.emit(StoreEvent::CollectionReplaced {
            document: document.clone(),
            collection: Collection::Grants,
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
