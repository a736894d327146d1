//! In-process backend for tests and demos.
//!
//! Holds every document in memory and implements the request/response
//! behavior of the [`Backend`] trait: capability checks, the built-in
//! capabilities, a per-document vector clock, and a snapshot per event so
//! historical state can be served. Nothing is persisted.
//!
//! Test hooks: per-method call counters ([`MemoryBackend::calls`]) and
//! injected failures ([`MemoryBackend::inject_failure`]).

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, trace};

use quire_types::capability::{
    CORE_CREATE, CORE_DELETE, CORE_GRANT, CORE_LINK, CORE_RENAME, CORE_REVOKE, CORE_UNLINK,
    EDITOR_CREATE, EDITOR_DELETE, TEXT_READ,
};
use quire_types::{
    Block, BlockContent, BlockId, BlockKind, CapabilityId, Command, DocumentId, DocumentInfo,
    Editor, EditorId, EditorKind, Event, EventId, Grant, HistoricalState, SYSTEM_EDITOR_NAME,
    VectorClock,
};

use crate::backend::{Backend, BackendError, BackendResult, methods};

/// ID of the built-in system editor every document starts with.
pub const MEMORY_SYSTEM_EDITOR: &str = "system";

struct Snapshot {
    blocks: IndexMap<BlockId, Block>,
    grants: Vec<Grant>,
}

struct MemoryDocument {
    info: DocumentInfo,
    open: bool,
    blocks: IndexMap<BlockId, Block>,
    editors: Vec<Editor>,
    active_editor: Option<EditorId>,
    grants: Vec<Grant>,
    events: Vec<Event>,
    clock: VectorClock,
    snapshots: HashMap<EventId, Snapshot>,
}

impl MemoryDocument {
    fn new(info: DocumentInfo) -> Self {
        let system = Editor::human(MEMORY_SYSTEM_EDITOR, SYSTEM_EDITOR_NAME);
        Self {
            info,
            open: true,
            blocks: IndexMap::new(),
            active_editor: Some(system.id.clone()),
            editors: vec![system],
            grants: Vec::new(),
            events: Vec::new(),
            clock: VectorClock::new(),
            snapshots: HashMap::new(),
        }
    }

    fn has_editor(&self, id: &EditorId) -> bool {
        self.editors.iter().any(|e| &e.id == id)
    }

    fn block(&self, id: &BlockId) -> BackendResult<&Block> {
        self.blocks
            .get(id)
            .ok_or_else(|| BackendError::NotFound(format!("block {id}")))
    }

    fn block_mut(&mut self, id: &BlockId) -> BackendResult<&mut Block> {
        self.blocks
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("block {id}")))
    }

    fn holds_grant(&self, editor: &EditorId, cap: &CapabilityId, block: &BlockId) -> bool {
        self.grants.iter().any(|g| g.permits(editor, cap, block))
    }

    /// Owner, grant holder, or the system editor.
    fn authorize(&self, command: &Command) -> BackendResult<()> {
        let editor = &command.editor_id;
        if editor.as_str() == MEMORY_SYSTEM_EDITOR {
            return Ok(());
        }
        let cap = &command.cap_id;
        let allowed = match cap.as_str() {
            // Any registered editor may add blocks; they become the owner.
            CORE_CREATE => true,
            _ if command.block_id.is_wildcard() => self.holds_grant(editor, cap, &command.block_id),
            _ => {
                let block = self.block(&command.block_id)?;
                &block.owner == editor || self.holds_grant(editor, cap, &command.block_id)
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(BackendError::Rejected(format!(
                "{editor} may not {cap} on {}",
                command.block_id
            )))
        }
    }

    /// Apply a command, returning `(entity, event value)`, or `None` for
    /// capabilities that change nothing.
    fn apply(&mut self, command: &Command) -> BackendResult<Option<(String, Value)>> {
        let payload = &command.payload;
        let target = &command.block_id;
        match command.cap_id.as_str() {
            CORE_CREATE => {
                let name = str_field(payload, "name")?;
                let kind = match payload.get("block_type").and_then(Value::as_str) {
                    Some(s) => BlockKind::from_str(s)
                        .ok_or_else(|| BackendError::Rejected(format!("unknown block type {s}")))?,
                    None => BlockKind::Text,
                };
                let id = BlockId::new(format!("block-{}", uuid::Uuid::new_v4()));
                let block = Block::new(id.clone(), name, command.editor_id.clone(), kind.empty_content());
                self.blocks.insert(id.clone(), block);
                Ok(Some((id.into_inner(), json!({ "name": name, "block_type": kind.as_str() }))))
            }
            CORE_DELETE => {
                self.block(target)?;
                self.blocks.shift_remove(target);
                for block in self.blocks.values_mut() {
                    for targets in block.relations.values_mut() {
                        targets.retain(|t| t != target);
                    }
                    block.relations.retain(|_, targets| !targets.is_empty());
                }
                self.grants.retain(|g| &g.block_id != target);
                Ok(Some((target.to_string(), json!({ "deleted": true }))))
            }
            CORE_RENAME => {
                let name = str_field(payload, "name")?.to_string();
                self.block_mut(target)?.name = name.clone();
                Ok(Some((target.to_string(), json!({ "name": name }))))
            }
            CORE_LINK | CORE_UNLINK => {
                let relation = str_field(payload, "relation")?.to_string();
                let to = BlockId::new(str_field(payload, "target_id")?);
                self.block(&to)?;
                let link = command.cap_id.as_str() == CORE_LINK;
                let block = self.block_mut(target)?;
                if link {
                    let targets = block.relations.entry(relation.clone()).or_default();
                    if !targets.contains(&to) {
                        targets.push(to.clone());
                    }
                } else {
                    let targets = block.relations.get_mut(&relation).ok_or_else(|| {
                        BackendError::Rejected(format!("no {relation} relation on {target}"))
                    })?;
                    targets.retain(|t| t != &to);
                    if targets.is_empty() {
                        block.relations.remove(&relation);
                    }
                }
                Ok(Some((target.to_string(), json!({ "relation": relation, "target_id": to }))))
            }
            CORE_GRANT | CORE_REVOKE => {
                let editor = EditorId::new(str_field(payload, "target_editor")?);
                let cap = CapabilityId::new(str_field(payload, "capability")?);
                let block = payload
                    .get("target_block")
                    .and_then(Value::as_str)
                    .map(BlockId::new)
                    .unwrap_or_else(|| target.clone());
                if !self.has_editor(&editor) {
                    return Err(BackendError::NotFound(format!("editor {editor}")));
                }
                let grant = Grant::new(editor, cap, block.clone());
                if command.cap_id.as_str() == CORE_GRANT {
                    if !self.grants.contains(&grant) {
                        self.grants.push(grant.clone());
                    }
                } else {
                    self.grants.retain(|g| g != &grant);
                }
                let value = serde_json::to_value(&grant)
                    .map_err(|e| BackendError::Rejected(e.to_string()))?;
                Ok(Some((block.into_inner(), value)))
            }
            EDITOR_CREATE => {
                let name = str_field(payload, "name")?;
                let kind = match payload.get("editor_type") {
                    Some(v) => serde_json::from_value::<EditorKind>(v.clone())
                        .map_err(|e| BackendError::Rejected(e.to_string()))?,
                    None => EditorKind::Human,
                };
                let id = EditorId::new(format!("editor-{}", uuid::Uuid::new_v4()));
                self.editors.push(Editor {
                    id: id.clone(),
                    name: name.to_string(),
                    kind,
                });
                Ok(Some((id.into_inner(), json!({ "name": name }))))
            }
            EDITOR_DELETE => {
                let id = EditorId::new(str_field(payload, "editor_id")?);
                if id.as_str() == MEMORY_SYSTEM_EDITOR {
                    return Err(BackendError::Rejected("the system editor cannot be deleted".into()));
                }
                if !self.has_editor(&id) {
                    return Err(BackendError::NotFound(format!("editor {id}")));
                }
                self.editors.retain(|e| e.id != id);
                self.grants.retain(|g| g.editor_id != id);
                Ok(Some((id.into_inner(), json!({ "deleted": true }))))
            }
            TEXT_READ => {
                self.block(target)?;
                Ok(None)
            }
            cap if cap.ends_with(".write") => {
                let block = self.block(target)?;
                let kind = block.kind();
                if CapabilityId::write_for(kind) != command.cap_id {
                    return Err(BackendError::Rejected(format!(
                        "{cap} does not apply to {kind} block {target}"
                    )));
                }
                let content: BlockContent = serde_json::from_value(json!({
                    "block_type": kind.as_str(),
                    "contents": payload,
                }))
                .map_err(|e| BackendError::Rejected(format!("bad {kind} content: {e}")))?;
                content
                    .validate()
                    .map_err(|e| BackendError::Rejected(e.to_string()))?;
                self.block_mut(target)?.content = content;
                Ok(Some((target.to_string(), payload.clone())))
            }
            other => Err(BackendError::Rejected(format!("unsupported capability {other}"))),
        }
    }

    fn record(&mut self, command: &Command, entity: String, value: Value) -> Event {
        self.clock.tick(&command.editor_id);
        let event = Event::new(
            entity,
            &command.editor_id,
            &command.cap_id,
            value,
            self.clock.clone(),
        );
        self.snapshots.insert(
            event.id.clone(),
            Snapshot {
                blocks: self.blocks.clone(),
                grants: self.grants.clone(),
            },
        );
        self.events.push(event.clone());
        event
    }
}

fn str_field<'a>(payload: &'a Value, field: &str) -> BackendResult<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Rejected(format!("payload is missing '{field}'")))
}

#[derive(Default)]
struct Documents {
    by_id: IndexMap<DocumentId, MemoryDocument>,
    by_path: HashMap<String, DocumentId>,
}

impl Documents {
    fn open(&self, id: &DocumentId) -> BackendResult<&MemoryDocument> {
        self.by_id
            .get(id)
            .filter(|d| d.open)
            .ok_or_else(|| BackendError::NotFound(format!("document {id}")))
    }

    fn open_mut(&mut self, id: &DocumentId) -> BackendResult<&mut MemoryDocument> {
        self.by_id
            .get_mut(id)
            .filter(|d| d.open)
            .ok_or_else(|| BackendError::NotFound(format!("document {id}")))
    }
}

/// Backend that keeps everything in process memory.
pub struct MemoryBackend {
    documents: Mutex<Documents>,
    system_editor: Option<EditorId>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, BackendError>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// A backend whose configured fallback actor is the built-in system editor.
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(Documents::default()),
            system_editor: Some(EditorId::new(MEMORY_SYSTEM_EDITOR)),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// A backend with no configured fallback actor.
    pub fn without_system_editor() -> Self {
        Self {
            system_editor: None,
            ..Self::new()
        }
    }

    // ── Test hooks ──────────────────────────────────────────────────────

    /// How many times a wire method (see [`methods`]) was called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail every call to `method` with `error` until cleared.
    pub fn inject_failure(&self, method: &'static str, error: BackendError) {
        self.failures.lock().insert(method, error);
    }

    pub fn clear_failure(&self, method: &str) {
        self.failures.lock().remove(method);
    }

    /// Register an editor directly, bypassing commands.
    pub fn insert_editor(&self, document: &DocumentId, editor: Editor) -> BackendResult<()> {
        let mut docs = self.documents.lock();
        docs.open_mut(document)?.editors.push(editor);
        Ok(())
    }

    /// Overwrite the stored active editor pointer without validation, as a
    /// buggy or outdated backend might.
    pub fn force_active_editor(&self, document: &DocumentId, editor: Option<EditorId>) -> BackendResult<()> {
        let mut docs = self.documents.lock();
        docs.open_mut(document)?.active_editor = editor;
        Ok(())
    }

    /// Whether the backend holds an open handle for `document`.
    pub fn is_open(&self, document: &DocumentId) -> bool {
        self.documents.lock().open(document).is_ok()
    }

    fn enter(&self, method: &'static str) -> BackendResult<()> {
        *self.calls.lock().entry(method).or_insert(0) += 1;
        trace!(method, "memory backend call");
        match self.failures.lock().get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read<R>(
        &self,
        method: &'static str,
        document: &DocumentId,
        f: impl FnOnce(&MemoryDocument) -> R,
    ) -> BackendResult<R> {
        self.enter(method)?;
        let docs = self.documents.lock();
        Ok(f(docs.open(document)?))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, document: &DocumentId, command: &Command) -> BackendResult<Vec<Event>> {
        self.enter(methods::EXECUTE)?;
        let mut docs = self.documents.lock();
        let doc = docs.open_mut(document)?;
        if !doc.has_editor(&command.editor_id) {
            return Err(BackendError::Rejected(format!(
                "unknown editor {}",
                command.editor_id
            )));
        }
        doc.authorize(command)?;
        let events = match doc.apply(command)? {
            Some((entity, value)) => vec![doc.record(command, entity, value)],
            None => Vec::new(),
        };
        debug!(document = %document, capability = %command.cap_id, events = events.len(), "executed");
        Ok(events)
    }

    async fn set_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
    ) -> BackendResult<()> {
        self.enter(methods::SET_ACTIVE_EDITOR)?;
        let mut docs = self.documents.lock();
        let doc = docs.open_mut(document)?;
        if let Some(id) = editor
            && !doc.has_editor(id)
        {
            return Err(BackendError::NotFound(format!("editor {id}")));
        }
        doc.active_editor = editor.cloned();
        Ok(())
    }

    async fn list_blocks(&self, document: &DocumentId) -> BackendResult<Vec<Block>> {
        self.read(methods::LIST_BLOCKS, document, |d| {
            d.blocks.values().cloned().collect()
        })
    }

    async fn list_editors(&self, document: &DocumentId) -> BackendResult<Vec<Editor>> {
        self.read(methods::LIST_EDITORS, document, |d| d.editors.clone())
    }

    async fn get_active_editor(&self, document: &DocumentId) -> BackendResult<Option<EditorId>> {
        self.read(methods::GET_ACTIVE_EDITOR, document, |d| d.active_editor.clone())
    }

    async fn list_grants(&self, document: &DocumentId) -> BackendResult<Vec<Grant>> {
        self.read(methods::LIST_GRANTS, document, |d| d.grants.clone())
    }

    async fn list_events(&self, document: &DocumentId) -> BackendResult<Vec<Event>> {
        self.read(methods::LIST_EVENTS, document, |d| d.events.clone())
    }

    async fn get_historical_state(
        &self,
        document: &DocumentId,
        block: &BlockId,
        event: &EventId,
    ) -> BackendResult<HistoricalState> {
        self.read(methods::GET_HISTORICAL_STATE, document, |d| {
            let snapshot = d
                .snapshots
                .get(event)
                .ok_or_else(|| BackendError::NotFound(format!("event {event}")))?;
            let block = snapshot
                .blocks
                .get(block)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(format!("block {block} at event {event}")))?;
            Ok(HistoricalState {
                block,
                grants: snapshot.grants.clone(),
            })
        })?
    }

    async fn open_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.enter(methods::OPEN_DOCUMENT)?;
        let mut docs = self.documents.lock();
        let id = docs
            .by_path
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("no document at {path}")))?;
        if let Some(doc) = docs.by_id.get_mut(&id) {
            doc.open = true;
        }
        Ok(id)
    }

    async fn create_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.enter(methods::CREATE_DOCUMENT)?;
        let mut docs = self.documents.lock();
        if docs.by_path.contains_key(path) {
            return Err(BackendError::Rejected(format!("{path} already exists")));
        }
        let id = DocumentId::new(format!("file-{}", uuid::Uuid::new_v4()));
        docs.by_path.insert(path.to_string(), id.clone());
        docs.by_id
            .insert(id.clone(), MemoryDocument::new(DocumentInfo::for_path(id.clone(), path)));
        Ok(id)
    }

    async fn close_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.enter(methods::CLOSE_DOCUMENT)?;
        let mut docs = self.documents.lock();
        docs.open_mut(document)?.open = false;
        Ok(())
    }

    async fn save_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.enter(methods::SAVE_DOCUMENT)?;
        let mut docs = self.documents.lock();
        docs.open_mut(document)?.info.modified_at = quire_types::now_millis();
        Ok(())
    }

    async fn list_open_documents(&self) -> BackendResult<Vec<DocumentId>> {
        self.enter(methods::LIST_OPEN_DOCUMENTS)?;
        let docs = self.documents.lock();
        Ok(docs
            .by_id
            .iter()
            .filter(|(_, d)| d.open)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get_document_info(&self, document: &DocumentId) -> BackendResult<DocumentInfo> {
        self.read(methods::GET_DOCUMENT_INFO, document, |d| d.info.clone())
    }

    async fn system_editor_id(&self) -> BackendResult<Option<EditorId>> {
        self.enter(methods::SYSTEM_EDITOR_ID)?;
        Ok(self.system_editor.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
