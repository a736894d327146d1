//! Shared fixtures for quire-client integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use quire_client::{
    Backend, BackendResult, ClientConfig, MEMORY_SYSTEM_EDITOR, MemoryBackend, QuireClient,
};
use quire_types::{
    Block, BlockContent, BlockId, Command, DocumentId, DocumentInfo, Editor, EditorId, Event,
    EventId, Grant, HistoricalState,
};

/// A client over a fresh in-memory backend with one open document.
pub async fn setup() -> (QuireClient, Arc<MemoryBackend>, DocumentId) {
    setup_with(MemoryBackend::new(), ClientConfig::default()).await
}

pub async fn setup_with(
    backend: MemoryBackend,
    config: ClientConfig,
) -> (QuireClient, Arc<MemoryBackend>, DocumentId) {
    let backend = Arc::new(backend);
    let client = QuireClient::new(backend.clone(), config);
    let doc = client
        .sessions()
        .create("/tmp/quire-test.elf")
        .await
        .expect("create document");
    (client, backend, doc)
}

pub fn system() -> EditorId {
    EditorId::new(MEMORY_SYSTEM_EDITOR)
}

/// A text block whose name records which response it came from.
pub fn marker_block(name: &str) -> Block {
    Block::new(name, name, MEMORY_SYSTEM_EDITOR, BlockContent::text(name))
}

/// A client over a fresh [`GatedBackend`] with one open document.
pub async fn gated_client() -> (
    QuireClient,
    Arc<GatedBackend>,
    mpsc::UnboundedReceiver<usize>,
    DocumentId,
) {
    let (backend, arrivals) = GatedBackend::new();
    let client = QuireClient::new(backend.clone(), ClientConfig::default());
    let doc = client
        .sessions()
        .create("/tmp/quire-gated.elf")
        .await
        .expect("create document");
    (client, backend, arrivals, doc)
}

pub fn block_names(client: &QuireClient, doc: &DocumentId) -> Vec<String> {
    client
        .store()
        .blocks(doc)
        .expect("document open")
        .into_iter()
        .map(|b| b.name)
        .collect()
}

// ============================================================================
// GatedBackend
// ============================================================================

struct Scripted<T> {
    gate: oneshot::Receiver<()>,
    response: BackendResult<T>,
}

type Script<T> = Mutex<VecDeque<Scripted<T>>>;

fn push<T>(script: &Script<T>, response: BackendResult<T>) -> oneshot::Sender<()> {
    let (tx, gate) = oneshot::channel();
    script.lock().push_back(Scripted { gate, response });
    tx
}

/// Wraps a [`MemoryBackend`], holding scripted `list_blocks` and
/// `list_grants` calls until the test opens their gate.
///
/// Each scripted call announces itself on the arrivals channel with its
/// arrival index (one counter across both methods), then waits. Unscripted
/// calls go straight to the inner backend.
pub struct GatedBackend {
    pub inner: MemoryBackend,
    blocks: Script<Vec<Block>>,
    grants: Script<Vec<Grant>>,
    arrivals: mpsc::UnboundedSender<usize>,
    arrived: AtomicUsize,
}

impl GatedBackend {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<usize>) {
        let (arrivals, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            inner: MemoryBackend::new(),
            blocks: Mutex::new(VecDeque::new()),
            grants: Mutex::new(VecDeque::new()),
            arrivals,
            arrived: AtomicUsize::new(0),
        });
        (backend, rx)
    }

    /// Queue a response for the next `list_blocks` call. Send on the returned
    /// gate to let it complete.
    pub fn script_blocks(&self, response: BackendResult<Vec<Block>>) -> oneshot::Sender<()> {
        push(&self.blocks, response)
    }

    /// Queue a response for the next `list_grants` call.
    pub fn script_grants(&self, response: BackendResult<Vec<Grant>>) -> oneshot::Sender<()> {
        push(&self.grants, response)
    }

    async fn hold<T>(&self, scripted: Scripted<T>) -> BackendResult<T> {
        let index = self.arrived.fetch_add(1, Ordering::SeqCst);
        let _ = self.arrivals.send(index);
        let _ = scripted.gate.await;
        scripted.response
    }
}

#[async_trait]
impl Backend for GatedBackend {
    async fn execute(&self, document: &DocumentId, command: &Command) -> BackendResult<Vec<Event>> {
        self.inner.execute(document, command).await
    }

    async fn set_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
    ) -> BackendResult<()> {
        self.inner.set_active_editor(document, editor).await
    }

    async fn list_blocks(&self, document: &DocumentId) -> BackendResult<Vec<Block>> {
        let scripted = self.blocks.lock().pop_front();
        match scripted {
            None => self.inner.list_blocks(document).await,
            Some(scripted) => self.hold(scripted).await,
        }
    }

    async fn list_editors(&self, document: &DocumentId) -> BackendResult<Vec<Editor>> {
        self.inner.list_editors(document).await
    }

    async fn get_active_editor(&self, document: &DocumentId) -> BackendResult<Option<EditorId>> {
        self.inner.get_active_editor(document).await
    }

    async fn list_grants(&self, document: &DocumentId) -> BackendResult<Vec<Grant>> {
        let scripted = self.grants.lock().pop_front();
        match scripted {
            None => self.inner.list_grants(document).await,
            Some(scripted) => self.hold(scripted).await,
        }
    }

    async fn list_events(&self, document: &DocumentId) -> BackendResult<Vec<Event>> {
        self.inner.list_events(document).await
    }

    async fn get_historical_state(
        &self,
        document: &DocumentId,
        block: &BlockId,
        event: &EventId,
    ) -> BackendResult<HistoricalState> {
        self.inner.get_historical_state(document, block, event).await
    }

    async fn open_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.inner.open_document(path).await
    }

    async fn create_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.inner.create_document(path).await
    }

    async fn close_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.inner.close_document(document).await
    }

    async fn save_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.inner.save_document(document).await
    }

    async fn list_open_documents(&self) -> BackendResult<Vec<DocumentId>> {
        self.inner.list_open_documents().await
    }

    async fn get_document_info(&self, document: &DocumentId) -> BackendResult<DocumentInfo> {
        self.inner.get_document_info(document).await
    }

    async fn system_editor_id(&self) -> BackendResult<Option<EditorId>> {
        self.inner.system_editor_id().await
    }
}
