//! The authoritative backend, as seen from the client.
//!
//! Every method is one request/response round trip. The client never assumes
//! responses arrive in the order requests were issued; ordering is restored by
//! the staleness guard on the read side.

use async_trait::async_trait;

use quire_types::{
    Block, BlockId, Command, DocumentId, DocumentInfo, Editor, EditorId, Event, EventId, Grant,
    HistoricalState,
};

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the request (permission, validation, unsupported).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The response did not have the expected shape.
    #[error("could not decode {what}: {message}")]
    Decode { what: String, message: String },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Request/response interface to the authoritative document store.
#[async_trait]
pub trait Backend: Send + Sync {
    // ── Mutations ───────────────────────────────────────────────────────

    /// Execute a command, returning the events it produced.
    async fn execute(&self, document: &DocumentId, command: &Command) -> BackendResult<Vec<Event>>;

    /// Persist the active editor pointer. `None` clears it.
    async fn set_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
    ) -> BackendResult<()>;

    // ── Reads ───────────────────────────────────────────────────────────

    async fn list_blocks(&self, document: &DocumentId) -> BackendResult<Vec<Block>>;

    async fn list_editors(&self, document: &DocumentId) -> BackendResult<Vec<Editor>>;

    async fn get_active_editor(&self, document: &DocumentId) -> BackendResult<Option<EditorId>>;

    async fn list_grants(&self, document: &DocumentId) -> BackendResult<Vec<Grant>>;

    async fn list_events(&self, document: &DocumentId) -> BackendResult<Vec<Event>>;

    /// Block and grant set as of `event`, without changing current state.
    async fn get_historical_state(
        &self,
        document: &DocumentId,
        block: &BlockId,
        event: &EventId,
    ) -> BackendResult<HistoricalState>;

    // ── Lifecycle ───────────────────────────────────────────────────────

    async fn open_document(&self, path: &str) -> BackendResult<DocumentId>;

    async fn create_document(&self, path: &str) -> BackendResult<DocumentId>;

    async fn close_document(&self, document: &DocumentId) -> BackendResult<()>;

    async fn save_document(&self, document: &DocumentId) -> BackendResult<()>;

    async fn list_open_documents(&self) -> BackendResult<Vec<DocumentId>>;

    async fn get_document_info(&self, document: &DocumentId) -> BackendResult<DocumentInfo>;

    // ── Configuration ───────────────────────────────────────────────────

    /// The editor commands fall back to when none is active, if configured.
    async fn system_editor_id(&self) -> BackendResult<Option<EditorId>>;
}

/// Wire method names, one per [`Backend`] method.
pub mod methods {
    pub const EXECUTE: &str = "execute_command";
    pub const SET_ACTIVE_EDITOR: &str = "set_active_editor";
    pub const LIST_BLOCKS: &str = "get_all_blocks";
    pub const LIST_EDITORS: &str = "list_editors";
    pub const GET_ACTIVE_EDITOR: &str = "get_active_editor";
    pub const LIST_GRANTS: &str = "list_grants";
    pub const LIST_EVENTS: &str = "get_all_events";
    pub const GET_HISTORICAL_STATE: &str = "get_state_at_event";
    pub const OPEN_DOCUMENT: &str = "open_file";
    pub const CREATE_DOCUMENT: &str = "create_file";
    pub const CLOSE_DOCUMENT: &str = "close_file";
    pub const SAVE_DOCUMENT: &str = "save_file";
    pub const LIST_OPEN_DOCUMENTS: &str = "list_open_files";
    pub const GET_DOCUMENT_INFO: &str = "get_file_info";
    pub const SYSTEM_EDITOR_ID: &str = "get_system_editor_id";
}
