//! JSON request/response adapter.
//!
//! Real backends are reached through some RPC layer that moves JSON values.
//! [`Transport`] is that layer reduced to one call; [`TransportBackend`] maps
//! every [`Backend`] method onto it, encoding arguments as a JSON object and
//! decoding the result into typed values.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use quire_types::{
    Block, BlockId, Command, DocumentId, DocumentInfo, Editor, EditorId, Event, EventId, Grant,
    HistoricalState,
};

use crate::backend::{Backend, BackendError, BackendResult, methods};

/// Raw request/response channel to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `method` with named arguments, returning the raw result.
    async fn invoke(&self, method: &str, args: Value) -> BackendResult<Value>;
}

/// A [`Backend`] over any [`Transport`].
pub struct TransportBackend<T> {
    transport: T,
}

impl<T: Transport> TransportBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, args: Value) -> BackendResult<R> {
        let raw = self.transport.invoke(method, args).await?;
        decode(method, raw)
    }
}

fn decode<R: DeserializeOwned>(method: &str, raw: Value) -> BackendResult<R> {
    serde_json::from_value(raw).map_err(|e| BackendError::Decode {
        what: format!("{method} response"),
        message: e.to_string(),
    })
}

#[async_trait]
impl<T: Transport> Backend for TransportBackend<T> {
    async fn execute(&self, document: &DocumentId, command: &Command) -> BackendResult<Vec<Event>> {
        self.call(methods::EXECUTE, json!({ "file_id": document, "cmd": command }))
            .await
    }

    async fn set_active_editor(
        &self,
        document: &DocumentId,
        editor: Option<&EditorId>,
    ) -> BackendResult<()> {
        // Some transports answer with `null`, others with nothing at all.
        let raw = self
            .transport
            .invoke(
                methods::SET_ACTIVE_EDITOR,
                json!({ "file_id": document, "editor_id": editor }),
            )
            .await?;
        match raw {
            Value::Null => Ok(()),
            other => decode(methods::SET_ACTIVE_EDITOR, other),
        }
    }

    async fn list_blocks(&self, document: &DocumentId) -> BackendResult<Vec<Block>> {
        self.call(methods::LIST_BLOCKS, json!({ "file_id": document })).await
    }

    async fn list_editors(&self, document: &DocumentId) -> BackendResult<Vec<Editor>> {
        self.call(methods::LIST_EDITORS, json!({ "file_id": document })).await
    }

    async fn get_active_editor(&self, document: &DocumentId) -> BackendResult<Option<EditorId>> {
        self.call(methods::GET_ACTIVE_EDITOR, json!({ "file_id": document }))
            .await
    }

    async fn list_grants(&self, document: &DocumentId) -> BackendResult<Vec<Grant>> {
        self.call(methods::LIST_GRANTS, json!({ "file_id": document })).await
    }

    async fn list_events(&self, document: &DocumentId) -> BackendResult<Vec<Event>> {
        self.call(methods::LIST_EVENTS, json!({ "file_id": document })).await
    }

    async fn get_historical_state(
        &self,
        document: &DocumentId,
        block: &BlockId,
        event: &EventId,
    ) -> BackendResult<HistoricalState> {
        self.call(
            methods::GET_HISTORICAL_STATE,
            json!({ "file_id": document, "block_id": block, "event_id": event }),
        )
        .await
    }

    async fn open_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.call(methods::OPEN_DOCUMENT, json!({ "path": path })).await
    }

    async fn create_document(&self, path: &str) -> BackendResult<DocumentId> {
        self.call(methods::CREATE_DOCUMENT, json!({ "path": path })).await
    }

    async fn close_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.transport
            .invoke(methods::CLOSE_DOCUMENT, json!({ "file_id": document }))
            .await
            .map(|_| ())
    }

    async fn save_document(&self, document: &DocumentId) -> BackendResult<()> {
        self.transport
            .invoke(methods::SAVE_DOCUMENT, json!({ "file_id": document }))
            .await
            .map(|_| ())
    }

    async fn list_open_documents(&self) -> BackendResult<Vec<DocumentId>> {
        self.call(methods::LIST_OPEN_DOCUMENTS, json!({})).await
    }

    async fn get_document_info(&self, document: &DocumentId) -> BackendResult<DocumentInfo> {
        self.call(methods::GET_DOCUMENT_INFO, json!({ "file_id": document }))
            .await
    }

    async fn system_editor_id(&self) -> BackendResult<Option<EditorId>> {
        self.call(methods::SYSTEM_EDITOR_ID, json!({})).await
    }
}

// ============================================================================
// Tests
// ============================================================================
