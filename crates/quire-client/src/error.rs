//! Client error type.

use quire_types::{BlockId, CapabilityId, Collection, DocumentId, EditorId};

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Errors surfaced by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The backend refused a mutation, or the client refused it before sending.
    #[error("{capability} rejected: {reason}")]
    CommandRejected {
        capability: CapabilityId,
        reason: String,
    },

    /// A read-back failed; the last known good state was kept.
    #[error("refreshing {collection} of {document} failed: {source}")]
    RefreshFailed {
        document: DocumentId,
        collection: Collection,
        #[source]
        source: BackendError,
    },

    /// No explicit editor, no active editor and no configured system editor.
    #[error("no editor to act as: select an editor first")]
    MissingActor,

    /// Local state disagreed with itself or with the backend.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("document not open: {0}")]
    UnknownDocument(DocumentId),

    #[error("unknown editor: {0}")]
    UnknownEditor(EditorId),

    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Whether this failure came from a mutation being refused.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::CommandRejected { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
