//! Shared document, block, editor and event types for quire.
//!
//! This crate is the vocabulary the client and its backends agree on: typed
//! IDs, blocks with typed content, editors, grants, commands, and
//! vector-clocked events. It has **no internal quire dependencies** and does
//! no I/O.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Document (DocumentId)
//!     └── contains Block (BlockId)
//!     │       └── owned by Editor (EditorId)
//!     │       └── relations → other Blocks
//!     └── registers Editor (EditorId, human or bot)
//!     └── records Grant (editor, capability, block | *)
//!     └── appends Event (EventId, vector clock, "<editor>/<capability>")
//!
//! Command (CommandId) ← ephemeral, produces Events
//! ```
//!
//! # Key Types
//!
//! |---------------------|----------------------------------------------|
//! | Type                | Purpose                                      |
//! |---------------------|----------------------------------------------|
//! | [`Block`]           | Typed content unit with owner and relations  |
//! | [`BlockContent`]    | Content payload tagged by block type         |
//! | [`Editor`]          | Actor identity (human or bot)                |
//! | [`Grant`]           | Capability assignment, possibly wildcarded   |
//! | [`Command`]         | Mutation request                             |
//! | [`Event`]           | Immutable, vector-clocked log entry          |
//! | [`VectorClock`]     | Per-editor logical counters                  |
//! | [`Collection`]      | Cached per-document collection (refresh key) |
//! | [`DocumentInfo`]    | Name/path/timestamps of an open document     |
//! |---------------------|----------------------------------------------|

pub mod block;
pub mod capability;
pub mod command;
pub mod document;
pub mod editor;
pub mod event;
pub mod grant;
pub mod ids;

// Re-export primary types at crate root for convenience.
pub use block::{
    Block, BlockContent, BlockKind, CodeContent, ContentError, DirectoryContent, TerminalContent,
    TerminalEntry, TextContent, RELATION_CHILDREN,
};
pub use capability::{Collection, Invalidation};
pub use command::Command;
pub use document::{DocumentInfo, HistoricalState};
pub use editor::{Editor, EditorKind, SYSTEM_EDITOR_NAME};
pub use event::{Causality, Event, VectorClock};
pub use grant::Grant;
pub use ids::{BlockId, CapabilityId, CommandId, DocumentId, EditorId, EventId, WILDCARD};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
