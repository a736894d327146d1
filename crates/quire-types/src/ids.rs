//! Typed identifiers for documents, blocks, editors, events, commands and
//! capabilities.
//!
//! The backend hands out identifiers as opaque strings, so every ID type here
//! wraps a `String` and is transparent on the wire. Wrapping them keeps a
//! `BlockId` from being passed where an `EditorId` is expected. The `short()`
//! form is for human-facing display only, never a lookup key.
//!
//! `BlockId` carries the wildcard sentinel `*` used by grants ("any block")
//! and by creation commands (no target yet).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an open document, assigned by the backend.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

/// Identifier of a block within a document.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

/// Identifier of an editor (human or bot actor).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorId(String);

/// Identifier of an event in a document's log.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

/// Identifier of an in-flight command.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

/// Identifier of a capability, e.g. `text.write` or `core.grant`.
///
/// Well-known values and their invalidation scopes live in
/// [`crate::capability`].
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the raw identifier.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// At most the first 8 characters, for display only.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }

            /// Check if a query string matches this ID by prefix.
            pub fn matches_prefix(&self, prefix: &str) -> bool {
                self.0.starts_with(prefix)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(DocumentId, "DocumentId");
impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(EditorId, "EditorId");
impl_typed_id!(EventId, "EventId");
impl_typed_id!(CommandId, "CommandId");
impl_typed_id!(CapabilityId, "CapabilityId");

// ── Sentinels ───────────────────────────────────────────────────────────────

/// Wildcard target: "any block" in a grant, "no block yet" in a create command.
pub const WILDCARD: &str = "*";

impl BlockId {
    /// The wildcard block ID (`*`).
    pub fn wildcard() -> Self {
        Self(WILDCARD.to_string())
    }

    /// Check if this is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }
}

impl CommandId {
    /// A fresh random command ID (UUIDv4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl EventId {
    /// A fresh random event ID (UUIDv4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
