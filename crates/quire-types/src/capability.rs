//! Well-known capabilities and the collections each one invalidates.
//!
//! Every mutating command names a capability. After the backend accepts the
//! command, the client refreshes only the collections that capability can
//! have changed. The mapping lives here, next to the capability names, so
//! adding a capability forces a decision about what it invalidates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::block::BlockKind;
use crate::ids::CapabilityId;

/// Create a block.
pub const CORE_CREATE: &str = "core.create";
/// Delete a block.
pub const CORE_DELETE: &str = "core.delete";
/// Rename a block.
pub const CORE_RENAME: &str = "core.rename";
/// Add a relation edge between blocks.
pub const CORE_LINK: &str = "core.link";
/// Remove a relation edge between blocks.
pub const CORE_UNLINK: &str = "core.unlink";
/// Grant a capability to an editor.
pub const CORE_GRANT: &str = "core.grant";
/// Revoke a capability from an editor.
pub const CORE_REVOKE: &str = "core.revoke";
/// Register a new editor in the document.
pub const EDITOR_CREATE: &str = "editor.create";
/// Remove an editor from the document.
pub const EDITOR_DELETE: &str = "editor.delete";
/// Write text block content.
pub const TEXT_WRITE: &str = "text.write";
/// Read text block content.
pub const TEXT_READ: &str = "text.read";
/// Write code block source.
pub const CODE_WRITE: &str = "code.write";
/// Run a code block.
pub const CODE_EXECUTE: &str = "code.execute";
/// Write directory entries.
pub const DIRECTORY_WRITE: &str = "directory.write";
/// Append to a terminal session.
pub const TERMINAL_WRITE: &str = "terminal.write";

/// A per-document collection the client caches and refreshes as a unit.
///
/// Also the key half of a staleness ticket: refreshes for the same
/// `(document, collection)` pair supersede each other.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Blocks,
    Editors,
    Grants,
    Events,
}

/// Set of collections invalidated by a capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub blocks: bool,
    pub editors: bool,
    pub grants: bool,
    pub events: bool,
}

impl Invalidation {
    /// Nothing to refresh.
    pub const NONE: Self = Self {
        blocks: false,
        editors: false,
        grants: false,
        events: false,
    };

    /// Block content or structure changed; the audit log grew.
    pub const BLOCKS: Self = Self {
        blocks: true,
        editors: false,
        grants: false,
        events: true,
    };

    /// The grant table changed; the audit log grew.
    pub const GRANTS: Self = Self {
        blocks: false,
        editors: false,
        grants: true,
        events: true,
    };

    /// Editors changed, which can also drop their grants.
    pub const EDITORS: Self = Self {
        blocks: false,
        editors: true,
        grants: true,
        events: true,
    };

    /// Whether `collection` is part of this set.
    pub fn contains(&self, collection: Collection) -> bool {
        match collection {
            Collection::Blocks => self.blocks,
            Collection::Editors => self.editors,
            Collection::Grants => self.grants,
            Collection::Events => self.events,
        }
    }

    /// Collections in refresh order.
    pub fn collections(&self) -> Vec<Collection> {
        [
            Collection::Blocks,
            Collection::Editors,
            Collection::Grants,
            Collection::Events,
        ]
        .into_iter()
        .filter(|c| self.contains(*c))
        .collect()
    }

    /// True when no collection is invalidated.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl CapabilityId {
    /// Which collections a successful command with this capability invalidates.
    ///
    /// Unknown capabilities are assumed to touch block content, which is the
    /// common case for extension capabilities (`<type>.<verb>`).
    pub fn invalidates(&self) -> Invalidation {
        match self.as_str() {
            CORE_GRANT | CORE_REVOKE => Invalidation::GRANTS,
            EDITOR_CREATE | EDITOR_DELETE => Invalidation::EDITORS,
            TEXT_READ => Invalidation::NONE,
            _ => Invalidation::BLOCKS,
        }
    }

    /// The `<namespace>` half of `<namespace>.<verb>`.
    pub fn namespace(&self) -> &str {
        self.as_str()
            .split_once('.')
            .map(|(ns, _)| ns)
            .unwrap_or(self.as_str())
    }

    /// The write capability for blocks of `kind`.
    pub fn write_for(kind: BlockKind) -> Self {
        Self::new(match kind {
            BlockKind::Text => TEXT_WRITE,
            BlockKind::Code => CODE_WRITE,
            BlockKind::Directory => DIRECTORY_WRITE,
            BlockKind::Terminal => TERMINAL_WRITE,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
