//! Access grants: "editor X may perform capability Y on block Z (or any block)".
//!
//! Grants are backend-authoritative. The client caches the last reported set
//! and filters it, but never invents one.

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, CapabilityId, EditorId};

/// A recorded permission assignment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub editor_id: EditorId,
    pub cap_id: CapabilityId,
    /// Target block, or the wildcard `*` for every block.
    pub block_id: BlockId,
}

impl Grant {
    pub fn new(
        editor_id: impl Into<EditorId>,
        cap_id: impl Into<CapabilityId>,
        block_id: impl Into<BlockId>,
    ) -> Self {
        Self {
            editor_id: editor_id.into(),
            cap_id: cap_id.into(),
            block_id: block_id.into(),
        }
    }

    /// A grant covering every block.
    pub fn wildcard(editor_id: impl Into<EditorId>, cap_id: impl Into<CapabilityId>) -> Self {
        Self::new(editor_id, cap_id, BlockId::wildcard())
    }

    /// Whether this grant applies to `block` (exact match or wildcard).
    pub fn covers_block(&self, block: &BlockId) -> bool {
        self.block_id.is_wildcard() || &self.block_id == block
    }

    /// Whether this grant lets `editor` perform `cap` on `block`.
    pub fn permits(&self, editor: &EditorId, cap: &CapabilityId, block: &BlockId) -> bool {
        &self.editor_id == editor && &self.cap_id == cap && self.covers_block(block)
    }
}

impl std::fmt::Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} may {} on {}", self.editor_id, self.cap_id, self.block_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_grant_covers_only_its_block() {
        let g = Grant::new("e2", "text.write", "b1");
        assert!(g.covers_block(&BlockId::new("b1")));
        assert!(!g.covers_block(&BlockId::new("b2")));
    }

    #[test]
    fn test_wildcard_grant_covers_every_block() {
        let g = Grant::wildcard("e2", "text.write");
        assert!(g.covers_block(&BlockId::new("anything")));
    }

    #[test]
    fn test_permits_checks_all_three_fields() {
        let g = Grant::new("e2", "text.write", "b1");
        let (e2, e3) = (EditorId::new("e2"), EditorId::new("e3"));
        let (write, delete) = (CapabilityId::new("text.write"), CapabilityId::new("core.delete"));
        let b1 = BlockId::new("b1");
        assert!(g.permits(&e2, &write, &b1));
        assert!(!g.permits(&e3, &write, &b1));
        assert!(!g.permits(&e2, &delete, &b1));
    }

    #[test]
    fn test_grant_wire_format() {
        let g: Grant = serde_json::from_str(
            r#"{"editor_id":"e2","cap_id":"text.write","block_id":"*"}"#,
        )
        .unwrap();
        assert_eq!(g, Grant::wildcard("e2", "text.write"));
    }
}
