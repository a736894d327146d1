//! Capability resolution.
//!
//! Answers "may this editor exercise this capability on this block?" from
//! locally cached ownership and grants. The answer is advisory: it drives
//! which affordances are enabled, while the backend stays authoritative. A
//! check that passes here and is refused by the backend surfaces as an
//! ordinary `CommandRejected`.

use quire_types::capability::{
    CORE_DELETE, CORE_GRANT, CORE_LINK, CORE_RENAME, CORE_REVOKE, CORE_UNLINK, TEXT_READ,
};
use quire_types::{BlockId, BlockKind, CapabilityId, EditorId, Grant};

/// What the resolver needs to know about a document.
pub trait AuthContext {
    /// Owner of `block`, if the block is known.
    fn owner_of(&self, block: &BlockId) -> Option<&EditorId>;

    /// Every grant recorded for the document.
    fn grants(&self) -> &[Grant];
}

/// Whether `editor` may exercise `capability` on `block`.
///
/// Owners may do anything to their own blocks. Everyone else needs a grant
/// naming the block or the wildcard.
pub fn can_perform(
    editor: &EditorId,
    capability: &CapabilityId,
    block: &BlockId,
    ctx: &impl AuthContext,
) -> bool {
    if ctx.owner_of(block) == Some(editor) {
        return true;
    }
    ctx.grants()
        .iter()
        .any(|grant| grant.permits(editor, capability, block))
}

/// The subset of `candidates` that `editor` may exercise on `block`.
pub fn allowed_capabilities<'c>(
    editor: &EditorId,
    block: &BlockId,
    ctx: &impl AuthContext,
    candidates: impl IntoIterator<Item = &'c CapabilityId>,
) -> Vec<CapabilityId> {
    candidates
        .into_iter()
        .filter(|cap| can_perform(editor, cap, block, ctx))
        .cloned()
        .collect()
}

/// Capabilities a UI typically offers on a block of `kind`.
pub fn block_affordances(kind: BlockKind) -> Vec<CapabilityId> {
    let mut caps = vec![CapabilityId::write_for(kind)];
    if kind == BlockKind::Text {
        caps.push(CapabilityId::new(TEXT_READ));
    }
    caps.extend(
        [CORE_RENAME, CORE_DELETE, CORE_LINK, CORE_UNLINK, CORE_GRANT, CORE_REVOKE]
            .into_iter()
            .map(CapabilityId::new),
    );
    caps
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use quire_types::capability::TEXT_WRITE;

    use super::*;

    #[derive(Default)]
    struct Fixture {
        owners: HashMap<BlockId, EditorId>,
        grants: Vec<Grant>,
    }

    impl AuthContext for Fixture {
        fn owner_of(&self, block: &BlockId) -> Option<&EditorId> {
            self.owners.get(block)
        }

        fn grants(&self) -> &[Grant] {
            &self.grants
        }
    }

    fn fixture() -> Fixture {
        let mut f = Fixture::default();
        f.owners.insert(BlockId::new("b1"), EditorId::new("e1"));
        f.owners.insert(BlockId::new("b2"), EditorId::new("e1"));
        f
    }

    fn check(f: &Fixture, editor: &str, cap: &str, block: &str) -> bool {
        can_perform(
            &EditorId::new(editor),
            &CapabilityId::new(cap),
            &BlockId::new(block),
            f,
        )
    }

    #[test]
    fn test_owner_may_do_anything() {
        let f = fixture();
        assert!(check(&f, "e1", TEXT_WRITE, "b1"));
        assert!(check(&f, "e1", CORE_DELETE, "b1"));
        assert!(check(&f, "e1", "diagram.write", "b2"));
    }

    #[test]
    fn test_non_owner_without_grant_is_denied() {
        let f = fixture();
        assert!(!check(&f, "e2", TEXT_WRITE, "b1"));
    }

    #[test]
    fn test_exact_grant() {
        let mut f = fixture();
        f.grants.push(Grant::new("e2", TEXT_WRITE, "b1"));
        assert!(check(&f, "e2", TEXT_WRITE, "b1"));
        assert!(!check(&f, "e2", TEXT_WRITE, "b2"), "grant is per block");
        assert!(!check(&f, "e2", CORE_DELETE, "b1"), "grant is per capability");
        assert!(!check(&f, "e3", TEXT_WRITE, "b1"), "grant is per editor");
    }

    #[test]
    fn test_wildcard_grant() {
        let mut f = fixture();
        f.grants.push(Grant::wildcard("e2", TEXT_WRITE));
        assert!(check(&f, "e2", TEXT_WRITE, "b1"));
        assert!(check(&f, "e2", TEXT_WRITE, "b2"));
        assert!(check(&f, "e2", TEXT_WRITE, "unknown"));
        assert!(!check(&f, "e2", CORE_DELETE, "b1"));
    }

    #[test]
    fn test_unknown_block_has_no_owner() {
        let f = fixture();
        assert!(!check(&f, "e1", TEXT_WRITE, "missing"));
    }

    #[test]
    fn test_allowed_capabilities_filters_candidates() {
        let mut f = fixture();
        f.grants.push(Grant::new("e2", TEXT_WRITE, "b1"));
        f.grants.push(Grant::new("e2", CORE_RENAME, "b1"));
        let candidates = block_affordances(BlockKind::Text);

        let allowed = allowed_capabilities(
            &EditorId::new("e2"),
            &BlockId::new("b1"),
            &f,
            &candidates,
        );
        assert_eq!(
            allowed,
            vec![CapabilityId::new(TEXT_WRITE), CapabilityId::new(CORE_RENAME)]
        );

        let owner = allowed_capabilities(&EditorId::new("e1"), &BlockId::new("b1"), &f, &candidates);
        assert_eq!(owner.len(), candidates.len());
    }

    #[test]
    fn test_affordances_lead_with_type_write() {
        let caps = block_affordances(BlockKind::Code);
        assert_eq!(caps[0], CapabilityId::new("code.write"));
        assert!(!caps.contains(&CapabilityId::new(TEXT_READ)));
    }
}
