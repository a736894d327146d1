//! Blocks and their typed content.
//!
//! A block is the unit of document content: it has an owner, a display name,
//! a type tag, a content payload whose shape depends on the tag, and a map of
//! named relations to other blocks.
//!
//! ## Design: BlockKind + BlockContent
//!
//! The wire form carries the type tag and the payload side by side:
//!
//! ```json
//! {
//!   "block_id": "b1",
//!   "name": "Notes",
//!   "owner": "alice",
//!   "block_type": "text",
//!   "contents": { "text": "hello" },
//!   "relations": { "children": ["b2"] }
//! }
//! ```
//!
//! `BlockContent` is adjacently tagged on `block_type` / `contents`, so a
//! payload that does not match its tag fails to decode instead of silently
//! becoming an untyped bag. [`BlockKind`] is the bare tag, used where only the
//! type matters (capability lookup, creation commands).

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BlockId, EditorId};

/// Relation name for structural parent → child edges.
pub const RELATION_CHILDREN: &str = "children";

/// What a block *is* (content type tag).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Prose / markdown text.
    #[default]
    #[serde(alias = "markdown")]
    #[strum(serialize = "text", serialize = "markdown")]
    Text,
    /// Executable source code.
    #[serde(alias = "executable")]
    #[strum(serialize = "code", serialize = "executable")]
    Code,
    /// A directory listing mapping paths to blocks.
    #[serde(alias = "dir")]
    #[strum(serialize = "directory", serialize = "dir")]
    Directory,
    /// An interactive terminal session transcript.
    #[serde(alias = "session", alias = "interactive-session")]
    #[strum(serialize = "terminal", serialize = "session", serialize = "interactive-session")]
    Terminal,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    ///
    /// Supports aliases: "markdown" -> Text, "executable" -> Code,
    /// "dir" -> Directory, "session" / "interactive-session" -> Terminal.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Code => "code",
            BlockKind::Directory => "directory",
            BlockKind::Terminal => "terminal",
        }
    }

    /// Empty content of this kind, used for freshly created blocks.
    pub fn empty_content(&self) -> BlockContent {
        match self {
            BlockKind::Text => BlockContent::Text(TextContent::default()),
            BlockKind::Code => BlockContent::Code(CodeContent::default()),
            BlockKind::Directory => BlockContent::Directory(DirectoryContent::default()),
            BlockKind::Terminal => BlockContent::Terminal(TerminalContent::default()),
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text block payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub text: String,
}

/// Code block payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub source: String,
    /// Output of the most recent execution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
}

/// Directory block payload: relative path → block holding that entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, BlockId>,
}

/// One command/output pair in a terminal transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEntry {
    pub command: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Terminal block payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub entries: Vec<TerminalEntry>,
}

/// Typed block content, tagged by block type.
///
/// Tag aliases match the ones [`BlockKind`] parses, so a backend that still
/// sends `markdown` or `interactive-session` decodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "block_type", content = "contents", rename_all = "lowercase")]
pub enum BlockContent {
    #[serde(alias = "markdown")]
    Text(TextContent),
    #[serde(alias = "executable")]
    Code(CodeContent),
    #[serde(alias = "dir")]
    Directory(DirectoryContent),
    #[serde(alias = "session", alias = "interactive-session")]
    Terminal(TerminalContent),
}

/// Content that fails validation for its block type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("directory entry has an empty path")]
    EmptyDirectoryPath,
    #[error("directory entry '{0}' is not a relative path")]
    AbsoluteDirectoryPath(String),
    #[error("terminal entry {0} has an empty command")]
    EmptyTerminalCommand(usize),
    #[error("content for a {expected} block cannot be written to a {actual} block")]
    KindMismatch {
        expected: BlockKind,
        actual: BlockKind,
    },
}

impl BlockContent {
    /// The type tag for this content.
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockContent::Text(_) => BlockKind::Text,
            BlockContent::Code(_) => BlockKind::Code,
            BlockContent::Directory(_) => BlockKind::Directory,
            BlockContent::Terminal(_) => BlockKind::Terminal,
        }
    }

    /// Shorthand for text content.
    pub fn text(text: impl Into<String>) -> Self {
        BlockContent::Text(TextContent { text: text.into() })
    }

    /// Check the payload is well-formed for its type.
    pub fn validate(&self) -> Result<(), ContentError> {
        match self {
            BlockContent::Text(_) | BlockContent::Code(_) => Ok(()),
            BlockContent::Directory(dir) => {
                for path in dir.entries.keys() {
                    if path.is_empty() {
                        return Err(ContentError::EmptyDirectoryPath);
                    }
                    if path.starts_with('/') {
                        return Err(ContentError::AbsoluteDirectoryPath(path.clone()));
                    }
                }
                Ok(())
            }
            BlockContent::Terminal(term) => {
                match term.entries.iter().position(|e| e.command.trim().is_empty()) {
                    Some(idx) => Err(ContentError::EmptyTerminalCommand(idx)),
                    None => Ok(()),
                }
            }
        }
    }

    /// The inner payload as JSON, without the type tag.
    ///
    /// This is the `payload` of a write command for this block type.
    pub fn to_payload(&self) -> serde_json::Value {
        let tagged = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        tagged
            .get("contents")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A block as reported by the backend.
///
/// Never mutated in place by the client: a write goes to the backend as a
/// command and the block is replaced by the next refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "block_id")]
    pub id: BlockId,
    pub name: String,
    pub owner: EditorId,
    #[serde(flatten)]
    pub content: BlockContent,
    /// Relation name → ordered target blocks.
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<BlockId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a block with empty relations.
    pub fn new(
        id: impl Into<BlockId>,
        name: impl Into<String>,
        owner: impl Into<EditorId>,
        content: BlockContent,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: owner.into(),
            content,
            relations: BTreeMap::new(),
            description: None,
        }
    }

    /// Builder-style relation edge.
    pub fn with_relation(mut self, relation: impl Into<String>, target: impl Into<BlockId>) -> Self {
        self.relations
            .entry(relation.into())
            .or_default()
            .push(target.into());
        self
    }

    /// The block's type tag.
    pub fn kind(&self) -> BlockKind {
        self.content.kind()
    }

    /// Targets of one relation, in order.
    pub fn related(&self, relation: &str) -> &[BlockId] {
        self.relations
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Structural children.
    pub fn children(&self) -> &[BlockId] {
        self.related(RELATION_CHILDREN)
    }

    /// Whether any relation of this block points at `target`.
    pub fn links_to(&self, target: &BlockId) -> bool {
        self.relations.values().any(|targets| targets.contains(target))
    }

    /// Text body, if this is a text block.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            BlockContent::Text(t) => Some(&t.text),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_kind_aliases() {
        assert_eq!(BlockKind::from_str("markdown"), Some(BlockKind::Text));
        assert_eq!(BlockKind::from_str("Executable"), Some(BlockKind::Code));
        assert_eq!(BlockKind::from_str("session"), Some(BlockKind::Terminal));
        assert_eq!(BlockKind::from_str("interactive-session"), Some(BlockKind::Terminal));
        assert_eq!(BlockKind::from_str("spreadsheet"), None);
    }

    #[test]
    fn test_block_decodes_tag_aliases() {
        let cases = [
            ("markdown", json!({ "text": "# hi" }), BlockKind::Text),
            ("executable", json!({ "source": "ls" }), BlockKind::Code),
            ("dir", json!({ "entries": {} }), BlockKind::Directory),
            ("session", json!({ "entries": [] }), BlockKind::Terminal),
            ("interactive-session", json!({}), BlockKind::Terminal),
        ];
        for (tag, contents, kind) in cases {
            let raw = json!({
                "block_id": "b1",
                "name": "aliased",
                "owner": "alice",
                "block_type": tag,
                "contents": contents,
            });
            let block: Block = serde_json::from_value(raw)
                .unwrap_or_else(|e| panic!("{tag} failed to decode: {e}"));
            assert_eq!(block.kind(), kind, "{tag}");
            assert_eq!(BlockKind::from_str(tag), Some(kind), "{tag}");
            let bare: BlockKind = serde_json::from_value(json!(tag)).unwrap();
            assert_eq!(bare, kind, "{tag}");
        }
    }

    #[test]
    fn test_aliases_serialize_canonically() {
        let raw = json!({
            "block_id": "b1",
            "name": "aliased",
            "owner": "alice",
            "block_type": "markdown",
            "contents": { "text": "x" },
        });
        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(serde_json::to_value(&block).unwrap()["block_type"], "text");
    }

    #[test]
    fn test_block_decodes_tagged_content() {
        let raw = json!({
            "block_id": "b1",
            "name": "Notes",
            "owner": "alice",
            "block_type": "text",
            "contents": { "text": "hello" },
            "relations": { "children": ["b2", "b3"] }
        });
        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.kind(), BlockKind::Text);
        assert_eq!(block.text(), Some("hello"));
        assert_eq!(block.children(), &[BlockId::new("b2"), BlockId::new("b3")]);
    }

    #[test]
    fn test_block_decodes_empty_contents_with_defaults() {
        let raw = json!({
            "block_id": "t1",
            "name": "shell",
            "owner": "alice",
            "block_type": "terminal",
            "contents": {}
        });
        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.content, BlockKind::Terminal.empty_content());
        assert!(block.relations.is_empty());
    }

    #[test]
    fn test_block_rejects_mismatched_payload() {
        let raw = json!({
            "block_id": "c1",
            "name": "main",
            "owner": "alice",
            "block_type": "directory",
            "contents": { "entries": ["not", "a", "map"] }
        });
        assert!(serde_json::from_value::<Block>(raw).is_err());
    }

    #[test]
    fn test_block_serializes_flat() {
        let block = Block::new("b1", "Notes", "alice", BlockContent::text("hi"));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["block_type"], "text");
        assert_eq!(value["contents"]["text"], "hi");
        assert_eq!(value["block_id"], "b1");
    }

    #[test]
    fn test_to_payload_strips_tag() {
        let content = BlockContent::Code(CodeContent {
            language: Some("rust".into()),
            source: "fn main() {}".into(),
            last_output: None,
        });
        assert_eq!(
            content.to_payload(),
            json!({ "language": "rust", "source": "fn main() {}" })
        );
    }

    #[test]
    fn test_validate_directory_paths() {
        let mut dir = DirectoryContent::default();
        dir.entries.insert("src/lib.rs".into(), BlockId::new("b9"));
        assert!(BlockContent::Directory(dir.clone()).validate().is_ok());

        dir.entries.insert("/etc/passwd".into(), BlockId::new("b10"));
        assert_eq!(
            BlockContent::Directory(dir).validate(),
            Err(ContentError::AbsoluteDirectoryPath("/etc/passwd".into()))
        );
    }

    #[test]
    fn test_validate_terminal_commands() {
        let term = TerminalContent {
            cwd: None,
            entries: vec![
                TerminalEntry { command: "ls".into(), ..Default::default() },
                TerminalEntry { command: "  ".into(), ..Default::default() },
            ],
        };
        assert_eq!(
            BlockContent::Terminal(term).validate(),
            Err(ContentError::EmptyTerminalCommand(1))
        );
    }

    #[test]
    fn test_relations() {
        let block = Block::new("b1", "Root", "alice", BlockContent::text(""))
            .with_relation(RELATION_CHILDREN, "b2")
            .with_relation("implements", "b3");
        assert!(block.links_to(&BlockId::new("b3")));
        assert!(!block.links_to(&BlockId::new("b4")));
        assert_eq!(block.related("missing"), &[] as &[BlockId]);
    }
}
