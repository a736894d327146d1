//! Editors: the actors that own blocks and hold capabilities.
//!
//! An `Editor` is any identity that can issue commands against a document,
//! a person at a keyboard or an automated bot. Which editor is "active" is a
//! per-document pointer kept by the client, not a property of the editor.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::EditorId;

/// Display name of the well-known system editor.
pub const SYSTEM_EDITOR_NAME: &str = "System";

/// Whether an editor is a person or an automated actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EditorKind {
    #[default]
    #[strum(serialize = "human", serialize = "user")]
    Human,
    #[strum(serialize = "bot", serialize = "agent", serialize = "automated")]
    Bot,
}

/// An identity that can act on a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    #[serde(rename = "editor_id")]
    pub id: EditorId,
    pub name: String,
    #[serde(default, rename = "editor_type")]
    pub kind: EditorKind,
}

impl Editor {
    /// A human editor.
    pub fn human(id: impl Into<EditorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EditorKind::Human,
        }
    }

    /// An automated editor.
    pub fn bot(id: impl Into<EditorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EditorKind::Bot,
        }
    }

    /// Whether this is the well-known system editor (matched by name).
    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_EDITOR_NAME
    }
}

impl std::fmt::Display for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_construction() {
        let e = Editor::human("e1", "Alice");
        assert_eq!(e.id.as_str(), "e1");
        assert_eq!(e.kind, EditorKind::Human);
        assert!(!e.is_system());
    }

    #[test]
    fn test_system_editor_by_name() {
        assert!(Editor::bot("sys", SYSTEM_EDITOR_NAME).is_system());
    }

    #[test]
    fn test_editor_wire_names() {
        let e: Editor = serde_json::from_str(
            r#"{"editor_id":"e2","name":"Reviewer","editor_type":"bot"}"#,
        )
        .unwrap();
        assert_eq!(e, Editor::bot("e2", "Reviewer"));
    }

    #[test]
    fn test_editor_kind_defaults_to_human() {
        let e: Editor = serde_json::from_str(r#"{"editor_id":"e3","name":"Bob"}"#).unwrap();
        assert_eq!(e.kind, EditorKind::Human);
    }

    #[test]
    fn test_editor_kind_aliases() {
        assert_eq!("Automated".parse::<EditorKind>().unwrap(), EditorKind::Bot);
        assert_eq!("user".parse::<EditorKind>().unwrap(), EditorKind::Human);
    }

    #[test]
    fn test_editor_display() {
        assert_eq!(Editor::human("e1", "Alice").to_string(), "Alice (e1)");
    }
}
