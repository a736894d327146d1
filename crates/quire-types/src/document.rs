//! Document-level metadata and historical snapshots.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::grant::Grant;
use crate::ids::DocumentId;

/// Metadata about an open document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(rename = "file_id")]
    pub id: DocumentId,
    pub name: String,
    pub path: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Unix milliseconds of the last save.
    #[serde(default)]
    pub modified_at: u64,
}

impl DocumentInfo {
    /// Metadata derived from a path, stamped now. File name becomes the
    /// display name.
    pub fn for_path(id: DocumentId, path: impl Into<String>) -> Self {
        let path = path.into();
        let name = std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let now = crate::now_millis();
        Self {
            id,
            name,
            path,
            created_at: now,
            modified_at: now,
        }
    }
}

/// A block and the grant table as they stood at some event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalState {
    pub block: Block,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_path_uses_file_name() {
        let info = DocumentInfo::for_path(DocumentId::new("f1"), "/tmp/project/notes.elf");
        assert_eq!(info.name, "notes.elf");
        assert_eq!(info.path, "/tmp/project/notes.elf");
        assert_eq!(info.created_at, info.modified_at);
    }

    #[test]
    fn test_for_path_without_file_name() {
        let info = DocumentInfo::for_path(DocumentId::new("f2"), "/");
        assert_eq!(info.name, "/");
    }
}
