//! Commands: ephemeral requests to mutate a document.

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, CapabilityId, CommandId, EditorId};

/// A request to exercise a capability, issued by an editor against a block.
///
/// Exists only for the duration of a dispatch; the resulting events are what
/// the document keeps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "cmd_id")]
    pub id: CommandId,
    pub editor_id: EditorId,
    pub cap_id: CapabilityId,
    /// Target block, or `*` for creation.
    pub block_id: BlockId,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Wall-clock issue time, Unix milliseconds.
    pub timestamp: u64,
}

impl Command {
    /// Build a command with a fresh ID stamped with the current time.
    pub fn new(
        editor_id: EditorId,
        cap_id: CapabilityId,
        block_id: BlockId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: CommandId::generate(),
            editor_id,
            cap_id,
            block_id,
            payload,
            timestamp: crate::now_millis(),
        }
    }
}
