//! Events and vector clocks.
//!
//! Events are the append-only record of capabilities having been exercised.
//! Each carries a vector clock (editor → logical counter) that establishes
//! causal order between events, plus a wall-clock creation time used only to
//! break ties between causally concurrent events.
//!
//! Ordering for display and restore is derived at read time by the client's
//! historian; nothing here is stored in order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CapabilityId, EditorId, EventId};

/// Causal relationship between two vector clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Causality {
    /// Every component equal.
    Equal,
    /// `self` happened before `other` (other dominates).
    Before,
    /// `self` happened after `other` (self dominates).
    After,
    /// Neither dominates.
    Concurrent,
}

/// Per-editor logical counters. Missing components read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<EditorId, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for one editor (zero if absent).
    pub fn get(&self, editor: &EditorId) -> u64 {
        self.0.get(editor).copied().unwrap_or(0)
    }

    /// Set one editor's counter.
    pub fn set(&mut self, editor: EditorId, counter: u64) {
        self.0.insert(editor, counter);
    }

    /// Bump one editor's counter, returning the new value.
    pub fn tick(&mut self, editor: &EditorId) -> u64 {
        let slot = self.0.entry(editor.clone()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Component-wise maximum with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        for (editor, &counter) in &other.0 {
            let slot = self.0.entry(editor.clone()).or_insert(0);
            *slot = (*slot).max(counter);
        }
    }

    /// Builder-style component.
    pub fn with(mut self, editor: impl Into<EditorId>, counter: u64) -> Self {
        self.set(editor.into(), counter);
        self
    }

    /// Iterate components in editor order.
    pub fn iter(&self) -> impl Iterator<Item = (&EditorId, u64)> {
        self.0.iter().map(|(e, c)| (e, *c))
    }

    /// Compare component-wise over the union of both key sets.
    pub fn causality(&self, other: &VectorClock) -> Causality {
        let mut less = false;
        let mut greater = false;
        for editor in self.0.keys().chain(other.0.keys()) {
            match self.get(editor).cmp(&other.get(editor)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return Causality::Concurrent;
            }
        }
        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    /// Whether `self` causally dominates `other`: every component ≥ and at
    /// least one >.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.causality(other) == Causality::After
    }
}

impl FromIterator<(EditorId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (EditorId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An immutable record of a capability having been exercised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event_id")]
    pub id: EventId,
    /// The entity (usually a block) the event is about.
    pub entity: String,
    /// `"<editorId>/<capabilityId>"`.
    pub attribute: String,
    #[serde(default)]
    pub value: serde_json::Value,
    pub timestamp: VectorClock,
    /// Wall-clock creation time, Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
}

impl Event {
    /// Build an event, encoding `editor` and `cap` into the attribute.
    pub fn new(
        entity: impl Into<String>,
        editor: &EditorId,
        cap: &CapabilityId,
        value: serde_json::Value,
        timestamp: VectorClock,
    ) -> Self {
        Self {
            id: EventId::generate(),
            entity: entity.into(),
            attribute: format!("{editor}/{cap}"),
            value,
            timestamp,
            created_at: crate::now_millis(),
        }
    }

    /// Split the attribute into its editor and capability halves.
    ///
    /// Splits on the first `/`; capability IDs never contain one.
    pub fn actor_and_capability(&self) -> Option<(EditorId, CapabilityId)> {
        let (editor, cap) = self.attribute.split_once('/')?;
        if editor.is_empty() || cap.is_empty() {
            return None;
        }
        Some((EditorId::new(editor), CapabilityId::new(cap)))
    }

    /// The editor that produced this event.
    pub fn editor_id(&self) -> Option<EditorId> {
        self.actor_and_capability().map(|(e, _)| e)
    }

    /// The capability this event records.
    pub fn capability_id(&self) -> Option<CapabilityId> {
        self.actor_and_capability().map(|(_, c)| c)
    }
}

// ============================================================================
// Tests
// ============================================================================
