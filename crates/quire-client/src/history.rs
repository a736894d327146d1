//! Event ordering and time travel.
//!
//! Events carry vector clocks, which only partially order them: two events
//! by different editors that never saw each other are concurrent. For display
//! and restore the client needs a total order, most recent first:
//!
//! 1. If one event's clock dominates the other's, it is more recent.
//! 2. Concurrent (or equal-clock) events fall back to `created_at`, then to
//!    the event ID so the order is deterministic.
//!
//! The pairwise rule above is not transitive once the tie-break kicks in, so
//! [`order`] does not sort with it. It linearizes instead: repeatedly emit,
//! among events no remaining event dominates, the one with the latest
//! `(created_at, id)`. The result always respects causality.
//!
//! Restore fetches `{block, grants}` as of an event and replaces local state
//! with it. It never sends a mutation to the backend; doing it twice is the
//! same as doing it once.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};

use quire_types::{BlockId, Causality, Collection, DocumentId, Event, EventId};

use crate::backend::Backend;
use crate::error::{ClientError, ClientResult};
use crate::notify::NotificationCenter;
use crate::refresh::{RefreshOutcome, SkipReason};
use crate::staleness::StalenessGuard;
use crate::store::DocumentStore;

/// Compare two events, `Greater` meaning `a` is more recent.
pub fn causal_cmp(a: &Event, b: &Event) -> Ordering {
    match a.timestamp.causality(&b.timestamp) {
        Causality::After => Ordering::Greater,
        Causality::Before => Ordering::Less,
        Causality::Equal | Causality::Concurrent => tie_break(a, b),
    }
}

fn tie_break(a: &Event, b: &Event) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Heap entry: latest `(created_at, id)` pops first.
struct Ready<'a> {
    event: &'a Event,
    index: usize,
}

impl PartialEq for Ready<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Ready<'_> {}

impl PartialOrd for Ready<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        tie_break(self.event, other.event).then_with(|| self.index.cmp(&other.index))
    }
}

/// Order events most recent first, respecting causality.
pub fn order(events: Vec<Event>) -> Vec<Event> {
    let n = events.len();
    // dominates[i]: events i's clock dominates. blockers[j]: how many dominate j.
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut blockers = vec![0usize; n];
    for i in 0..n {
        for j in 0..n {
            if i != j && events[i].timestamp.dominates(&events[j].timestamp) {
                dominates[i].push(j);
                blockers[j] += 1;
            }
        }
    }

    let mut heap: BinaryHeap<Ready<'_>> = (0..n)
        .filter(|&i| blockers[i] == 0)
        .map(|index| Ready {
            event: &events[index],
            index,
        })
        .collect();

    let mut sequence = Vec::with_capacity(n);
    while let Some(Ready { index, .. }) = heap.pop() {
        sequence.push(index);
        for &j in &dominates[index] {
            blockers[j] -= 1;
            if blockers[j] == 0 {
                heap.push(Ready {
                    event: &events[j],
                    index: j,
                });
            }
        }
    }

    let mut slots: Vec<Option<Event>> = events.into_iter().map(Some).collect();
    sequence
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Read-side access to document history, plus restore.
#[derive(Clone)]
pub struct Historian {
    backend: Arc<dyn Backend>,
    store: Arc<DocumentStore>,
    guard: Arc<StalenessGuard>,
    notifications: Arc<NotificationCenter>,
}

impl Historian {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<DocumentStore>,
        guard: Arc<StalenessGuard>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            backend,
            store,
            guard,
            notifications,
        }
    }

    /// All events of a document, most recent first.
    pub fn history(&self, document: &DocumentId) -> ClientResult<Vec<Event>> {
        Ok(order(self.store.events(document)?))
    }

    /// Events about one entity, most recent first.
    pub fn history_for(&self, document: &DocumentId, entity: &BlockId) -> ClientResult<Vec<Event>> {
        let events = self.store.read(document, |s| {
            s.events()
                .iter()
                .filter(|e| e.entity == entity.as_str())
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(order(events))
    }

    /// Replace `block` and the grant set with their state as of `event`.
    ///
    /// Local only: nothing is sent to the backend but the read. A grants
    /// refresh issued while the read is in flight wins. The restored block
    /// survives block listings issued before the restore lands, so an
    /// in-flight listing still adds the blocks it carries; the next listing
    /// issued after it replaces the block with the backend's version.
    pub async fn restore(
        &self,
        document: &DocumentId,
        block: &BlockId,
        event: &EventId,
    ) -> ClientResult<RefreshOutcome> {
        let span = info_span!("history.restore", document = %document, block = %block, event = %event);
        async {
            if !self.store.contains(document) {
                return Err(ClientError::UnknownDocument(document.clone()));
            }
            let ticket = self.guard.issue(document, Collection::Grants);

            let state = match self.backend.get_historical_state(document, block, event).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, "historical state unavailable");
                    self.notifications
                        .error(format!("Could not restore {}", block.short()), Some(e.to_string()));
                    return Err(ClientError::Backend(e));
                }
            };

            if state.block.id != *block {
                let message = format!(
                    "asked for block {block} at {event}, got {}",
                    state.block.id
                );
                self.notifications.error("Restore failed", Some(message.clone()));
                return Err(ClientError::InvariantViolation(message));
            }

            let grant_count = state.grants.len();
            match self.guard.commit_at_watermark(&ticket, Collection::Blocks, |mark| {
                self.store
                    .restore_snapshot(document, state.block, state.grants, mark)
            }) {
                Ok(applied) => {
                    applied?;
                    info!(grants = grant_count, "restored block from history");
                    Ok(RefreshOutcome::Applied { count: 1 })
                }
                Err(stale) => Ok(RefreshOutcome::Skipped {
                    reason: SkipReason::from(stale),
                }),
            }
        }
        .instrument(span)
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quire_types::{CapabilityId, EditorId, VectorClock};

    use super::*;

    fn event(id: &str, clock: &[(&str, u64)], created_at: u64) -> Event {
        let mut e = Event::new(
            "b1",
            &EditorId::new("e1"),
            &CapabilityId::new("text.write"),
            serde_json::Value::Null,
            clock.iter().map(|(k, v)| (EditorId::new(*k), *v)).collect::<VectorClock>(),
        );
        e.id = EventId::new(id);
        e.created_at = created_at;
        e
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_dominance_beats_wall_clock() {
        // ev2 causally follows ev1 even though its wall clock is earlier.
        let ev1 = event("ev1", &[("a", 1)], 500);
        let ev2 = event("ev2", &[("a", 2)], 100);
        assert_eq!(causal_cmp(&ev2, &ev1), Ordering::Greater);
        assert_eq!(ids(&order(vec![ev1, ev2])), vec!["ev2", "ev1"]);
    }

    #[test]
    fn test_concurrent_tie_breaks_on_created_at() {
        let x = event("x", &[("a", 1)], 100);
        let y = event("y", &[("b", 1)], 200);
        assert_eq!(causal_cmp(&y, &x), Ordering::Greater);
        assert_eq!(ids(&order(vec![x, y])), vec!["y", "x"]);
    }

    #[test]
    fn test_equal_created_at_falls_back_to_id() {
        let x = event("x", &[("a", 1)], 100);
        let y = event("y", &[("b", 1)], 100);
        assert_eq!(ids(&order(vec![y.clone(), x.clone()])), vec!["y", "x"]);
        assert_eq!(ids(&order(vec![x, y])), vec!["y", "x"]);
    }

    #[test]
    fn test_order_respects_causality_when_tie_break_would_not() {
        // a1 → a2 causally. b1 is concurrent with both and sits between them
        // in wall time; a naive sort can put a1 above a2.
        let a1 = event("a1", &[("a", 1)], 300);
        let a2 = event("a2", &[("a", 2)], 100);
        let b1 = event("b1", &[("b", 1)], 200);
        let ordered = order(vec![a1, b1, a2]);
        let pos = |id: &str| ordered.iter().position(|e| e.id.as_str() == id).unwrap();
        assert!(pos("a2") < pos("a1"));
        assert_eq!(ordered.len(), 3);
    }

    #[test]
    fn test_order_is_input_order_independent() {
        let events = vec![
            event("e1", &[("a", 1)], 10),
            event("e2", &[("a", 1), ("b", 1)], 20),
            event("e3", &[("c", 1)], 15),
            event("e4", &[("a", 2), ("b", 1)], 5),
        ];
        let forward = ids(&order(events.clone())).join(",");
        let mut reversed = events;
        reversed.reverse();
        assert_eq!(ids(&order(reversed)).join(","), forward);
        assert_eq!(forward, "e3,e4,e2,e1");
    }

    #[test]
    fn test_empty() {
        assert!(order(Vec::new()).is_empty());
    }
}
