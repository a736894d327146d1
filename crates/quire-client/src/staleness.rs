//! Staleness guard for out-of-order refresh responses.
//!
//! Every read-back of a `(document, collection)` slice takes a [`Ticket`]
//! before it leaves for the backend. When the response arrives, it may only
//! be applied if no newer ticket was issued for the same key in the meantime.
//! Responses for superseded tickets are dropped, so once all in-flight reads
//! settle the visible state derives from the most recently issued one,
//! whatever order the responses came back in.
//!
//! Sequence numbers come from one global counter and are never reused, even
//! after [`StalenessGuard::forget`]. A ticket issued before a document was
//! closed can therefore never collide with one issued after it was reopened.
//!
//! # Locking
//!
//! [`StalenessGuard::commit`] runs the apply closure while holding the guard
//! lock, so "check currency" and "write the store" are one step. Callers that
//! also lock the store must take the guard first.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use quire_types::{Collection, DocumentId};

/// Receipt for one issued read.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    document: DocumentId,
    collection: Collection,
    seq: u64,
}

impl Ticket {
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.document.short(), self.collection, self.seq)
    }
}

/// Why a ticket could not be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stale {
    pub ticket: Ticket,
    /// Latest sequence number for the key, or `None` if the key was forgotten.
    pub latest: Option<u64>,
}

#[derive(Debug, Default)]
struct GuardState {
    next_seq: u64,
    latest: HashMap<(DocumentId, Collection), u64>,
}

impl GuardState {
    fn check(&self, ticket: &Ticket) -> Result<(), Stale> {
        let latest = self
            .latest
            .get(&(ticket.document.clone(), ticket.collection))
            .copied();
        if latest == Some(ticket.seq) {
            Ok(())
        } else {
            Err(Stale {
                ticket: ticket.clone(),
                latest,
            })
        }
    }
}

/// Per-`(document, collection)` ticket issuer.
#[derive(Debug, Default)]
pub struct StalenessGuard {
    state: Mutex<GuardState>,
}

impl StalenessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one for the same key.
    pub fn issue(&self, document: &DocumentId, collection: Collection) -> Ticket {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.latest.insert((document.clone(), collection), seq);
        trace!(document = %document, %collection, seq, "ticket issued");
        Ticket {
            document: document.clone(),
            collection,
            seq,
        }
    }

    /// Whether `ticket` is still the newest for its key.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.state.lock().check(ticket).is_ok()
    }

    /// Latest issued sequence number for a key.
    pub fn latest(&self, document: &DocumentId, collection: Collection) -> Option<u64> {
        self.state
            .lock()
            .latest
            .get(&(document.clone(), collection))
            .copied()
    }

    /// Run `apply` if `ticket` is current, atomically with the check.
    pub fn commit<R>(&self, ticket: &Ticket, apply: impl FnOnce() -> R) -> Result<R, Stale> {
        let state = self.state.lock();
        state.check(ticket)?;
        Ok(apply())
    }

    /// Run `apply` if `ticket` is current, handing it the latest sequence
    /// number issued for `watermark_of` on the same document (0 if none).
    ///
    /// Tickets for that collection issued after this call compare greater.
    pub fn commit_at_watermark<R>(
        &self,
        ticket: &Ticket,
        watermark_of: Collection,
        apply: impl FnOnce(u64) -> R,
    ) -> Result<R, Stale> {
        let state = self.state.lock();
        state.check(ticket)?;
        let mark = state
            .latest
            .get(&(ticket.document.clone(), watermark_of))
            .copied()
            .unwrap_or(0);
        Ok(apply(mark))
    }

    /// Drop all keys for a closed document. Its outstanding tickets become stale.
    pub fn forget(&self, document: &DocumentId) {
        self.state.lock().latest.retain(|(doc, _), _| doc != document);
    }
}

// ============================================================================
// Tests
// ============================================================================
