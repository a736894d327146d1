//! Client-side state sync and capability checks for quire documents.
//!
//! This crate is the in-memory reflection of an authoritative backend. It
//! keeps a cached view of each open document consistent with responses that
//! may arrive in any order, checks capabilities before mutations, and can
//! restore earlier block states from the event log.
//!
//! # Architecture
//!
//! ```text
//! UI intent
//!     ↓
//! Dispatcher ──► Backend.execute ──► Events
//!     ↓
//! Refresher (one ticket per collection, via StalenessGuard)
//!     ↓
//! DocumentStore (FileState per document) ──► StoreEvent broadcast ──► UI
//! ```
//!
//! [`QuireClient`] wires the pieces together. [`MemoryBackend`] is an
//! in-process backend for tests and demos; [`TransportBackend`] adapts any
//! JSON request/response channel.

pub mod backend;
pub mod capability;
pub mod client;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod memory_backend;
pub mod notify;
pub mod refresh;
pub mod session;
pub mod staleness;
pub mod store;
pub mod transport;

pub use backend::{Backend, BackendError, BackendResult};
pub use capability::{AuthContext, allowed_capabilities, block_affordances, can_perform};
pub use client::QuireClient;
pub use config::{ClientConfig, ConfigError, NotificationConfig};
pub use dispatch::Dispatcher;
pub use error::{ClientError, ClientResult};
pub use history::{Historian, causal_cmp, order};
pub use memory_backend::{MEMORY_SYSTEM_EDITOR, MemoryBackend};
pub use notify::{Notification, NotificationCenter, NotificationKind};
pub use refresh::{RefreshOutcome, Refresher, SkipReason};
pub use session::SessionManager;
pub use staleness::{Stale, StalenessGuard, Ticket};
pub use store::{ActiveEditorHeal, DocumentStore, FileState, StoreEvent, resolve_active_editor};
pub use transport::{Transport, TransportBackend};
