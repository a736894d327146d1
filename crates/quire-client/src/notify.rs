//! User-visible notifications with a bounded queue and dedupe window.
//!
//! Every failed mutation produces exactly one `Error` notification. Errors are
//! therefore never deduplicated; only repeated `Info`, `Success` and `Warning`
//! entries within the dedupe window collapse into one.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strum::{Display, EnumString, IntoStaticStr};
use tokio::sync::broadcast;

use crate::config::NotificationConfig;
use crate::constants::NOTIFICATION_FEED_CAPACITY;

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

pub type NotificationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    /// Short title line.
    pub title: String,
    pub body: Option<String>,
    pub created: Instant,
}

#[derive(Debug)]
struct Queue {
    items: VecDeque<Notification>,
    capacity: usize,
    dedupe_window: Duration,
    next_id: NotificationId,
}

/// Bounded notification queue shared by every client component.
pub struct NotificationCenter {
    queue: Mutex<Queue>,
    feed_tx: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    /// Create a queue holding at most `capacity` entries.
    pub fn new(capacity: usize, dedupe_window: Duration) -> Self {
        let (feed_tx, _) = broadcast::channel(NOTIFICATION_FEED_CAPACITY);
        Self {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                capacity: capacity.max(1),
                dedupe_window,
                next_id: 1,
            }),
            feed_tx,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(
            config.capacity,
            Duration::from_millis(config.dedupe_window_ms),
        )
    }

    /// Live feed of newly pushed notifications. Deduplicated repeats are not
    /// re-sent.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.feed_tx.subscribe()
    }

    /// Push a notification stamped now.
    pub fn push(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<Option<String>>,
    ) -> NotificationId {
        self.push_at(kind, title, body, Instant::now())
    }

    /// Push with an explicit timestamp.
    pub fn push_at(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<Option<String>>,
        now: Instant,
    ) -> NotificationId {
        let title = title.into();
        let body = body.into();

        let notification = {
            let mut queue = self.queue.lock();
            let window = queue.dedupe_window;

            if kind != NotificationKind::Error
                && let Some(existing) = queue.items.iter_mut().find(|n| {
                    n.kind == kind
                        && n.title == title
                        && n.body == body
                        && now.saturating_duration_since(n.created) <= window
                })
            {
                existing.created = now;
                return existing.id;
            }

            let id = queue.next_id;
            queue.next_id += 1;
            let notification = Notification {
                id,
                kind,
                title,
                body,
                created: now,
            };
            if queue.items.len() == queue.capacity {
                queue.items.pop_front();
            }
            queue.items.push_back(notification.clone());
            notification
        };

        let id = notification.id;
        let _ = self.feed_tx.send(notification);
        id
    }

    pub fn info(&self, title: impl Into<String>, body: impl Into<Option<String>>) -> NotificationId {
        self.push(NotificationKind::Info, title, body)
    }

    pub fn success(&self, title: impl Into<String>, body: impl Into<Option<String>>) -> NotificationId {
        self.push(NotificationKind::Success, title, body)
    }

    pub fn warning(&self, title: impl Into<String>, body: impl Into<Option<String>>) -> NotificationId {
        self.push(NotificationKind::Warning, title, body)
    }

    pub fn error(&self, title: impl Into<String>, body: impl Into<Option<String>>) -> NotificationId {
        self.push(NotificationKind::Error, title, body)
    }

    /// Current queue contents, oldest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.queue.lock().items.iter().cloned().collect()
    }

    /// Remove and return everything queued.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue.lock().items.drain(..).collect()
    }

    /// Dismiss one notification. Returns whether it was queued.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.items.len();
        queue.items.retain(|n| n.id != id);
        queue.items.len() != before
    }

    /// Queued notifications of one kind.
    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.queue.lock().items.iter().filter(|n| n.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().items.is_empty()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> NotificationCenter {
        NotificationCenter::new(3, Duration::from_millis(500))
    }

    #[test]
    fn test_dedupes_within_window() {
        let c = center();
        let t0 = Instant::now();
        let a = c.push_at(NotificationKind::Warning, "refresh failed", None, t0);
        let b = c.push_at(NotificationKind::Warning, "refresh failed", None, t0 + Duration::from_millis(100));
        assert_eq!(a, b);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_no_dedupe_outside_window() {
        let c = center();
        let t0 = Instant::now();
        let a = c.push_at(NotificationKind::Info, "saved", None, t0);
        let b = c.push_at(NotificationKind::Info, "saved", None, t0 + Duration::from_secs(2));
        assert_ne!(a, b);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_errors_are_never_deduped() {
        let c = center();
        let t0 = Instant::now();
        c.push_at(NotificationKind::Error, "rejected", None, t0);
        c.push_at(NotificationKind::Error, "rejected", None, t0);
        assert_eq!(c.count_of(NotificationKind::Error), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let c = center();
        for i in 0..5 {
            c.info(format!("n{i}"), None);
        }
        let titles: Vec<_> = c.snapshot().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["n2", "n3", "n4"]);
    }

    #[test]
    fn test_drain_and_dismiss() {
        let c = center();
        let id = c.error("boom", Some("details".to_string()));
        c.success("ok", None);
        assert!(c.dismiss(id));
        assert!(!c.dismiss(id));
        let drained = c.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind, NotificationKind::Success);
        assert!(c.is_empty());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(NotificationKind::Warning.to_string(), "warning");
    }
}
