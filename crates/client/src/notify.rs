//! User-visible notification channel.
//!
//! Every failure the user should see goes through one [`Notifier`]. Entries
//! are dismissible; sticky entries (like the offline indicator) stay until
//! dismissed or cleared by key, and re-raising a key never duplicates it.
//! Only the newest [`MAX_TRANSIENT`] non-sticky entries are kept.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 64;

/// Non-sticky notifications kept on screen; the oldest falls off first.
pub const MAX_TRANSIENT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub level: Level,
    pub message: String,
    /// Set for sticky notifications.
    pub key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_sticky(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    active: Vec<Notification>,
}

impl Inner {
    fn trim_transient(&mut self) {
        let transient = self.active.iter().filter(|n| !n.is_sticky()).count();
        let mut excess = transient.saturating_sub(MAX_TRANSIENT);
        self.active.retain(|n| {
            if excess > 0 && !n.is_sticky() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Mutex<Inner>>,
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            tx,
        }
    }

    /// Watch notifications as they are raised.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.push(Level::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> u64 {
        self.push(Level::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.push(Level::Error, message)
    }

    pub fn push(&self, level: Level, message: impl Into<String>) -> u64 {
        self.raise(level, message.into(), None)
    }

    /// Raise a persistent notification. If one with the same key is already
    /// showing, its id is returned and nothing new is raised.
    pub fn push_sticky(&self, key: &str, level: Level, message: impl Into<String>) -> u64 {
        self.raise(level, message.into(), Some(key.to_string()))
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.active.len();
        inner.active.retain(|n| n.id != id);
        inner.active.len() != before
    }

    pub fn dismiss_key(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.active.len();
        inner.active.retain(|n| n.key.as_deref() != Some(key));
        inner.active.len() != before
    }

    pub fn active(&self) -> Vec<Notification> {
        self.lock().active.clone()
    }

    pub fn clear(&self) {
        self.lock().active.clear();
    }

    fn raise(&self, level: Level, message: String, key: Option<String>) -> u64 {
        let notification = {
            let mut inner = self.lock();
            if let Some(key) = key.as_deref() {
                if let Some(existing) = inner.active.iter().find(|n| n.key.as_deref() == Some(key)) {
                    return existing.id;
                }
            }
            inner.next_id += 1;
            let notification = Notification {
                id: inner.next_id,
                level,
                message,
                key,
                created_at: Utc::now(),
            };
            inner.active.push(notification.clone());
            if !notification.is_sticky() {
                inner.trim_transient();
            }
            notification
        };

        match level {
            Level::Info => crate::log_info!("notify: {}", notification.message),
            Level::Warning => crate::log_warn!("notify: {}", notification.message),
            Level::Error => crate::log_error!("notify: {}", notification.message),
        }

        let id = notification.id;
        // No receivers is fine.
        let _ = self.tx.send(notification);
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_dismiss() {
        let notifier = Notifier::new();
        let a = notifier.error("boom");
        let b = notifier.info("fyi");
        assert_eq!(notifier.active().len(), 2);
        assert!(notifier.dismiss(a));
        assert!(!notifier.dismiss(a));
        assert_eq!(notifier.active()[0].id, b);
    }

    #[test]
    fn test_sticky_is_deduplicated() {
        let notifier = Notifier::new();
        let first = notifier.push_sticky("offline", Level::Warning, "You are offline");
        let second = notifier.push_sticky("offline", Level::Warning, "You are offline");
        assert_eq!(first, second);
        assert_eq!(notifier.active().len(), 1);
        assert!(notifier.active()[0].is_sticky());
        assert!(notifier.dismiss_key("offline"));
        assert!(notifier.active().is_empty());
    }

    #[test]
    fn test_transient_notifications_are_capped() {
        let notifier = Notifier::new();
        notifier.push_sticky("offline", Level::Warning, "You are offline");
        for n in 0..MAX_TRANSIENT + 5 {
            notifier.error(format!("failure {n}"));
        }
        let active = notifier.active();
        assert_eq!(active.len(), MAX_TRANSIENT + 1);
        assert!(active[0].is_sticky());
        assert_eq!(active[1].message, "failure 5");
        assert_eq!(
            active.last().map(|n| n.message.clone()),
            Some(format!("failure {}", MAX_TRANSIENT + 4))
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_notifications() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.warn("heads up");
        let got = rx.recv().await.unwrap();
        assert_eq!(got.message, "heads up");
        assert_eq!(got.level, Level::Warning);
    }
}
