//! Transient user-visible notifications.
//!
//! Persistence failures and other recoverable problems surface here
//! rather than as errors: the local state stays put and the message
//! expires on its own. The engine never reads a clock to decide
//! expiry — the host passes the current instant when it sweeps, the
//! same way it drives search debouncing and frame ticks.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// One transient message with a time-to-live.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub raised_at: Instant,
    ttl: Duration,
}

impl Notification {
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) >= self.ttl
    }

    #[must_use]
    pub fn time_remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.raised_at))
    }
}

/// Newest-first stack of live notifications.
#[derive(Debug, Default)]
pub struct NotificationManager {
    notifications: Vec<Notification>,
    default_ttl: Duration,
}

impl NotificationManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(Duration::from_secs(5))
    }

    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            notifications: Vec::new(),
            default_ttl,
        }
    }

    pub fn notify(&mut self, message: impl Into<String>, level: NotificationLevel) {
        self.notify_for(message, level, self.default_ttl);
    }

    pub fn notify_for(
        &mut self,
        message: impl Into<String>,
        level: NotificationLevel,
        ttl: Duration,
    ) {
        self.notifications.insert(
            0,
            Notification {
                message: message.into(),
                level,
                raised_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Info);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Error);
    }

    /// Sweep expired notifications against the host's clock. Returns
    /// true when anything was dropped, so the host knows to redraw.
    pub fn sweep(&mut self, now: Instant) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| !n.is_expired(now));
        self.notifications.len() != before
    }

    /// Most recent live notification.
    #[must_use]
    pub fn current(&self) -> Option<&Notification> {
        self.notifications.first()
    }

    #[must_use]
    pub fn all(&self) -> &[Notification] {
        &self.notifications
    }

    /// Drop the most recent notification before its ttl runs out.
    pub fn dismiss_current(&mut self) -> bool {
        if self.notifications.is_empty() {
            false
        } else {
            self.notifications.remove(0);
            true
        }
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }

    #[must_use]
    pub fn has_notifications(&self) -> bool {
        !self.notifications.is_empty()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.notifications.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_judged_against_the_passed_instant() {
        let mut manager = NotificationManager::with_default_ttl(Duration::from_millis(50));
        manager.info("short-lived");

        let raised = manager.current().unwrap().raised_at;
        assert!(!manager.current().unwrap().is_expired(raised));
        assert!(
            manager
                .current()
                .unwrap()
                .is_expired(raised + Duration::from_millis(50))
        );
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let mut manager = NotificationManager::with_default_ttl(Duration::from_millis(50));
        manager.info("old");
        manager.notify_for("durable", NotificationLevel::Warning, Duration::from_secs(60));

        let now = manager.all()[1].raised_at + Duration::from_millis(80);
        assert!(manager.sweep(now));
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.current().unwrap().message, "durable");

        // Nothing left to expire: sweep reports no change.
        assert!(!manager.sweep(now));
    }

    #[test]
    fn newest_notification_is_current() {
        let mut manager = NotificationManager::new();
        manager.info("first");
        manager.warn("second");
        manager.error("third");

        assert_eq!(manager.count(), 3);
        let current = manager.current().unwrap();
        assert_eq!(current.message, "third");
        assert_eq!(current.level, NotificationLevel::Error);
    }

    #[test]
    fn dismiss_pops_the_newest() {
        let mut manager = NotificationManager::new();
        manager.info("first");
        manager.info("second");

        assert!(manager.dismiss_current());
        assert_eq!(manager.current().unwrap().message, "first");
        assert!(manager.dismiss_current());
        assert!(!manager.dismiss_current());
        assert!(!manager.has_notifications());
    }

    #[test]
    fn time_remaining_counts_down_to_zero() {
        let mut manager = NotificationManager::with_default_ttl(Duration::from_millis(100));
        manager.info("ticking");
        let n = manager.current().unwrap();

        assert_eq!(
            n.time_remaining(n.raised_at + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert_eq!(
            n.time_remaining(n.raised_at + Duration::from_secs(5)),
            Duration::ZERO
        );
    }
}
