//! Router counters.
//!
//! Plain atomics owned by one router; read them through a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub messages_received: AtomicU64,
    pub messages_handled: AtomicU64,
    pub messages_published: AtomicU64,
    pub handler_retries: AtomicU64,
    pub messages_dead_lettered: AtomicU64,
    pub messages_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterMetricsSnapshot {
    pub messages_received: u64,
    pub messages_handled: u64,
    pub messages_published: u64,
    pub handler_retries: u64,
    pub messages_dead_lettered: u64,
    pub messages_dropped: u64,
}

impl RouterMetrics {
    #[inline]
    pub fn inc_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_handled(&self) {
        self.messages_handled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_published(&self, count: u64) {
        self.messages_published.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_retries(&self) {
        self.handler_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dead_lettered(&self) {
        self.messages_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages neither handled nor dead-lettered.
    #[inline]
    pub fn inc_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            handler_retries: self.handler_retries.load(Ordering::Relaxed),
            messages_dead_lettered: self.messages_dead_lettered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}
