//! # Statistics Counters
//!
//! Counters are plain atomics so the send path and the event path can
//! both update them without taking a lock.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Request/response channel counters
#[derive(Debug, Default)]
pub struct HttpCounters {
    requests_sent: AtomicU64,
    requests_failed: AtomicU64,
    bytes_sent: AtomicU64,
    attempts: AtomicU64,
}

/// Snapshot of [`HttpCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HttpStats {
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub bytes_sent: u64,
    pub attempts: u64,
}

impl HttpCounters {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, bytes: usize) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Called once per failed call, never once per attempt
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpStats {
        HttpStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

/// Streaming channel counters
#[derive(Debug, Default)]
pub struct StreamCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_failed: AtomicU64,
    messages_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    connection_errors: AtomicU64,
    framing_errors: AtomicU64,
    reconnect_attempts: AtomicU64,
    events_dropped: AtomicU64,
    latency_total_us: AtomicU64,
    latency_samples: AtomicU64,
}

/// Snapshot of [`StreamCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_failed: u64,
    pub messages_dropped: u64,
    pub bytes_sent: u64,
    pub connection_errors: u64,
    pub framing_errors: u64,
    pub reconnect_attempts: u64,
    pub events_dropped: u64,
    /// Mean ping round-trip over the channel's lifetime
    pub avg_latency_ms: f64,
}

impl StreamCounters {
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, rtt: Duration) {
        // Sub-microsecond round trips still count as one
        let us = (rtt.as_micros() as u64).max(1);
        self.latency_total_us.fetch_add(us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let total_us = self.latency_total_us.load(Ordering::Relaxed);
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            total_us as f64 / samples as f64 / 1000.0
        };

        StreamStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}
