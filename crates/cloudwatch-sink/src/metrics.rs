// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counters exposed to the host for its own diagnostics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SinkMetrics {
    events_appended: AtomicU64,
    events_evicted: AtomicU64,
    events_truncated: AtomicU64,
    events_sent: AtomicU64,
    events_dropped_on_shutdown: AtomicU64,
    batches_sent: AtomicU64,
    batches_abandoned: AtomicU64,
}

/// Point-in-time copy of [`SinkMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_appended: u64,
    pub events_evicted: u64,
    pub events_truncated: u64,
    pub events_sent: u64,
    pub events_dropped_on_shutdown: u64,
    pub batches_sent: u64,
    pub batches_abandoned: u64,
}

impl SinkMetrics {
    pub(crate) fn record_appended(&self) {
        self.events_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.events_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncated(&self) {
        self.events_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_sent(&self, events: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_abandoned(&self) {
        self.batches_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_on_shutdown(&self, events: usize) {
        self.events_dropped_on_shutdown
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_appended: self.events_appended.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            events_truncated: self.events_truncated.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_dropped_on_shutdown: self.events_dropped_on_shutdown.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_abandoned: self.batches_abandoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = SinkMetrics::default();
        metrics.record_appended();
        metrics.record_appended();
        metrics.record_evicted();
        metrics.record_batch_sent(2);
        metrics.record_batch_abandoned();
        metrics.record_dropped_on_shutdown(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_appended, 2);
        assert_eq!(snapshot.events_evicted, 1);
        assert_eq!(snapshot.events_sent, 2);
        assert_eq!(snapshot.batches_sent, 1);
        assert_eq!(snapshot.batches_abandoned, 1);
        assert_eq!(snapshot.events_dropped_on_shutdown, 3);
        assert_eq!(snapshot.events_truncated, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = SinkMetrics::default().snapshot();
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["batches_sent"], 0);
        assert_eq!(json["events_evicted"], 0);
    }
}
