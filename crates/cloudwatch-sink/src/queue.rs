// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded intake buffer shared by producers and the delivery loop.
//!
//! Producers call [`EventQueue::append`] from any thread; it takes a short
//! lock, pushes the event and returns. The lock is never held across I/O.
//! When the queue is at capacity the oldest event is evicted to make room,
//! so an append always succeeds for the new event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::warn;

use crate::batch::{Batch, BatchBuilder, BatchLimits};
use crate::event::LogEvent;
use crate::metrics::SinkMetrics;

#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
    flush_threshold: usize,
    flush_requested: Notify,
    eviction_reported: AtomicBool,
    metrics: Arc<SinkMetrics>,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` events that asks for an
    /// early flush whenever its length reaches `flush_threshold`.
    #[must_use]
    pub fn new(capacity: usize, flush_threshold: usize, metrics: Arc<SinkMetrics>) -> Self {
        EventQueue {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            flush_threshold: flush_threshold.max(1),
            flush_requested: Notify::new(),
            eviction_reported: AtomicBool::new(false),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEvent>> {
        // A panic while holding the lock cannot leave the deque half-mutated.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event`, evicting the oldest queued event if the queue is full.
    pub fn append(&self, event: LogEvent) {
        let (len, evicted) = {
            let mut events = self.lock();
            let evicted = if events.len() >= self.capacity {
                events.pop_front().is_some()
            } else {
                false
            };
            events.push_back(event);
            (events.len(), evicted)
        };

        self.metrics.record_appended();
        if evicted {
            self.metrics.record_evicted();
            if !self.eviction_reported.swap(true, Ordering::Relaxed) {
                warn!(
                    "CLOUDWATCH | Event queue full ({} items), dropping oldest log events",
                    self.capacity
                );
            }
        }

        if len >= self.flush_threshold {
            self.flush_requested.notify_one();
        }
    }

    /// Removes and returns the next batch satisfying `limits`, preserving
    /// append order. This is the only way events leave the queue for delivery.
    pub fn drain(&self, limits: &BatchLimits) -> Option<Batch> {
        let batch = {
            let mut events = self.lock();
            BatchBuilder::new(*limits).build(&mut events)
        };
        self.eviction_reported.store(false, Ordering::Relaxed);

        if let Some(batch) = &batch {
            if batch.is_truncated() {
                self.metrics.record_truncated();
            }
        }
        batch
    }

    /// Discards everything still queued and returns how many events were dropped.
    pub fn clear(&self) -> usize {
        let mut events = self.lock();
        let dropped = events.len();
        events.clear();
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Asks the delivery loop to flush without waiting for the next period.
    pub fn request_flush(&self) {
        self.flush_requested.notify_one();
    }

    /// Resolves once the threshold was crossed or a flush was requested.
    pub async fn flush_requested(&self) {
        self.flush_requested.notified().await;
    }
}
