// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Folding queued events into delivery-ready batches.
//!
//! A batch is the longest prefix of the pending events that satisfies every
//! backend ceiling:
//!
//! 1. **Bytes**: sum of `message bytes + 26` stays within `max_bytes`
//! 2. **Count**: at most `max_count` events
//! 3. **Span**: newest minus oldest timestamp is strictly below `max_span`
//! 4. **Order**: timestamps never decrease inside a batch
//!
//! The scan stops at the first event that would break any rule; that event
//! and everything after it stay queued for the next batch. An event that
//! regresses in time therefore starts a new batch rather than being
//! reordered, so batches always keep the order in which events were appended.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::constants::{MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES, MAX_BATCH_SPAN};
use crate::event::LogEvent;

/// Ceilings a single batch must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_bytes: usize,
    pub max_count: usize,
    pub max_span: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits {
            max_bytes: MAX_BATCH_SIZE_BYTES,
            max_count: MAX_BATCH_EVENTS,
            max_span: MAX_BATCH_SPAN,
        }
    }
}

impl BatchLimits {
    #[must_use]
    pub fn new(max_bytes: usize, max_count: usize, max_span: Duration) -> Self {
        BatchLimits {
            max_bytes,
            max_count,
            max_span,
        }
    }

    /// Backend ceilings with the event count capped at `batch_size_limit`.
    #[must_use]
    pub fn with_batch_size_limit(batch_size_limit: usize) -> Self {
        BatchLimits {
            max_count: batch_size_limit.min(MAX_BATCH_EVENTS),
            ..Default::default()
        }
    }
}

/// An ordered group of events delivered in one `PutLogEvents` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    events: Vec<LogEvent>,
    size_bytes: usize,
    truncated: bool,
}

impl Batch {
    fn start(first: LogEvent, truncated: bool) -> Self {
        Batch {
            size_bytes: first.size(),
            events: vec![first],
            truncated,
        }
    }

    fn push(&mut self, event: LogEvent) {
        self.size_bytes += event.size();
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total size charged by the backend, per-event overhead included.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Whether the single event in this batch had its message shortened.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Time between the oldest and the newest event.
    #[must_use]
    pub fn span(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => millis_between(first.timestamp(), last.timestamp())
                .map_or(Duration::ZERO, Duration::from_millis),
            _ => Duration::ZERO,
        }
    }

    fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(LogEvent::timestamp)
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(LogEvent::timestamp)
    }
}

/// Non-negative distance in milliseconds from `from` to `to`.
fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<u64> {
    u64::try_from(to.timestamp_millis() - from.timestamp_millis()).ok()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchBuilder {
    limits: BatchLimits,
}

impl BatchBuilder {
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        BatchBuilder { limits }
    }

    #[must_use]
    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Removes the longest admissible prefix from `pending` and returns it as
    /// a batch, or `None` when nothing is pending.
    ///
    /// If the first pending event alone exceeds the byte ceiling its message
    /// is truncated to fit and it is returned on its own.
    pub fn build(&self, pending: &mut VecDeque<LogEvent>) -> Option<Batch> {
        let mut first = pending.pop_front()?;

        if first.size() > self.limits.max_bytes {
            let original_size = first.size();
            let truncated = first.truncate_to(self.limits.max_bytes);
            warn!(
                "CLOUDWATCH | Log event of {} bytes exceeds the {} byte batch limit, truncated to {} bytes",
                original_size,
                self.limits.max_bytes,
                first.size()
            );
            return Some(Batch::start(first, truncated));
        }

        let mut batch = Batch::start(first, false);
        while batch.len() < self.limits.max_count {
            let Some(next) = pending.front() else {
                break;
            };
            if !self.admits(&batch, next) {
                break;
            }
            if let Some(event) = pending.pop_front() {
                batch.push(event);
            }
        }
        Some(batch)
    }

    fn admits(&self, batch: &Batch, next: &LogEvent) -> bool {
        if batch.size_bytes() + next.size() > self.limits.max_bytes {
            return false;
        }

        let (Some(first), Some(last)) = (batch.first_timestamp(), batch.last_timestamp()) else {
            return true;
        };
        if next.timestamp() < last {
            return false;
        }

        match millis_between(first, next.timestamp()) {
            Some(span) => u128::from(span) < self.limits.max_span.as_millis(),
            None => false,
        }
    }
}
