// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

use crate::constants::EVENT_OVERHEAD_BYTES;

/// A single pre-rendered log event.
///
/// Events are immutable once appended to the queue, with one exception: the
/// batch builder may shorten the message of an event that on its own exceeds
/// the batch byte ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    message: String,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Milliseconds since the Unix epoch, the unit the backend expects.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Size the backend charges for this event against the batch ceiling.
    #[must_use]
    pub fn size(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD_BYTES
    }

    /// Shortens the message so that `size()` is at most `max_size`, cutting on
    /// a UTF-8 character boundary. Returns `true` if anything was removed.
    pub(crate) fn truncate_to(&mut self, max_size: usize) -> bool {
        let budget = max_size.saturating_sub(EVENT_OVERHEAD_BYTES);
        if self.message.len() <= budget {
            return false;
        }
        let mut cut = budget;
        while !self.message.is_char_boundary(cut) {
            cut -= 1;
        }
        self.message.truncate(cut);
        true
    }
}
