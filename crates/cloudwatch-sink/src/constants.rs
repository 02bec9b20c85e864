// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backend limits and option defaults.

use std::time::Duration;

/// Bytes the backend adds to every event when computing the batch size.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Maximum size of a `PutLogEvents` batch, overhead included.
pub const MAX_BATCH_SIZE_BYTES: usize = 1_048_576;

/// Maximum number of events in a single `PutLogEvents` batch.
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// A batch must span strictly less than this between its oldest and newest event.
pub const MAX_BATCH_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 100;
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_ATTEMPTS: u8 = 5;
pub const DEFAULT_QUEUE_SIZE_LIMIT: usize = 10_000;
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retention values accepted by `PutRetentionPolicy`.
pub const VALID_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];
