// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error classification and retry decisions.
//!
//! | kind | action |
//! |------|--------|
//! | `TransientInfrastructure` | back off and retry, counted against `max_attempts` |
//! | `StaleSequenceToken` | adopt the backend token, retry immediately, not counted |
//! | `ResourceMissing` | create group/stream, retry immediately, not counted |
//! | `RejectedMalformed` | abandon the batch |
//! | `BufferOverflow` | never produced by a delivery; eviction happens at intake |
//!
//! Uncounted retries are still capped at `max_attempts` per batch so a stream
//! shared with another writer cannot keep a batch cycling forever.

use std::time::Duration;

use crate::batch::Batch;
use crate::client::{error_codes, ClientError};
use crate::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_RETRY_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientInfrastructure,
    StaleSequenceToken,
    ResourceMissing,
    RejectedMalformed,
    BufferOverflow,
}

/// Maps a backend error to its taxonomy kind.
///
/// Unknown codes fall back on the HTTP status: a 4xx other than 429 means the
/// request itself was refused, anything else is assumed to be transient.
#[must_use]
pub fn classify(error: &ClientError) -> ErrorKind {
    match error.code.as_str() {
        error_codes::INVALID_SEQUENCE_TOKEN | error_codes::DATA_ALREADY_ACCEPTED => {
            ErrorKind::StaleSequenceToken
        }
        error_codes::RESOURCE_NOT_FOUND => ErrorKind::ResourceMissing,
        error_codes::INVALID_PARAMETER
        | error_codes::SERIALIZATION
        | error_codes::UNRECOGNIZED_CLIENT
        | error_codes::ACCESS_DENIED => ErrorKind::RejectedMalformed,
        error_codes::THROTTLING
        | error_codes::LIMIT_EXCEEDED
        | error_codes::SERVICE_UNAVAILABLE
        | error_codes::OPERATION_ABORTED
        | error_codes::NETWORK => ErrorKind::TransientInfrastructure,
        _ => match error.status {
            Some(status) if (400..500).contains(&status) && status != 429 => {
                ErrorKind::RejectedMalformed
            }
            _ => ErrorKind::TransientInfrastructure,
        },
    }
}

/// What the delivery loop does next with a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry immediately without consuming the attempt budget.
    RetryNow,
    /// Wait, then retry as the next counted attempt.
    RetryAfter(Duration),
    Abandon,
}

/// Bookkeeping for one batch while it is being delivered.
#[derive(Debug)]
pub struct DeliveryAttempt<'a> {
    pub batch: &'a Batch,
    /// Counted attempts made so far, starting at 1 for the first call.
    pub attempt_number: u8,
    pub corrective_retries: u8,
    pub last_error: Option<ClientError>,
}

impl<'a> DeliveryAttempt<'a> {
    #[must_use]
    pub fn new(batch: &'a Batch) -> Self {
        DeliveryAttempt {
            batch,
            attempt_number: 1,
            corrective_retries: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u8,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u8, backoff_base: Duration, backoff_max: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    #[must_use]
    pub fn decide(&self, kind: ErrorKind, attempt: &DeliveryAttempt<'_>) -> RetryDecision {
        match kind {
            ErrorKind::TransientInfrastructure => {
                if attempt.attempt_number >= self.max_attempts {
                    RetryDecision::Abandon
                } else {
                    RetryDecision::RetryAfter(self.backoff(attempt.attempt_number))
                }
            }
            ErrorKind::StaleSequenceToken | ErrorKind::ResourceMissing => {
                if attempt.corrective_retries >= self.max_attempts {
                    RetryDecision::Abandon
                } else {
                    RetryDecision::RetryNow
                }
            }
            ErrorKind::RejectedMalformed | ErrorKind::BufferOverflow => RetryDecision::Abandon,
        }
    }

    /// Delay after the given failed attempt: `base * 2^(attempt - 1)`, capped.
    #[must_use]
    pub fn backoff(&self, attempt_number: u8) -> Duration {
        let exponent = u32::from(attempt_number.saturating_sub(1)).min(31);
        self.backoff_base
            .saturating_mul(2_u32.pow(exponent))
            .min(self.backoff_max)
    }
}
