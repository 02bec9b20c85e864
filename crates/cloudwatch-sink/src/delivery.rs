// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-destination delivery loop.
//!
//! # State machine
//!
//! ```text
//!   Idle ──tick / threshold──> Flushing ──> Succeeded ──> Idle
//!                                 │  ▲
//!                                 v  │
//!                              Retrying ──> Abandoned ──> Idle
//! ```
//!
//! The loop owns its [`SequenceCoordinator`] and every delivery takes
//! `&mut self`, so a second `PutLogEvents` for the same stream can never be
//! issued before the previous one resolved. Producers keep appending to the
//! queue while a flush is in progress; their events wait for the next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch::{Batch, BatchLimits};
use crate::client::{error_codes, ClientError, LogsClient};
use crate::metrics::SinkMetrics;
use crate::queue::EventQueue;
use crate::retry::{classify, DeliveryAttempt, ErrorKind, RetryDecision, RetryPolicy};
use crate::scheduler::FlushScheduler;
use crate::sequence::SequenceCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Flushing,
    Retrying,
    Succeeded,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Abandoned(ErrorKind),
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub batches_sent: usize,
    pub batches_abandoned: usize,
}

pub struct DeliveryLoopConfig {
    pub queue: Arc<EventQueue>,
    pub client: Arc<dyn LogsClient>,
    pub sequence: SequenceCoordinator,
    pub retry_policy: RetryPolicy,
    pub limits: BatchLimits,
    pub metrics: Arc<SinkMetrics>,
}

pub struct DeliveryLoop {
    queue: Arc<EventQueue>,
    client: Arc<dyn LogsClient>,
    sequence: SequenceCoordinator,
    retry_policy: RetryPolicy,
    limits: BatchLimits,
    metrics: Arc<SinkMetrics>,
    state: FlushState,
    /// Size of the batch `deliver` is working on; survives a cancelled flush.
    in_flight_events: usize,
}

impl DeliveryLoop {
    #[must_use]
    pub fn new(config: DeliveryLoopConfig) -> Self {
        DeliveryLoop {
            queue: config.queue,
            client: config.client,
            sequence: config.sequence,
            retry_policy: config.retry_policy,
            limits: config.limits,
            metrics: config.metrics,
            state: FlushState::Idle,
            in_flight_events: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlushState {
        self.state
    }

    #[must_use]
    pub fn sequence(&self) -> &SequenceCoordinator {
        &self.sequence
    }

    /// Drives flush cycles until `cancel` fires. Shutdown then gets
    /// `grace_period` in total: a cycle already running when `cancel` fires
    /// and the final flush both stop at the same deadline. Whatever is still
    /// queued or in flight at that point is dropped and counted.
    pub async fn run<S: FlushScheduler>(
        mut self,
        mut scheduler: S,
        cancel: CancellationToken,
        grace_period: Duration,
    ) {
        debug!(
            "CLOUDWATCH | Delivery loop started for {}",
            self.sequence.destination()
        );

        let deadline = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Instant::now() + grace_period,
                () = self.queue.flush_requested() => {
                    debug!("CLOUDWATCH | Queue threshold reached, flushing early");
                }
                () = scheduler.tick() => {}
            }

            let flush = self.flush();
            tokio::pin!(flush);
            let interrupted = tokio::select! {
                biased;
                _ = &mut flush => None,
                () = cancel.cancelled() => Some(Instant::now() + grace_period),
            };
            if let Some(deadline) = interrupted {
                debug!("CLOUDWATCH | Shutdown requested during a flush cycle");
                if timeout_at(deadline, &mut flush).await.is_err() {
                    warn!(
                        "CLOUDWATCH | Flush cycle did not finish within {} ms of shutdown",
                        grace_period.as_millis()
                    );
                }
                break deadline;
            }
        };

        if Instant::now() < deadline {
            debug!("CLOUDWATCH | Delivery loop shutting down, final flush");
            if timeout_at(deadline, self.flush()).await.is_err() {
                warn!(
                    "CLOUDWATCH | Final flush did not finish within {} ms",
                    grace_period.as_millis()
                );
            }
        }

        let dropped = self.queue.clear() + std::mem::take(&mut self.in_flight_events);
        if dropped > 0 {
            self.metrics.record_dropped_on_shutdown(dropped);
            warn!("CLOUDWATCH | Dropped {} unsent log events on shutdown", dropped);
        }
        self.state = FlushState::Idle;
        debug!("CLOUDWATCH | Delivery loop stopped");
    }

    /// Delivers batches until the events queued when the cycle started have
    /// all been taken. Events appended meanwhile may ride along in the last
    /// batch; anything beyond waits for the next cycle.
    pub async fn flush(&mut self) -> FlushSummary {
        let mut summary = FlushSummary::default();
        let mut budget = self.queue.len();
        self.state = FlushState::Flushing;

        while budget > 0 {
            let Some(batch) = self.queue.drain(&self.limits) else {
                break;
            };
            budget = budget.saturating_sub(batch.len());
            self.in_flight_events = batch.len();
            let outcome = self.deliver(&batch).await;
            self.in_flight_events = 0;
            match outcome {
                DeliveryOutcome::Sent => summary.batches_sent += 1,
                DeliveryOutcome::Abandoned(_) => summary.batches_abandoned += 1,
            }
            self.state = FlushState::Flushing;
        }

        self.state = FlushState::Idle;
        if summary.batches_sent > 0 || summary.batches_abandoned > 0 {
            debug!(
                "CLOUDWATCH | Flush finished: {} batches sent, {} abandoned",
                summary.batches_sent, summary.batches_abandoned
            );
        }
        summary
    }

    /// Delivers one batch, retrying and repairing as the error kind dictates.
    pub async fn deliver(&mut self, batch: &Batch) -> DeliveryOutcome {
        let mut attempt = DeliveryAttempt::new(batch);

        loop {
            let result = self
                .client
                .put_log_events(
                    self.sequence.destination(),
                    self.sequence.token(),
                    batch.events(),
                )
                .await;

            let error = match result {
                Ok(output) => {
                    self.sequence.record_success(output.next_sequence_token);
                    if let Some(rejected) = output.rejected_log_events_info {
                        warn!(
                            "CLOUDWATCH | Backend rejected some events of the batch: {:?}",
                            rejected
                        );
                    }
                    return self.succeed(batch);
                }
                Err(e) => e,
            };

            let mut kind = classify(&error);
            let mut last_error = None;
            match kind {
                ErrorKind::StaleSequenceToken => {
                    self.sequence.adopt_expected_token(&error);
                    if error.code == error_codes::DATA_ALREADY_ACCEPTED {
                        debug!("CLOUDWATCH | Batch was already accepted by the backend");
                        return self.succeed(batch);
                    }
                }
                ErrorKind::ResourceMissing => {
                    if let Err(creation_error) =
                        self.sequence.ensure_destination(self.client.as_ref()).await
                    {
                        kind = creation_failure_kind(&creation_error);
                        error!(
                            "CLOUDWATCH | Failed to create destination {}: {}",
                            self.sequence.destination(),
                            creation_error
                        );
                        last_error = Some(creation_error);
                    }
                }
                _ => {}
            }
            attempt.last_error = Some(last_error.unwrap_or(error));

            match self.retry_policy.decide(kind, &attempt) {
                RetryDecision::RetryNow => {
                    self.state = FlushState::Retrying;
                    attempt.corrective_retries += 1;
                }
                RetryDecision::RetryAfter(delay) => {
                    self.state = FlushState::Retrying;
                    warn!(
                        "CLOUDWATCH | Attempt {} of {} to {} failed, retrying in {} ms: {}",
                        attempt.attempt_number,
                        self.retry_policy.max_attempts(),
                        self.sequence.destination(),
                        delay.as_millis(),
                        attempt
                            .last_error
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default()
                    );
                    sleep(delay).await;
                    attempt.attempt_number = attempt.attempt_number.saturating_add(1);
                }
                RetryDecision::Abandon => return self.abandon(kind, &attempt),
            }
        }
    }

    fn succeed(&mut self, batch: &Batch) -> DeliveryOutcome {
        self.metrics.record_batch_sent(batch.len());
        self.state = FlushState::Succeeded;
        debug!(
            "CLOUDWATCH | Sent {} events ({} bytes) to {}",
            batch.len(),
            batch.size_bytes(),
            self.sequence.destination()
        );
        DeliveryOutcome::Sent
    }

    fn abandon(&mut self, kind: ErrorKind, attempt: &DeliveryAttempt<'_>) -> DeliveryOutcome {
        self.metrics.record_batch_abandoned();
        self.state = FlushState::Abandoned;
        error!(
            "CLOUDWATCH | Dropping batch of {} events for {} after {} attempts ({:?}): {}",
            attempt.batch.len(),
            self.sequence.destination(),
            attempt.attempt_number,
            kind,
            attempt
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
        DeliveryOutcome::Abandoned(kind)
    }
}

/// A transient creation failure is retried like a transient delivery
/// failure. Anything else cannot be repaired by retrying, including a
/// missing log group this sink is not allowed to create.
fn creation_failure_kind(creation_error: &ClientError) -> ErrorKind {
    match classify(creation_error) {
        ErrorKind::TransientInfrastructure => ErrorKind::TransientInfrastructure,
        _ => ErrorKind::RejectedMalformed,
    }
}
