// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

use crate::batch::BatchLimits;
use crate::client::{LogsClient, StreamDestination};
use crate::config::SinkOptions;
use crate::delivery::{DeliveryLoop, DeliveryLoopConfig};
use crate::errors::SinkError;
use crate::event::LogEvent;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::queue::EventQueue;
use crate::retry::RetryPolicy;
use crate::scheduler::{FlushScheduler, IntervalScheduler};
use crate::sequence::SequenceCoordinator;

/// Cheap, cloneable producer side of a sink.
#[derive(Clone)]
pub struct SinkHandle {
    queue: Arc<EventQueue>,
    metrics: Arc<SinkMetrics>,
    minimum_level: Level,
}

impl SinkHandle {
    /// Queues one rendered event. Never blocks on the network; a full queue
    /// evicts its oldest event.
    pub fn emit(&self, timestamp: DateTime<Utc>, message: impl Into<String>) {
        self.queue.append(LogEvent::new(timestamp, message));
    }

    pub fn emit_event(&self, event: LogEvent) {
        self.queue.append(event);
    }

    #[must_use]
    pub fn is_enabled(&self, level: Level) -> bool {
        level <= self.minimum_level
    }

    /// Asks the delivery task to flush now instead of waiting for the period.
    pub fn flush(&self) {
        self.queue.request_flush();
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// A log sink bound to one CloudWatch log stream, with its own background
/// delivery task.
pub struct CloudWatchLogSink {
    handle: SinkHandle,
    destination: StreamDestination,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CloudWatchLogSink {
    /// Validates `options` and spawns the delivery task on the current tokio
    /// runtime, flushing every `options.flush_period`.
    pub fn new(options: SinkOptions, client: Arc<dyn LogsClient>) -> Result<Self, SinkError> {
        // the interval panics on a zero period or outside a runtime
        options.validate()?;
        let runtime = current_runtime()?;
        let scheduler = IntervalScheduler::new(options.flush_period);
        Ok(Self::spawn(options, client, scheduler, &runtime))
    }

    pub fn with_scheduler<S>(
        options: SinkOptions,
        client: Arc<dyn LogsClient>,
        scheduler: S,
    ) -> Result<Self, SinkError>
    where
        S: FlushScheduler + 'static,
    {
        options.validate()?;
        let runtime = current_runtime()?;
        Ok(Self::spawn(options, client, scheduler, &runtime))
    }

    /// Expects `options` to be validated.
    fn spawn<S>(
        options: SinkOptions,
        client: Arc<dyn LogsClient>,
        scheduler: S,
        runtime: &tokio::runtime::Handle,
    ) -> Self
    where
        S: FlushScheduler + 'static,
    {
        let destination = StreamDestination::new(
            options.log_group_name.clone(),
            options.log_stream_name_provider.log_stream_name(),
        );
        let metrics = Arc::new(SinkMetrics::default());
        let queue = Arc::new(EventQueue::new(
            options.queue_size_limit,
            options.flush_threshold(),
            Arc::clone(&metrics),
        ));

        let delivery = DeliveryLoop::new(DeliveryLoopConfig {
            queue: Arc::clone(&queue),
            client,
            sequence: SequenceCoordinator::new(
                destination.clone(),
                options.create_log_group,
                options.log_group_retention_days,
            ),
            retry_policy: RetryPolicy::new(
                options.retry_attempts,
                options.backoff_base,
                options.backoff_max,
            ),
            limits: BatchLimits::with_batch_size_limit(options.batch_size_limit),
            metrics: Arc::clone(&metrics),
        });

        let cancel = CancellationToken::new();
        let task = runtime.spawn(delivery.run(
            scheduler,
            cancel.clone(),
            options.shutdown_grace_period,
        ));
        debug!("CLOUDWATCH | Sink created for {}", destination);

        CloudWatchLogSink {
            handle: SinkHandle {
                queue,
                metrics,
                minimum_level: options.minimum_level,
            },
            destination,
            cancel,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    pub fn emit(&self, timestamp: DateTime<Utc>, message: impl Into<String>) {
        self.handle.emit(timestamp, message);
    }

    #[must_use]
    pub fn is_enabled(&self, level: Level) -> bool {
        self.handle.is_enabled(level)
    }

    pub fn flush(&self) {
        self.handle.flush();
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.handle.metrics()
    }

    #[must_use]
    pub fn destination(&self) -> &StreamDestination {
        &self.destination
    }

    /// Stops the delivery task after its final flush and returns the sink's
    /// lifetime counters. Takes at most the configured grace period; a batch
    /// still in flight at the deadline is abandoned and counted as dropped.
    pub async fn shutdown(mut self) -> Result<MetricsSnapshot, SinkError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| SinkError::Runtime(e.to_string()))?;
        }
        Ok(self.handle.metrics())
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, SinkError> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| SinkError::Runtime(format!("no tokio runtime available: {e}")))
}

impl Drop for CloudWatchLogSink {
    fn drop(&mut self) {
        // the task still makes its final flush, but nobody waits for it
        self.cancel.cancel();
    }
}
