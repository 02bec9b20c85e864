// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching, sequencing and delivery of log events to CloudWatch Logs.
//!
//! Producers append pre-rendered `(timestamp, message)` pairs to a bounded
//! in-memory queue. A single background task per sink drains the queue into
//! batches that respect the backend limits and delivers them, one at a time,
//! to exactly one log stream.
//!
//! ```text
//!   producers ──> EventQueue ──> BatchBuilder ──> DeliveryLoop ──> LogsClient
//!                                                  │      │
//!                                        RetryPolicy      SequenceCoordinator
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod errors;
pub mod event;
pub mod http_client;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod sequence;
pub mod sink;
pub mod stream_name;

pub use client::{ClientError, LogsClient, PutLogEventsOutput, StreamDestination};
pub use config::SinkOptions;
pub use errors::SinkError;
pub use event::LogEvent;
pub use metrics::MetricsSnapshot;
pub use sink::{CloudWatchLogSink, SinkHandle};
pub use stream_name::LogStreamNameProvider;
