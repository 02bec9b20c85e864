// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sources of periodic flush ticks.
//!
//! The delivery loop only ever awaits [`FlushScheduler::tick`], so tests can
//! swap the wall-clock [`IntervalScheduler`] for a [`ManualScheduler`] and
//! decide exactly when a period elapses.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[async_trait]
pub trait FlushScheduler: Send {
    /// Resolves when the next periodic flush is due.
    async fn tick(&mut self);
}

/// Ticks every `period`, first tick one period after creation.
#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalScheduler { interval }
    }
}

#[async_trait]
impl FlushScheduler for IntervalScheduler {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticks only when its [`ManualTicker`] says so.
#[derive(Debug)]
pub struct ManualScheduler {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug, Clone)]
pub struct ManualTicker {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> (Self, ManualTicker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManualScheduler { rx }, ManualTicker { tx })
    }
}

impl ManualTicker {
    /// Makes one period elapse. Returns `false` once the scheduler is gone.
    pub fn tick(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl FlushScheduler for ManualScheduler {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // every ticker dropped: no more periods will elapse
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_interval_first_tick_after_one_period() {
        let mut scheduler = IntervalScheduler::new(Duration::from_secs(10));
        let start = Instant::now();

        scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_ticks_on_demand() {
        let (mut scheduler, ticker) = ManualScheduler::new();

        assert!(timeout(Duration::from_secs(60), scheduler.tick())
            .await
            .is_err());

        assert!(ticker.tick());
        assert!(timeout(Duration::from_secs(1), scheduler.tick())
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_without_ticker_never_ticks() {
        let (mut scheduler, ticker) = ManualScheduler::new();
        drop(ticker);

        assert!(timeout(Duration::from_secs(60), scheduler.tick())
            .await
            .is_err());
    }

    #[test]
    fn test_ticker_reports_closed_scheduler() {
        let (scheduler, ticker) = ManualScheduler::new();
        drop(scheduler);
        assert!(!ticker.tick());
    }
}
