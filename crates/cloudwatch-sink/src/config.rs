// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::Level;

use crate::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_BATCH_SIZE_LIMIT, DEFAULT_FLUSH_PERIOD,
    DEFAULT_QUEUE_SIZE_LIMIT, DEFAULT_RETRY_ATTEMPTS, DEFAULT_SHUTDOWN_GRACE_PERIOD,
    MAX_BATCH_EVENTS, VALID_RETENTION_DAYS,
};
use crate::errors::SinkError;
use crate::stream_name::LogStreamNameProvider;

/// Options for a single CloudWatch log sink.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Log group the sink writes to. Required.
    pub log_group_name: String,
    pub log_stream_name_provider: LogStreamNameProvider,
    /// Lowest level the host should forward; see [`SinkOptions::is_enabled`].
    pub minimum_level: Level,
    /// Maximum number of events per `PutLogEvents` call.
    pub batch_size_limit: usize,
    /// How often queued events are flushed.
    pub flush_period: Duration,
    /// Queue length that triggers a flush before the period elapses.
    /// Defaults to `batch_size_limit`.
    pub flush_threshold: Option<usize>,
    /// Events held in memory before the oldest are evicted.
    pub queue_size_limit: usize,
    /// Attempts per batch for transient failures.
    pub retry_attempts: u8,
    pub create_log_group: bool,
    /// Retention applied to a log group this sink creates.
    pub log_group_retention_days: Option<u32>,
    pub shutdown_grace_period: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            log_group_name: String::new(),
            log_stream_name_provider: LogStreamNameProvider::Default,
            minimum_level: Level::INFO,
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            flush_period: DEFAULT_FLUSH_PERIOD,
            flush_threshold: None,
            queue_size_limit: DEFAULT_QUEUE_SIZE_LIMIT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            create_log_group: true,
            log_group_retention_days: None,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl SinkOptions {
    pub fn new(log_group_name: impl Into<String>) -> Self {
        Self {
            log_group_name: log_group_name.into(),
            ..Default::default()
        }
    }

    /// Create options from `CLOUDWATCH_*` environment variables
    pub fn from_env() -> Result<Self, SinkError> {
        let defaults = Self::default();

        let log_group_name = env::var("CLOUDWATCH_LOG_GROUP").unwrap_or_default();
        let log_stream_name_provider = env::var("CLOUDWATCH_LOG_STREAM")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .map_or(LogStreamNameProvider::Default, LogStreamNameProvider::Constant);
        let minimum_level = env::var("CLOUDWATCH_MINIMUM_LEVEL")
            .ok()
            .and_then(|level| Level::from_str(&level).ok())
            .unwrap_or(defaults.minimum_level);
        let batch_size_limit = parse_env("CLOUDWATCH_BATCH_SIZE_LIMIT")
            .unwrap_or(defaults.batch_size_limit);
        let flush_period = parse_env("CLOUDWATCH_FLUSH_PERIOD_SECS")
            .map_or(defaults.flush_period, Duration::from_secs);
        let queue_size_limit =
            parse_env("CLOUDWATCH_QUEUE_LIMIT").unwrap_or(defaults.queue_size_limit);
        let retry_attempts =
            parse_env("CLOUDWATCH_RETRY_ATTEMPTS").unwrap_or(defaults.retry_attempts);
        let create_log_group = env::var("CLOUDWATCH_CREATE_LOG_GROUP")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.create_log_group);
        let log_group_retention_days = parse_env("CLOUDWATCH_LOG_GROUP_RETENTION_DAYS");
        let shutdown_grace_period = parse_env("CLOUDWATCH_SHUTDOWN_GRACE_SECS")
            .map_or(defaults.shutdown_grace_period, Duration::from_secs);

        let options = Self {
            log_group_name,
            log_stream_name_provider,
            minimum_level,
            batch_size_limit,
            flush_period,
            queue_size_limit,
            retry_attempts,
            create_log_group,
            log_group_retention_days,
            shutdown_grace_period,
            ..defaults
        };

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.log_group_name.trim().is_empty() {
            return Err(SinkError::InvalidConfig(
                "log group name is required".to_string(),
            ));
        }

        if let LogStreamNameProvider::Constant(name) = &self.log_stream_name_provider {
            if name.trim().is_empty() {
                return Err(SinkError::InvalidConfig(
                    "log stream name cannot be empty".to_string(),
                ));
            }
        }

        if self.batch_size_limit == 0 || self.batch_size_limit > MAX_BATCH_EVENTS {
            return Err(SinkError::InvalidConfig(format!(
                "batch size limit must be between 1 and {MAX_BATCH_EVENTS}, got {}",
                self.batch_size_limit
            )));
        }

        if self.flush_period.is_zero() {
            return Err(SinkError::InvalidConfig(
                "flush period must be greater than 0".to_string(),
            ));
        }

        if self.queue_size_limit < self.batch_size_limit {
            return Err(SinkError::InvalidConfig(format!(
                "queue size limit ({}) must be at least the batch size limit ({})",
                self.queue_size_limit, self.batch_size_limit
            )));
        }

        if self.flush_threshold == Some(0) {
            return Err(SinkError::InvalidConfig(
                "flush threshold must be greater than 0".to_string(),
            ));
        }

        if self.retry_attempts == 0 {
            return Err(SinkError::InvalidConfig(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        if let Some(days) = self.log_group_retention_days {
            if !VALID_RETENTION_DAYS.contains(&days) {
                return Err(SinkError::InvalidConfig(format!(
                    "invalid log group retention of {days} days"
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold.unwrap_or(self.batch_size_limit)
    }

    /// Whether an event at `level` passes the configured minimum.
    #[must_use]
    pub fn is_enabled(&self, level: Level) -> bool {
        // tracing orders levels by verbosity: TRACE > DEBUG > ... > ERROR
        level <= self.minimum_level
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: [&str; 10] = [
        "CLOUDWATCH_LOG_GROUP",
        "CLOUDWATCH_LOG_STREAM",
        "CLOUDWATCH_MINIMUM_LEVEL",
        "CLOUDWATCH_BATCH_SIZE_LIMIT",
        "CLOUDWATCH_FLUSH_PERIOD_SECS",
        "CLOUDWATCH_QUEUE_LIMIT",
        "CLOUDWATCH_RETRY_ATTEMPTS",
        "CLOUDWATCH_CREATE_LOG_GROUP",
        "CLOUDWATCH_LOG_GROUP_RETENTION_DAYS",
        "CLOUDWATCH_SHUTDOWN_GRACE_SECS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let options = SinkOptions::new("app");
        assert!(options.validate().is_ok());
        assert_eq!(options.batch_size_limit, 100);
        assert_eq!(options.flush_period, Duration::from_secs(10));
        assert_eq!(options.retry_attempts, 5);
        assert!(options.create_log_group);
        assert_eq!(options.flush_threshold(), 100);
    }

    #[test]
    fn test_validate_requires_log_group() {
        assert!(SinkOptions::default().validate().is_err());
        assert!(SinkOptions::new("   ").validate().is_err());
    }

    #[test]
    fn test_validate_empty_constant_stream() {
        let options = SinkOptions {
            log_stream_name_provider: LogStreamNameProvider::constant(""),
            ..SinkOptions::new("app")
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_batch_size_limit_range() {
        for limit in [0, MAX_BATCH_EVENTS + 1] {
            let options = SinkOptions {
                batch_size_limit: limit,
                queue_size_limit: MAX_BATCH_EVENTS * 2,
                ..SinkOptions::new("app")
            };
            assert!(options.validate().is_err(), "limit {limit} should be rejected");
        }
    }

    #[test]
    fn test_validate_queue_smaller_than_batch() {
        let options = SinkOptions {
            batch_size_limit: 100,
            queue_size_limit: 50,
            ..SinkOptions::new("app")
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_zero_period_and_attempts() {
        let zero_period = SinkOptions {
            flush_period: Duration::ZERO,
            ..SinkOptions::new("app")
        };
        let zero_attempts = SinkOptions {
            retry_attempts: 0,
            ..SinkOptions::new("app")
        };
        assert!(zero_period.validate().is_err());
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn test_validate_retention_days() {
        let valid = SinkOptions {
            log_group_retention_days: Some(14),
            ..SinkOptions::new("app")
        };
        let invalid = SinkOptions {
            log_group_retention_days: Some(15),
            ..SinkOptions::new("app")
        };
        assert!(valid.validate().is_ok());
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_is_enabled() {
        let options = SinkOptions {
            minimum_level: Level::WARN,
            ..SinkOptions::new("app")
        };
        assert!(options.is_enabled(Level::ERROR));
        assert!(options.is_enabled(Level::WARN));
        assert!(!options.is_enabled(Level::INFO));
        assert!(!options.is_enabled(Level::TRACE));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("CLOUDWATCH_LOG_GROUP", "from-env");
        env::set_var("CLOUDWATCH_LOG_STREAM", "stream-1");
        env::set_var("CLOUDWATCH_BATCH_SIZE_LIMIT", "250");
        env::set_var("CLOUDWATCH_FLUSH_PERIOD_SECS", "3");
        env::set_var("CLOUDWATCH_CREATE_LOG_GROUP", "FALSE");
        env::set_var("CLOUDWATCH_MINIMUM_LEVEL", "debug");
        env::set_var("CLOUDWATCH_LOG_GROUP_RETENTION_DAYS", "30");

        let options = SinkOptions::from_env().unwrap();

        assert_eq!(options.log_group_name, "from-env");
        assert_eq!(options.log_stream_name_provider.log_stream_name(), "stream-1");
        assert_eq!(options.batch_size_limit, 250);
        assert_eq!(options.flush_period, Duration::from_secs(3));
        assert!(!options.create_log_group);
        assert_eq!(options.minimum_level, Level::DEBUG);
        assert_eq!(options.log_group_retention_days, Some(30));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_malformed_numbers_fall_back() {
        clear_env();
        env::set_var("CLOUDWATCH_LOG_GROUP", "from-env");
        env::set_var("CLOUDWATCH_BATCH_SIZE_LIMIT", "lots");
        env::set_var("CLOUDWATCH_RETRY_ATTEMPTS", "-1");

        let options = SinkOptions::from_env().unwrap();

        assert_eq!(options.batch_size_limit, DEFAULT_BATCH_SIZE_LIMIT);
        assert_eq!(options.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert!(matches!(
            options.log_stream_name_provider,
            LogStreamNameProvider::Default
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_log_group() {
        clear_env();
        assert!(SinkOptions::from_env().is_err());
    }
}
