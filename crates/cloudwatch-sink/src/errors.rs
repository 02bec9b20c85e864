// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced to the host when building or stopping a sink.
///
/// Delivery failures are never returned here; they are reported through
/// [`crate::metrics::MetricsSnapshot`] and the `tracing` output.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sink runtime error: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SinkError::InvalidConfig("log group name is required".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: log group name is required"
        );
    }

    #[test]
    fn test_runtime_display() {
        let error = SinkError::Runtime("task panicked".to_string());
        assert_eq!(error.to_string(), "Sink runtime error: task panicked");
    }
}
