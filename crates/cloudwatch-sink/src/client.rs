// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the remote log-storage service.

use async_trait::async_trait;
use derive_more::Display;

use crate::event::LogEvent;

/// Service error codes the delivery engine reacts to.
pub mod error_codes {
    pub const INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";
    pub const DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
    pub const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";
    pub const INVALID_PARAMETER: &str = "InvalidParameterException";
    pub const UNRECOGNIZED_CLIENT: &str = "UnrecognizedClientException";
    pub const ACCESS_DENIED: &str = "AccessDeniedException";
    pub const SERIALIZATION: &str = "SerializationException";
    pub const THROTTLING: &str = "ThrottlingException";
    pub const LIMIT_EXCEEDED: &str = "LimitExceededException";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailableException";
    pub const OPERATION_ABORTED: &str = "OperationAbortedException";
    pub const NETWORK: &str = "NetworkError";
}

/// The (group, stream) pair a sink writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{log_group_name}/{log_stream_name}")]
pub struct StreamDestination {
    pub log_group_name: String,
    pub log_stream_name: String,
}

impl StreamDestination {
    pub fn new(log_group_name: impl Into<String>, log_stream_name: impl Into<String>) -> Self {
        StreamDestination {
            log_group_name: log_group_name.into(),
            log_stream_name: log_stream_name.into(),
        }
    }
}

/// Structured description of a failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    /// Service error code, e.g. `ThrottlingException`.
    pub code: String,
    pub message: String,
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    /// Token the backend expects next, when it told us.
    pub expected_sequence_token: Option<String>,
}

impl ClientError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError {
            code: code.into(),
            message: message.into(),
            status: None,
            expected_sequence_token: None,
        }
    }

    /// A failure where no response was received (connect, timeout, reset).
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(error_codes::NETWORK, message)
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_expected_sequence_token(mut self, token: impl Into<String>) -> Self {
        self.expected_sequence_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.code == error_codes::RESOURCE_ALREADY_EXISTS
    }
}

/// Indexes of events the backend accepted the batch with but did not store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectedLogEventsInfo {
    pub too_new_log_event_start_index: Option<usize>,
    pub too_old_log_event_end_index: Option<usize>,
    pub expired_log_event_end_index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutLogEventsOutput {
    pub next_sequence_token: Option<String>,
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Operations the delivery engine needs from the log-storage service.
///
/// Create calls report an existing resource as an error with code
/// [`error_codes::RESOURCE_ALREADY_EXISTS`]; callers decide whether that is
/// acceptable.
#[async_trait]
pub trait LogsClient: Send + Sync {
    async fn put_log_events(
        &self,
        destination: &StreamDestination,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<PutLogEventsOutput, ClientError>;

    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ClientError>;

    async fn create_log_stream(&self, destination: &StreamDestination) -> Result<(), ClientError>;

    async fn put_retention_policy(
        &self,
        log_group_name: &str,
        retention_in_days: u32,
    ) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        let destination = StreamDestination::new("app", "instance-1");
        assert_eq!(destination.to_string(), "app/instance-1");
    }

    #[test]
    fn test_client_error_display() {
        let error = ClientError::new(error_codes::THROTTLING, "Rate exceeded").with_status(400);
        assert_eq!(error.to_string(), "ThrottlingException: Rate exceeded");
        assert_eq!(error.status, Some(400));
    }

    #[test]
    fn test_already_exists() {
        assert!(ClientError::new(error_codes::RESOURCE_ALREADY_EXISTS, "exists").is_already_exists());
        assert!(!ClientError::network("connection reset").is_already_exists());
    }
}
