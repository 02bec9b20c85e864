// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogsClient`] speaking the CloudWatch Logs JSON 1.1 protocol over HTTP.
//!
//! Requests are sent unsigned. Point `endpoint` at a signing proxy or a local
//! emulator; credential handling lives outside this crate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client::{
    error_codes, ClientError, LogsClient, PutLogEventsOutput, RejectedLogEventsInfo, StreamDestination,
};
use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::event::LogEvent;

const TARGET_HEADER: &str = "X-Amz-Target";
const TARGET_PREFIX: &str = "Logs_20140328";
const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL requests are posted to, e.g. `https://logs.us-east-1.amazonaws.com`.
    pub endpoint: String,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl HttpClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpClientConfig {
            endpoint: endpoint.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputLogEvent<'a> {
    timestamp: i64,
    message: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: Vec<InputLogEvent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutRetentionPolicyRequest<'a> {
    log_group_name: &'a str,
    retention_in_days: u32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
    rejected_log_events_info: Option<RejectedLogEventsResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectedLogEventsResponse {
    too_new_log_event_start_index: Option<usize>,
    too_old_log_event_end_index: Option<usize>,
    expired_log_event_end_index: Option<usize>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    expected_sequence_token: Option<String>,
}

pub struct HttpLogsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogsClient {
    /// An unparsable proxy is logged and skipped; requests then go direct.
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy_url) = config.https_proxy.as_deref() {
            match reqwest::Proxy::https(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => error!(
                    "CLOUDWATCH | Invalid HTTPS proxy {}: {}, connecting directly",
                    proxy_url, e
                ),
            }
        }
        let client = builder.build().unwrap_or_else(|e| {
            error!(
                "CLOUDWATCH | Unable to build HTTP client: {}, using reqwest defaults",
                e
            );
            reqwest::Client::new()
        });

        HttpLogsClient {
            client,
            endpoint: config.endpoint,
        }
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        body: &T,
    ) -> Result<Vec<u8>, ClientError> {
        let payload = serde_json::to_vec(body).map_err(|e| {
            ClientError::new(
                error_codes::SERIALIZATION,
                format!("failed to encode {operation} request: {e}"),
            )
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(TARGET_HEADER, format!("{TARGET_PREFIX}.{operation}"))
            .header(CONTENT_TYPE, AMZ_JSON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| ClientError::network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::network(e.to_string()))?;

        if status.is_success() {
            debug!("CLOUDWATCH | {} succeeded with status {}", operation, status);
            return Ok(bytes.to_vec());
        }

        Err(parse_error(status.as_u16(), &bytes))
    }
}

/// Builds a [`ClientError`] from a JSON 1.1 error body. Codes may arrive
/// namespaced, e.g. `com.amazonaws.logs#ThrottlingException`.
fn parse_error(status: u16, body: &[u8]) -> ClientError {
    let parsed: ErrorResponse = serde_json::from_slice(body).unwrap_or_default();
    let code = parsed
        .error_type
        .as_deref()
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| format!("HttpStatus{status}"));
    let message = parsed
        .message
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    let mut error = ClientError::new(code, message).with_status(status);
    if let Some(token) = parsed.expected_sequence_token {
        error = error.with_expected_sequence_token(token);
    }
    error
}

#[async_trait]
impl LogsClient for HttpLogsClient {
    async fn put_log_events(
        &self,
        destination: &StreamDestination,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<PutLogEventsOutput, ClientError> {
        let request = PutLogEventsRequest {
            log_group_name: &destination.log_group_name,
            log_stream_name: &destination.log_stream_name,
            log_events: events
                .iter()
                .map(|event| InputLogEvent {
                    timestamp: event.timestamp_millis(),
                    message: event.message(),
                })
                .collect(),
            sequence_token,
        };

        let body = self.call("PutLogEvents", &request).await?;
        // an empty body is a valid reply from some emulators
        let response: PutLogEventsResponse = if body.is_empty() {
            PutLogEventsResponse::default()
        } else {
            serde_json::from_slice(&body).map_err(|e| {
                ClientError::new(
                    error_codes::SERIALIZATION,
                    format!("failed to decode PutLogEvents response: {e}"),
                )
            })?
        };

        Ok(PutLogEventsOutput {
            next_sequence_token: response.next_sequence_token,
            rejected_log_events_info: response.rejected_log_events_info.map(|info| {
                RejectedLogEventsInfo {
                    too_new_log_event_start_index: info.too_new_log_event_start_index,
                    too_old_log_event_end_index: info.too_old_log_event_end_index,
                    expired_log_event_end_index: info.expired_log_event_end_index,
                }
            }),
        })
    }

    async fn create_log_group(&self, log_group_name: &str) -> Result<(), ClientError> {
        self.call("CreateLogGroup", &CreateLogGroupRequest { log_group_name })
            .await
            .map(|_| ())
    }

    async fn create_log_stream(&self, destination: &StreamDestination) -> Result<(), ClientError> {
        let request = CreateLogStreamRequest {
            log_group_name: &destination.log_group_name,
            log_stream_name: &destination.log_stream_name,
        };
        self.call("CreateLogStream", &request).await.map(|_| ())
    }

    async fn put_retention_policy(
        &self,
        log_group_name: &str,
        retention_in_days: u32,
    ) -> Result<(), ClientError> {
        let request = PutRetentionPolicyRequest {
            log_group_name,
            retention_in_days,
        };
        self.call("PutRetentionPolicy", &request).await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> HttpLogsClient {
        HttpLogsClient::new(HttpClientConfig {
            endpoint: server.url(),
            timeout: Duration::from_secs(5),
            https_proxy: None,
        })
    }

    fn destination() -> StreamDestination {
        StreamDestination::new("app", "instance-1")
    }

    #[tokio::test]
    async fn test_put_log_events_request_shape() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("X-Amz-Target", "Logs_20140328.PutLogEvents")
            .match_header("Content-Type", "application/x-amz-json-1.1")
            .match_body(Matcher::Json(json!({
                "logGroupName": "app",
                "logStreamName": "instance-1",
                "logEvents": [
                    {"timestamp": 1_700_000_000_000_i64, "message": "first"},
                    {"timestamp": 1_700_000_000_500_i64, "message": "second"}
                ],
                "sequenceToken": "token-1"
            })))
            .with_status(200)
            .with_body(r#"{"nextSequenceToken":"token-2"}"#)
            .create_async()
            .await;

        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let events = vec![
            LogEvent::new(start, "first"),
            LogEvent::new(start + chrono::Duration::milliseconds(500), "second"),
        ];

        let output = client_for(&server)
            .put_log_events(&destination(), Some("token-1"), &events)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(output.next_sequence_token.as_deref(), Some("token-2"));
        assert_eq!(output.rejected_log_events_info, None);
    }

    #[tokio::test]
    async fn test_put_log_events_without_token_omits_field() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::Json(json!({
                "logGroupName": "app",
                "logStreamName": "instance-1",
                "logEvents": [{"timestamp": 0, "message": "m"}]
            })))
            .with_status(200)
            .with_body(
                r#"{"nextSequenceToken":"t","rejectedLogEventsInfo":{"tooOldLogEventEndIndex":0}}"#,
            )
            .create_async()
            .await;

        let events = vec![LogEvent::new(Utc.timestamp_millis_opt(0).unwrap(), "m")];
        let output = client_for(&server)
            .put_log_events(&destination(), None, &events)
            .await
            .unwrap();

        mock.assert_async().await;
        let rejected = output.rejected_log_events_info.unwrap();
        assert_eq!(rejected.too_old_log_event_end_index, Some(0));
        assert_eq!(rejected.too_new_log_event_start_index, None);
    }

    #[tokio::test]
    async fn test_error_body_is_mapped() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_body(
                r#"{"__type":"com.amazonaws.logs#InvalidSequenceTokenException","message":"The given sequenceToken is invalid","expectedSequenceToken":"49590"}"#,
            )
            .create_async()
            .await;

        let error = client_for(&server)
            .put_log_events(&destination(), Some("stale"), &[])
            .await
            .unwrap_err();

        assert_eq!(error.code, error_codes::INVALID_SEQUENCE_TOKEN);
        assert_eq!(error.status, Some(400));
        assert_eq!(error.expected_sequence_token.as_deref(), Some("49590"));
    }

    #[tokio::test]
    async fn test_capitalized_message_is_accepted() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_header("X-Amz-Target", "Logs_20140328.CreateLogGroup")
            .with_status(400)
            .with_body(r#"{"__type":"ResourceAlreadyExistsException","Message":"exists"}"#)
            .create_async()
            .await;

        let error = client_for(&server)
            .create_log_group("app")
            .await
            .unwrap_err();

        assert!(error.is_already_exists());
        assert_eq!(error.message, "exists");
    }

    #[tokio::test]
    async fn test_non_json_error_keeps_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let error = client_for(&server)
            .create_log_stream(&destination())
            .await
            .unwrap_err();

        assert_eq!(error.code, "HttpStatus503");
        assert_eq!(error.message, "upstream unavailable");
        assert_eq!(error.status, Some(503));
    }

    #[tokio::test]
    async fn test_create_and_retention_requests() {
        let mut server = Server::new_async().await;
        let stream = server
            .mock("POST", "/")
            .match_header("X-Amz-Target", "Logs_20140328.CreateLogStream")
            .match_body(Matcher::Json(json!({
                "logGroupName": "app",
                "logStreamName": "instance-1"
            })))
            .with_status(200)
            .create_async()
            .await;
        let retention = server
            .mock("POST", "/")
            .match_header("X-Amz-Target", "Logs_20140328.PutRetentionPolicy")
            .match_body(Matcher::Json(json!({
                "logGroupName": "app",
                "retentionInDays": 14
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server);
        client.create_log_stream(&destination()).await.unwrap();
        client.put_retention_policy("app", 14).await.unwrap();

        stream.assert_async().await;
        retention.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = HttpLogsClient::new(HttpClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
            https_proxy: None,
        });

        let error = client.create_log_group("app").await.unwrap_err();

        assert_eq!(error.code, error_codes::NETWORK);
        assert_eq!(error.status, None);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_invalid_proxy_falls_back_to_direct_connection() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("X-Amz-Target", "Logs_20140328.CreateLogGroup")
            .with_status(200)
            .create_async()
            .await;
        let client = HttpLogsClient::new(HttpClientConfig {
            endpoint: server.url(),
            timeout: Duration::from_secs(5),
            https_proxy: Some("not a url".to_string()),
        });

        client.create_log_group("app").await.unwrap();

        mock.assert_async().await;
        assert!(logs_contain("Invalid HTTPS proxy"));
    }
}
