// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::client::{ClientError, LogsClient, StreamDestination};

/// Extracts the token from messages such as
/// `The next expected sequenceToken is: 4959...` or
/// `The next batch can be sent with sequenceToken: 4959...`.
fn expected_token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"sequenceToken(?: is)?:\s*(\S+)").ok())
        .as_ref()
}

/// Owns the write-ordering token for one destination and repairs the
/// destination when the backend reports it missing.
#[derive(Debug)]
pub struct SequenceCoordinator {
    destination: StreamDestination,
    token: Option<String>,
    create_log_group: bool,
    log_group_retention_days: Option<u32>,
}

impl SequenceCoordinator {
    #[must_use]
    pub fn new(
        destination: StreamDestination,
        create_log_group: bool,
        log_group_retention_days: Option<u32>,
    ) -> Self {
        SequenceCoordinator {
            destination,
            token: None,
            create_log_group,
            log_group_retention_days,
        }
    }

    #[must_use]
    pub fn destination(&self) -> &StreamDestination {
        &self.destination
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn creates_log_group(&self) -> bool {
        self.create_log_group
    }

    pub fn record_success(&mut self, next_sequence_token: Option<String>) {
        self.token = next_sequence_token;
    }

    /// Adopts the token the backend said it expects. A missing or `null`
    /// token in the error means the next call must be sent without one.
    pub fn adopt_expected_token(&mut self, error: &ClientError) {
        let expected = error.expected_sequence_token.clone().or_else(|| {
            expected_token_pattern()
                .and_then(|pattern| pattern.captures(&error.message))
                .and_then(|captures| captures.get(1))
                .map(|token| token.as_str().to_string())
        });
        self.token = expected.filter(|token| token != "null");
        debug!(
            "CLOUDWATCH | Sequence token for {} corrected to {:?}",
            self.destination, self.token
        );
    }

    /// Creates the log group (when allowed) and then the log stream. Either
    /// one already existing counts as success. A fresh stream has no token.
    pub async fn ensure_destination(&mut self, client: &dyn LogsClient) -> Result<(), ClientError> {
        if self.create_log_group {
            match client
                .create_log_group(&self.destination.log_group_name)
                .await
            {
                Ok(()) => {
                    info!(
                        "CLOUDWATCH | Created log group {}",
                        self.destination.log_group_name
                    );
                    self.apply_retention_policy(client).await;
                }
                Err(e) if e.is_already_exists() => {
                    debug!(
                        "CLOUDWATCH | Log group {} already exists",
                        self.destination.log_group_name
                    );
                }
                Err(e) => return Err(e),
            }
        }

        match client.create_log_stream(&self.destination).await {
            Ok(()) => info!("CLOUDWATCH | Created log stream {}", self.destination),
            Err(e) if e.is_already_exists() => {
                debug!("CLOUDWATCH | Log stream {} already exists", self.destination);
            }
            Err(e) => return Err(e),
        }

        self.token = None;
        Ok(())
    }

    async fn apply_retention_policy(&self, client: &dyn LogsClient) {
        let Some(days) = self.log_group_retention_days else {
            return;
        };
        if let Err(e) = client
            .put_retention_policy(&self.destination.log_group_name, days)
            .await
        {
            warn!(
                "CLOUDWATCH | Failed to set {} day retention on log group {}: {}",
                days, self.destination.log_group_name, e
            );
        }
    }
}
