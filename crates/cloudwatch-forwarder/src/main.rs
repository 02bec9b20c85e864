// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cloudwatch_sink::{
    constants::DEFAULT_REQUEST_TIMEOUT,
    http_client::{HttpClientConfig, HttpLogsClient},
    CloudWatchLogSink, SinkOptions,
};

const DEFAULT_REGION: &str = "us-east-1";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("CLOUDWATCH_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = match SinkOptions::from_env() {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let endpoint = env::var("CLOUDWATCH_ENDPOINT").unwrap_or_else(|_| {
        let region = env::var("AWS_REGION").unwrap_or(DEFAULT_REGION.to_string());
        format!("https://logs.{region}.amazonaws.com")
    });
    let https_proxy = env::var("CLOUDWATCH_PROXY_HTTPS")
        .or_else(|_| env::var("HTTPS_PROXY"))
        .ok();
    let timeout = env::var("CLOUDWATCH_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);

    let client = HttpLogsClient::new(HttpClientConfig {
        endpoint: endpoint.clone(),
        timeout,
        https_proxy,
    });

    let sink = match CloudWatchLogSink::new(options, Arc::new(client)) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Unable to start CloudWatch sink: {}", e);
            return;
        }
    };
    info!(
        "Forwarding stdin to {} via {}",
        sink.destination(),
        endpoint
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !line.is_empty() {
                        sink.emit(Utc::now(), line);
                    }
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Received interrupt");
                break;
            }
        }
    }

    match sink.shutdown().await {
        Ok(metrics) => info!(
            "Shut down after sending {} events in {} batches ({} evicted, {} dropped)",
            metrics.events_sent,
            metrics.batches_sent,
            metrics.events_evicted,
            metrics.events_dropped_on_shutdown
        ),
        Err(e) => error!("Sink shutdown failed: {}", e),
    }
}
