// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

pub type StreamNameFn = Arc<dyn Fn() -> String + Send + Sync>;

/// How a sink picks the name of the log stream it writes to.
#[derive(Clone, Default)]
pub enum LogStreamNameProvider {
    /// `{UTC yyyy-MM-dd-HH-mm-ss}_{random id}`, unique per sink instance.
    #[default]
    Default,
    Constant(String),
    Custom(StreamNameFn),
}

impl LogStreamNameProvider {
    pub fn constant(name: impl Into<String>) -> Self {
        Self::Constant(name.into())
    }

    pub fn custom(name_fn: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(name_fn))
    }

    #[must_use]
    pub fn log_stream_name(&self) -> String {
        match self {
            Self::Default => format!(
                "{}_{}",
                Utc::now().format("%Y-%m-%d-%H-%M-%S"),
                Uuid::new_v4()
            ),
            Self::Constant(name) => name.clone(),
            Self::Custom(name_fn) => name_fn(),
        }
    }
}

impl Debug for LogStreamNameProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "LogStreamNameProvider::Default"),
            Self::Constant(name) => write!(f, "LogStreamNameProvider::Constant({name})"),
            Self::Custom(_) => write!(f, "LogStreamNameProvider::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_shape() {
        let name = LogStreamNameProvider::Default.log_stream_name();
        let (timestamp, id) = name.split_once('_').unwrap();

        assert_eq!(timestamp.len(), "2024-01-01-00-00-00".len());
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_default_names_are_unique() {
        let provider = LogStreamNameProvider::default();
        assert_ne!(provider.log_stream_name(), provider.log_stream_name());
    }

    #[test]
    fn test_constant_name() {
        let provider = LogStreamNameProvider::constant("web-1");
        assert_eq!(provider.log_stream_name(), "web-1");
    }

    #[test]
    fn test_custom_name() {
        let provider = LogStreamNameProvider::custom(|| "from-closure".to_string());
        assert_eq!(provider.log_stream_name(), "from-closure");
        assert_eq!(format!("{provider:?}"), "LogStreamNameProvider::Custom");
    }
}
