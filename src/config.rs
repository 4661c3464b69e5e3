//! 调用配置：回调、并发上限与运行元数据。
//!
//! Per-call configuration.

use crate::callbacks::Callback;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Environment variable holding the default `max_concurrency` for batch calls.
pub const MAX_CONCURRENCY_ENV: &str = "AI_LIB_MAX_CONCURRENCY";

/// Options for a single dispatcher call.
///
/// Data fields deserialize from JSON; callbacks are attached in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnableConfig {
    /// Handlers notified for this call only.
    #[serde(skip)]
    pub callbacks: Vec<Callback>,
    /// Upper bound on simultaneous underlying calls during a batch. `None` is unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Overrides the model type as the run name.
    #[serde(default)]
    pub run_name: Option<String>,
}

static DEFAULT_CONFIG: Lazy<RunnableConfig> = Lazy::new(RunnableConfig::from_env);

impl RunnableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config seeded from the environment.
    ///
    /// Reads `AI_LIB_MAX_CONCURRENCY`; unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let max_concurrency = std::env::var(MAX_CONCURRENCY_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|v| *v > 0);
        Self {
            max_concurrency,
            ..Self::default()
        }
    }

    /// The process-wide default used when a call passes no config.
    pub fn global() -> &'static RunnableConfig {
        &DEFAULT_CONFIG
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_callbacks(mut self, callbacks: impl IntoIterator<Item = Callback>) -> Self {
        self.callbacks.extend(callbacks);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(Error::validation_with_context(
                "max_concurrency must be at least 1",
                ErrorContext::new()
                    .with_field_path("config.max_concurrency")
                    .with_details("got 0")
                    .with_source("runnable_config"),
            ));
        }
        Ok(())
    }
}
