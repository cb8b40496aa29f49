//! Controller configuration from YAML

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime settings for the controller
///
/// Every field has a default so an empty file (or no file at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Prefix of every execution request this controller submits.
    ///
    /// Results are only correlated back when the request name splits on `_`
    /// into exactly `{server_name}_{timestamp}`, so the name itself must not
    /// contain `_`.
    pub server_name: String,

    /// Store namespace holding steps, stages and pipelines
    pub namespace: String,

    /// Base URL of the execution engine
    pub echoer_addr: String,

    /// Engine action used for CI steps
    pub ci_action: String,

    /// Engine action used for CD steps
    pub cd_action: String,

    /// Retry hint merged into CI step data before submission
    pub ci_retry_count: u64,

    /// How far back the result stream is replayed on subscribe
    pub result_lookback_secs: i64,

    /// Upper bound on concurrently running per-event tasks
    pub max_concurrent_tasks: usize,

    /// HTTP timeout for submissions (the result stream is not timed out)
    pub request_timeout_secs: u64,

    /// SQLite file holding the watch resume checkpoint
    pub checkpoint_path: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server_name: "pipeline-controller".to_string(),
            namespace: "default".to_string(),
            echoer_addr: "http://127.0.0.1:8080".to_string(),
            ci_action: "ci".to_string(),
            cd_action: "cd".to_string(),
            ci_retry_count: 15,
            result_lookback_secs: 3600,
            max_concurrent_tasks: 64,
            request_timeout_secs: 30,
            checkpoint_path: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ControllerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let server_name = Regex::new(r"^[A-Za-z0-9.-]+$")?;
        if !server_name.is_match(&self.server_name) {
            anyhow::bail!(
                "Invalid server name '{}': only letters, digits, '.' and '-' are allowed",
                self.server_name
            );
        }

        if self.namespace.is_empty() {
            anyhow::bail!("Namespace must not be empty");
        }

        if !(self.echoer_addr.starts_with("http://") || self.echoer_addr.starts_with("https://")) {
            anyhow::bail!("Echoer address must be an http(s) URL: {}", self.echoer_addr);
        }

        if self.max_concurrent_tasks == 0 {
            anyhow::bail!("max_concurrent_tasks must be at least 1");
        }

        Ok(())
    }

    /// Echoer base address without a trailing slash
    pub fn echoer_base(&self) -> &str {
        self.echoer_addr.trim_end_matches('/')
    }
}
