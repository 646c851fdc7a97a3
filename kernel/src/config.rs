// Agent Configuration
//
// Defaults, optional JSON file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::incident::CollectOptions;
use crate::plan::oracle::OracleConfig;
use crate::policy::config::PolicyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub kubectl: String,
    pub command_timeout_secs: u64,
    pub max_pods: usize,
    pub event_window: usize,
    /// Log lines collected per pod for a planned run.
    pub log_tail: u32,
    /// Log lines shown for the top pod in a triage report.
    pub triage_log_tail: u32,
    pub runs_dir: PathBuf,
    pub settle_secs: u64,
    pub oracle: OracleConfig,
    pub policy: PolicyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            command_timeout_secs: 25,
            max_pods: 5,
            event_window: 30,
            log_tail: 80,
            triage_log_tail: 120,
            runs_dir: PathBuf::from("runs"),
            settle_secs: 2,
            oracle: OracleConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AgentConfig {
    /// Load configuration: defaults, then `path` if given, then `.env` and
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // .env never overrides variables already set
        if let Ok(dotenv) = dotenvy::dotenv() {
            debug!(path = %dotenv.display(), "loaded .env");
        }
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(kubectl) = lookup("KUBECTL") {
            self.kubectl = kubectl;
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.oracle.provider = provider.to_lowercase();
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.oracle.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.oracle.model = model;
        }
        if let Some(dir) = lookup("KUBEMEDIC_RUNS_DIR") {
            self.runs_dir = PathBuf::from(dir);
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            max_pods: self.max_pods,
            event_window: self.event_window,
            log_tail: self.log_tail,
        }
    }
}
