//! Diagnosis configuration.
//!
//! Defaults reproduce the reference behaviour; a JSON file may override any
//! subset of fields, and a few environment variables override the file.

use serde::{Deserialize, Serialize};
use statewalk_graph::Bounds;
use statewalk_llm::PollPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value '{value}' for {var}")]
    Env { var: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    /// Model used for every assistant the pipeline creates.
    pub model: String,
    pub paths: PathConfig,
    pub synthesis: SynthesisConfig,
    pub states: StateConfig,
    pub report: ReportConfig,
    pub polling: PollingConfig,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            paths: PathConfig::default(),
            synthesis: SynthesisConfig::default(),
            states: StateConfig::default(),
            report: ReportConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub min_hops: usize,
    pub max_hops: usize,
    /// Kinds never allowed strictly inside a bounded path.
    pub excluded_kinds: Vec<String>,
    /// Kind used by the last-resort two-hop strategy.
    pub bridge_kind: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            min_hops: 1,
            max_hops: 3,
            excluded_kinds: vec!["Event".to_string(), "Namespace".to_string()],
            bridge_kind: "Namespace".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_attempts: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub cap: usize,
    pub bounds: Bounds,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            cap: 10,
            bounds: Bounds::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Attempts at obtaining a parseable JSON reply (locator and summary).
    pub max_parse_attempts: u32,
    /// State fields forwarded to the semantic judgment.
    pub important_fields: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_parse_attempts: 3,
            important_fields: [
                "status", "spec", "path", "server", "subsets", "roleRef", "subjects", "rules",
                "webhooks", "secrets", "data", "metadata",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_delay_ms: u64,
    pub step_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub deadline_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            step_ms: policy.step.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            max_attempts: policy.max_attempts,
            deadline_secs: policy.deadline.map(|d| d.as_secs()),
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            step: Duration::from_millis(self.step_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

impl DiagnosisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// File (if any), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_from(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STATEWALK_*` overrides read through `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = env_number(&lookup, "STATEWALK_MAX_SYNTHESIS_ATTEMPTS")? {
            self.synthesis.max_attempts = v;
        }
        if let Some(v) = env_number(&lookup, "STATEWALK_STATE_CAP")? {
            self.states.cap = v;
        }
        if let Some(v) = env_number(&lookup, "STATEWALK_POLL_MAX_ATTEMPTS")? {
            self.polling.max_attempts = v;
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|m| !m.is_empty()) {
            self.model = model;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.synthesis.max_attempts == 0 {
            return Err(ConfigError::Invalid("synthesis.max_attempts must be at least 1".into()));
        }
        if self.report.max_parse_attempts == 0 {
            return Err(ConfigError::Invalid("report.max_parse_attempts must be at least 1".into()));
        }
        if self.states.cap == 0 {
            return Err(ConfigError::Invalid("states.cap must be at least 1".into()));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid("polling.max_attempts must be at least 1".into()));
        }
        if self.paths.min_hops == 0 || self.paths.min_hops > self.paths.max_hops {
            return Err(ConfigError::Invalid(format!(
                "hop bounds {}..={} are not a non-empty positive range",
                self.paths.min_hops, self.paths.max_hops
            )));
        }
        if self.paths.bridge_kind.is_empty() {
            return Err(ConfigError::Invalid("paths.bridge_kind is empty".into()));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value,
        }),
    }
}
