//! Configuration for the optimizer and the completion client.
//!
//! Values come from defaults, then an optional YAML file, then `LPO_*`
//! environment variables, then CLI flags (applied by the CLI layer).

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::DEFAULT_MAX_ATTEMPTS;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration file could not be parsed.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// What the loop does when a round hits an upstream or malformed-output error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundFailurePolicy {
    /// Record the round as skipped, keep the current prompt, continue.
    #[default]
    SkipRound,
    /// Stop the run and report the error with the best prompt so far.
    Abort,
}

impl FromStr for RoundFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" | "skip_round" | "skip-round" => Ok(RoundFailurePolicy::SkipRound),
            "abort" => Ok(RoundFailurePolicy::Abort),
            other => Err(format!(
                "unknown failure policy '{other}' (expected 'skip' or 'abort')"
            )),
        }
    }
}

/// Configuration for the local prompt optimization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of optimization rounds.
    pub max_rounds: usize,
    /// Sampling temperature for the optimizer role.
    pub optimizer_temperature: f64,
    /// Sampling temperature for the task role (provider default when unset).
    pub task_temperature: Option<f64>,
    /// How many failing examples the tagger and feedback synthesizer see.
    pub failure_sample_limit: usize,
    /// Task completions in flight during one evaluation.
    pub eval_concurrency: usize,
    /// Behaviour when a round fails.
    pub failure_policy: RoundFailurePolicy,
    /// Reject tagged prompts whose text outside the markers was altered.
    pub require_verbatim_tagging: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            optimizer_temperature: 0.3,
            task_temperature: None,
            failure_sample_limit: 3,
            eval_concurrency: 1,
            failure_policy: RoundFailurePolicy::SkipRound,
            require_verbatim_tagging: true,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML file; missing keys keep their defaults.
    ///
    /// ```yaml
    /// max_rounds: 5
    /// optimizer_temperature: 0.3
    /// failure_policy: abort
    /// ```
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LPO_MAX_ROUNDS`: Maximum optimization rounds (default: 3)
    /// - `LPO_OPTIMIZER_TEMPERATURE`: Optimizer temperature (default: 0.3)
    /// - `LPO_TASK_TEMPERATURE`: Task temperature (default: provider default)
    /// - `LPO_FAILURE_SAMPLE_LIMIT`: Failing examples shown to the optimizer (default: 3)
    /// - `LPO_EVAL_CONCURRENCY`: Concurrent task completions (default: 1)
    /// - `LPO_FAILURE_POLICY`: `skip` or `abort` (default: skip)
    /// - `LPO_REQUIRE_VERBATIM_TAGGING`: Strict tag checking (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply `LPO_*` environment variables on top of this configuration.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("LPO_MAX_ROUNDS") {
            self.max_rounds = parse_env_value(&val, "LPO_MAX_ROUNDS")?;
        }

        if let Ok(val) = std::env::var("LPO_OPTIMIZER_TEMPERATURE") {
            self.optimizer_temperature = parse_env_value(&val, "LPO_OPTIMIZER_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("LPO_TASK_TEMPERATURE") {
            self.task_temperature = Some(parse_env_value(&val, "LPO_TASK_TEMPERATURE")?);
        }

        if let Ok(val) = std::env::var("LPO_FAILURE_SAMPLE_LIMIT") {
            self.failure_sample_limit = parse_env_value(&val, "LPO_FAILURE_SAMPLE_LIMIT")?;
        }

        if let Ok(val) = std::env::var("LPO_EVAL_CONCURRENCY") {
            self.eval_concurrency = parse_env_value(&val, "LPO_EVAL_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("LPO_FAILURE_POLICY") {
            self.failure_policy = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "LPO_FAILURE_POLICY".to_string(),
                message,
            })?;
        }

        if let Ok(val) = std::env::var("LPO_REQUIRE_VERBATIM_TAGGING") {
            self.require_verbatim_tagging = parse_env_bool(&val, "LPO_REQUIRE_VERBATIM_TAGGING")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.optimizer_temperature) {
            return Err(ConfigError::ValidationFailed(
                "optimizer_temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if let Some(temp) = self.task_temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(ConfigError::ValidationFailed(
                    "task_temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.failure_sample_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "failure_sample_limit must be greater than 0".to_string(),
            ));
        }

        if self.eval_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "eval_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the round budget.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Builder method to set the optimizer temperature.
    pub fn with_optimizer_temperature(mut self, temp: f64) -> Self {
        self.optimizer_temperature = temp;
        self
    }

    /// Builder method to set the task temperature.
    pub fn with_task_temperature(mut self, temp: f64) -> Self {
        self.task_temperature = Some(temp);
        self
    }

    /// Builder method to set the failing-example sample size.
    pub fn with_failure_sample_limit(mut self, limit: usize) -> Self {
        self.failure_sample_limit = limit;
        self
    }

    /// Builder method to set evaluation concurrency.
    pub fn with_eval_concurrency(mut self, concurrency: usize) -> Self {
        self.eval_concurrency = concurrency;
        self
    }

    /// Builder method to set the round failure policy.
    pub fn with_failure_policy(mut self, policy: RoundFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder method to toggle verbatim tag checking.
    pub fn with_verbatim_tagging(mut self, required: bool) -> Self {
        self.require_verbatim_tagging = required;
        self
    }
}

/// Connection settings for the task and optimizer models.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// API key, sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Model answering dataset questions.
    pub task_model: String,
    /// Model tagging and rewriting prompts.
    pub optimizer_model: String,
    /// Attempts per completion request.
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            task_model: "gpt-4o-mini".to_string(),
            optimizer_model: "deepseek-chat".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Creates client configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LPO_API_BASE`: API base URL (default: https://api.openai.com/v1)
    /// - `LPO_API_KEY` or `OPENAI_API_KEY`: API key
    /// - `LPO_TASK_MODEL`: Task model (default: gpt-4o-mini)
    /// - `LPO_OPTIMIZER_MODEL`: Optimizer model (default: deepseek-chat)
    /// - `LPO_MAX_ATTEMPTS`: Attempts per request (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LPO_API_BASE") {
            config.api_base = val;
        }

        config.api_key = std::env::var("LPO_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();

        if let Ok(val) = std::env::var("LPO_TASK_MODEL") {
            config.task_model = val;
        }

        if let Ok(val) = std::env::var("LPO_OPTIMIZER_MODEL") {
            config.optimizer_model = val;
        }

        if let Ok(val) = std::env::var("LPO_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "LPO_MAX_ATTEMPTS")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if self.task_model.is_empty() || self.optimizer_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "task_model and optimizer_model cannot be empty".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value into the specified type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses a boolean environment variable value.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", value),
        }),
    }
}
