//! Optimizer configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! YAML file, `PROMPTSMITH_*` environment variables, and CLI flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Tuning knobs for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Upper bound on rewrite iterations per run.
    pub max_iterations: usize,
    /// Stop early once the best score reaches this value.
    pub target_score: f64,
    /// Score range under which the last `window_size` scores count as a plateau.
    pub convergence_threshold: f64,
    pub window_size: usize,
    /// Number of recent (prompt, score) pairs shown to the generator.
    pub history_window: usize,
    /// Number of similar records the retrieval learner draws on.
    pub top_performers: usize,
    /// Model name passed to the provider; empty selects the client default.
    pub model: String,
    pub judge_temperature: f64,
    pub generation_temperature: f64,
    pub max_tokens: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            target_score: 0.9,
            convergence_threshold: 0.02,
            window_size: 3,
            history_window: 5,
            top_performers: 3,
            model: String::new(),
            judge_temperature: 0.2,
            generation_temperature: 0.7,
            max_tokens: 1500,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PROMPTSMITH_*` environment overrides on top of `self`.
    ///
    /// - `PROMPTSMITH_MAX_ITERATIONS`
    /// - `PROMPTSMITH_TARGET_SCORE`
    /// - `PROMPTSMITH_CONVERGENCE_THRESHOLD`
    /// - `PROMPTSMITH_WINDOW_SIZE`
    /// - `PROMPTSMITH_HISTORY_WINDOW`
    /// - `PROMPTSMITH_TOP_PERFORMERS`
    /// - `PROMPTSMITH_MODEL`
    /// - `PROMPTSMITH_JUDGE_TEMPERATURE`
    /// - `PROMPTSMITH_GENERATION_TEMPERATURE`
    /// - `PROMPTSMITH_MAX_TOKENS`
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        fn var(key: &str) -> Option<String> {
            std::env::var(key).ok()
        }

        if let Some(val) = var("PROMPTSMITH_MAX_ITERATIONS") {
            self.max_iterations = parse_env_value(&val, "PROMPTSMITH_MAX_ITERATIONS")?;
        }
        if let Some(val) = var("PROMPTSMITH_TARGET_SCORE") {
            self.target_score = parse_env_value(&val, "PROMPTSMITH_TARGET_SCORE")?;
        }
        if let Some(val) = var("PROMPTSMITH_CONVERGENCE_THRESHOLD") {
            self.convergence_threshold =
                parse_env_value(&val, "PROMPTSMITH_CONVERGENCE_THRESHOLD")?;
        }
        if let Some(val) = var("PROMPTSMITH_WINDOW_SIZE") {
            self.window_size = parse_env_value(&val, "PROMPTSMITH_WINDOW_SIZE")?;
        }
        if let Some(val) = var("PROMPTSMITH_HISTORY_WINDOW") {
            self.history_window = parse_env_value(&val, "PROMPTSMITH_HISTORY_WINDOW")?;
        }
        if let Some(val) = var("PROMPTSMITH_TOP_PERFORMERS") {
            self.top_performers = parse_env_value(&val, "PROMPTSMITH_TOP_PERFORMERS")?;
        }
        if let Some(val) = var("PROMPTSMITH_MODEL") {
            self.model = val;
        }
        if let Some(val) = var("PROMPTSMITH_JUDGE_TEMPERATURE") {
            self.judge_temperature = parse_env_value(&val, "PROMPTSMITH_JUDGE_TEMPERATURE")?;
        }
        if let Some(val) = var("PROMPTSMITH_GENERATION_TEMPERATURE") {
            self.generation_temperature =
                parse_env_value(&val, "PROMPTSMITH_GENERATION_TEMPERATURE")?;
        }
        if let Some(val) = var("PROMPTSMITH_MAX_TOKENS") {
            self.max_tokens = parse_env_value(&val, "PROMPTSMITH_MAX_TOKENS")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_iterations must be greater than 0".to_string(),
            ));
        }

        if self.window_size < 2 {
            return Err(ConfigError::ValidationFailed(
                "window_size must be at least 2".to_string(),
            ));
        }

        if !(self.target_score > 0.0 && self.target_score <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "target_score must be in (0, 1], got {}",
                self.target_score
            )));
        }

        if self.convergence_threshold <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "convergence_threshold must be positive".to_string(),
            ));
        }

        if self.history_window == 0 || self.top_performers == 0 {
            return Err(ConfigError::ValidationFailed(
                "history_window and top_performers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_target_score(mut self, target_score: f64) -> Self {
        self.target_score = target_score;
        self
    }

    pub fn with_convergence(mut self, threshold: f64, window_size: usize) -> Self {
        self.convergence_threshold = threshold;
        self.window_size = window_size;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
