use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::harness::NotCollectedPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Text-generation backend
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Test runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Refinement loop settings
    #[serde(default)]
    pub refine: RefineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seed for mutant generation and sampling; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    OpenAi,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub provider: Provider,

    /// API base URL; defaults per provider
    #[serde(default)]
    pub url: Option<String>,

    /// Model name; defaults per provider
    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding the API key (OpenAI only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Retries after a failed request before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay before the first retry; grows linearly
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl OracleConfig {
    pub fn url(&self) -> &str {
        match (&self.url, self.provider) {
            (Some(url), _) => url,
            (None, Provider::Ollama) => "http://localhost:11434",
            (None, Provider::OpenAi) => "https://api.openai.com/v1",
        }
    }

    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, Provider::Ollama) => "qwen2.5-coder:7b",
            (None, Provider::OpenAi) => "gpt-4",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Per-test timeout; a timed out run counts as not collected
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra arguments for `cargo test`, e.g. `["--features", "full"]`
    #[serde(default)]
    pub cargo_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    #[serde(default = "default_tighten_threshold")]
    pub tighten_threshold: f64,

    #[serde(default = "default_generalize_threshold")]
    pub generalize_threshold: f64,

    /// Mutants per batch
    #[serde(default = "default_mutant_count")]
    pub mutant_count: usize,

    /// Outer iteration budget
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,

    /// Mutation order limit
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Oracle proposals per sampled mutant
    #[serde(default = "default_attempts_per_mutant")]
    pub attempts_per_mutant: usize,

    #[serde(default)]
    pub not_collected: NotCollectedPolicy,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_tighten_threshold() -> f64 {
    0.8
}

fn default_generalize_threshold() -> f64 {
    0.3
}

fn default_mutant_count() -> usize {
    10
}

fn default_max_iters() -> usize {
    10
}

fn default_max_depth() -> usize {
    2
}

fn default_attempts_per_mutant() -> usize {
    5
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            seed: None,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            url: None,
            model: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            cargo_args: Vec::new(),
        }
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            tighten_threshold: default_tighten_threshold(),
            generalize_threshold: default_generalize_threshold(),
            mutant_count: default_mutant_count(),
            max_iters: default_max_iters(),
            max_depth: default_max_depth(),
            attempts_per_mutant: default_attempts_per_mutant(),
            not_collected: NotCollectedPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config: Config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "proptune", "proptune")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject settings the refinement loop cannot work with.
    pub fn validate(&self) -> crate::Result<()> {
        let refine = &self.refine;
        for (name, value) in [
            ("tighten_threshold", refine.tighten_threshold),
            ("generalize_threshold", refine.generalize_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::Error::Config(format!(
                    "refine.{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        if refine.mutant_count == 0 {
            return Err(crate::Error::Config(
                "refine.mutant_count must be at least 1".to_string(),
            ));
        }
        if refine.attempts_per_mutant == 0 {
            return Err(crate::Error::Config(
                "refine.attempts_per_mutant must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
