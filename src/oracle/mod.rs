//! The text-generation oracle that proposes revised tests.

mod ollama;
mod openai;
pub mod prompts;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::future::Future;
use std::time::Duration;

use crate::config::{OracleConfig, Provider};
use crate::error::{Error, Result};

/// Prompt in, free text out.
pub trait Oracle: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// How often and how patiently a transport failure is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Call `request` until it succeeds or the retry budget is spent.
    pub async fn run<F, Fut>(&self, mut request: F) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        let attempts = self.max_retries + 1;
        let mut last = String::new();

        for attempt in 1..=attempts {
            match request().await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    last = format!("{e:#}");
                    tracing::warn!("Oracle request {}/{} failed: {}", attempt, attempts, last);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff * attempt as u32).await;
                    }
                }
            }
        }

        Err(Error::OracleExhausted { attempts, last })
    }
}

#[derive(Debug, Clone)]
enum Backend {
    Ollama(OllamaClient),
    OpenAi(OpenAiClient),
}

/// The configured backend plus its retry budget.
#[derive(Debug, Clone)]
pub struct OracleClient {
    backend: Backend,
    retry: RetryPolicy,
}

impl OracleClient {
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let backend = match config.provider {
            Provider::Ollama => Backend::Ollama(
                OllamaClient::new(config.url(), config.model())
                    .with_sampling(config.temperature, config.max_tokens),
            ),
            Provider::OpenAi => Backend::OpenAi(
                OpenAiClient::from_env(config.url(), config.model(), &config.api_key_env)?
                    .with_sampling(config.temperature, config.max_tokens),
            ),
        };

        tracing::debug!(
            "Oracle: {} model {} at {}",
            config.provider,
            config.model(),
            config.url()
        );

        Ok(Self {
            backend,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        })
    }
}

impl Oracle for OracleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.retry
            .run(move || async move {
                match &self.backend {
                    Backend::Ollama(client) => client.generate(prompt).await,
                    Backend::OpenAi(client) => client.generate(prompt).await,
                }
            })
            .await
    }
}

/// For sessions that only score tests; every request is a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

impl Oracle for NoOracle {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Config(
            "this operation does not consult an oracle".to_string(),
        ))
    }
}
