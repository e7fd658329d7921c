//! Embedding generation through a remote provider.
//!
//! - `EmbeddingProvider`: one request for one text block, no retries
//! - `OpenAiProvider`: blocking client for OpenAI-compatible `/embeddings`
//! - `RetryPolicy`: attempt budget and jittered exponential backoff
//! - `EmbeddingClient`: provider + retry policy + post-call throttle

use std::thread;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("API key not set, export {0}")]
    MissingApiKey(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider returned no embedding")]
    EmptyResponse,

    #[error("Embedding request failed after {attempts} attempt(s): {last}")]
    Provider {
        attempts: u32,
        last: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::MissingApiKey(_) => false,
            EmbeddingError::Http(_) | EmbeddingError::EmptyResponse => true,
            EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::Provider { .. } => false,
        }
    }
}

/// A single embedding call against an external service.
pub trait EmbeddingProvider {
    /// Model identifier recorded alongside every vector.
    fn model(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiProvider {
    /// Builds a new OpenAI embeddings client.
    ///
    /// A missing key is only reported when a request is attempted, so cached
    /// queries keep working without credentials.
    pub fn new(
        api_key: Option<String>,
        api_key_env: String,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
            api_key_env,
        })
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmbeddingError::MissingApiKey(self.api_key_env.clone()))?;

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", api_key.trim()))
            .json(&request)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = resp.json()?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Attempt budget and backoff schedule for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// One attempt, no waiting.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the wait after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `initial_backoff` and saturates at `max_backoff`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Randomized wait in `[initial_backoff, ceiling(attempt)]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let low = self.initial_backoff.as_millis() as u64;
        let high = self.ceiling(attempt).as_millis() as u64;
        if high <= low {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::rng().random_range(low..=high))
    }
}

/// Embedding client used by the index pipeline and the query cache.
pub struct EmbeddingClient {
    provider: Box<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    throttle: Duration,
}

impl EmbeddingClient {
    pub fn new(provider: Box<dyn EmbeddingProvider>, retry: RetryPolicy, throttle: Duration) -> Self {
        Self {
            provider,
            retry,
            throttle,
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed one block, retrying transient failures.
    ///
    /// Exhausted or non-retryable failures come back as
    /// [`EmbeddingError::Provider`]. Every success is followed by the
    /// configured throttle delay.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.embed(text) {
                Ok(embedding) => {
                    if !self.throttle.is_zero() {
                        thread::sleep(self.throttle);
                    }
                    return Ok(embedding);
                }
                Err(err) => {
                    if err.is_retryable() && attempt < self.retry.max_attempts() {
                        let wait = self.retry.backoff(attempt);
                        log::debug!("embedding attempt {attempt} failed ({err}), retrying in {wait:?}");
                        thread::sleep(wait);
                        continue;
                    }
                    return Err(EmbeddingError::Provider {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
            }
        }
    }
}
