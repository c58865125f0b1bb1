use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{CompatibilityResult, Profile};

/// Errors that can occur when calling the compatibility classifier
#[derive(Debug, Error)]
pub enum CompatibilityError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Classifier returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<CompatibilityError> },
}

impl CompatibilityError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            CompatibilityError::RequestError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CompatibilityError::ApiError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// The pair of profiles sent for scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePair {
    #[serde(rename = "profileA")]
    pub a: Profile,
    #[serde(rename = "profileB")]
    pub b: Profile,
}

/// Opaque qualitative scorer
#[async_trait]
pub trait CompatibilityScorer: Send + Sync {
    async fn qualify(&self, pair: &ProfilePair) -> Result<CompatibilityResult, CompatibilityError>;
}

/// Exponential backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// HTTP client for the compatibility classifier
pub struct HttpCompatibilityClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
    retry: RetryPolicy,
}

impl HttpCompatibilityClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, CompatibilityError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            api_key,
            client,
            retry,
        })
    }

    pub fn from_settings(settings: &crate::config::CompatibilitySettings) -> Result<Self, CompatibilityError> {
        Self::new(
            settings.endpoint.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_secs),
            settings.retry.policy(),
        )
    }

    fn qualify_url(&self) -> String {
        format!("{}/qualify", self.endpoint.trim_end_matches('/'))
    }

    async fn attempt(&self, pair: &ProfilePair) -> Result<CompatibilityResult, CompatibilityError> {
        let mut request = self.client.post(self.qualify_url()).json(pair);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CompatibilityError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(CompatibilityError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let result: CompatibilityResult = response
            .json()
            .await
            .map_err(|e| CompatibilityError::InvalidResponse(format!("Failed to parse result: {}", e)))?;

        if !result.score.is_finite() {
            return Err(CompatibilityError::InvalidResponse(format!(
                "non-finite score {}",
                result.score
            )));
        }
        Ok(result)
    }
}

#[async_trait]
impl CompatibilityScorer for HttpCompatibilityClient {
    async fn qualify(&self, pair: &ProfilePair) -> Result<CompatibilityResult, CompatibilityError> {
        let mut retry = 0;

        loop {
            match self.attempt(pair).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    tracing::warn!(
                        "Compatibility call for {} / {} failed ({}), retrying in {:?}",
                        pair.a.user_id,
                        pair.b.user_id,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) if retry > 0 => {
                    return Err(CompatibilityError::RetriesExhausted {
                        attempts: retry + 1,
                        last: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }
}
