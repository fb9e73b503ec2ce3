//! Shared HTTP plumbing for adapters: client construction, response
//! classification, and retry with exponential back-off and jitter.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::SourceError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "trendgate/0.1 (trend-signals)".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Decides whether a non-success response body carries a source quota code.
pub(crate) type QuotaDetector = fn(StatusCode, &str) -> bool;

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("JSON deserialization error for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid url: {0}")]
    Url(String),
}

impl FetchError {
    /// Timeouts, connection failures, and 5xx responses are transient.
    /// Rate limits are never retried here.
    fn is_retriable(&self) -> bool {
        match self {
            FetchError::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            FetchError::Status { status, .. } => status.is_server_error(),
            FetchError::RateLimited { .. } | FetchError::Decode { .. } | FetchError::Url(_) => {
                false
            }
        }
    }

    pub(crate) fn into_source_error(self, adapter: &'static str) -> SourceError {
        match self {
            FetchError::RateLimited { retry_after_secs } => SourceError::RateLimited {
                adapter,
                retry_after_secs,
            },
            other => SourceError::Unavailable {
                adapter,
                reason: other.to_string(),
            },
        }
    }
}

pub(crate) struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    adapter: &'static str,
}

impl HttpClient {
    pub(crate) fn new(adapter: &'static str, settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Config {
                adapter,
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            retry: settings.retry,
            adapter,
        })
    }

    /// Send the request produced by `build`, retrying transient failures,
    /// and decode a 2xx body as `T`.
    pub(crate) async fn send_json<T, B>(
        &self,
        context: &str,
        quota: QuotaDetector,
        build: B,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let client = &self.client;
        let build = &build;
        retry_with_backoff(self.adapter, self.retry, move || async move {
            let response = build(client).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::RateLimited {
                    retry_after_secs: retry_after_secs(response.headers()),
                });
            }

            let body = response.text().await?;
            if !status.is_success() {
                if quota(status, &body) {
                    return Err(FetchError::RateLimited {
                        retry_after_secs: None,
                    });
                }
                return Err(FetchError::Status {
                    status,
                    body: truncate(&body, 300),
                });
            }

            serde_json::from_str(&body).map_err(|e| FetchError::Decode {
                context: context.to_string(),
                source: e,
            })
        })
        .await
    }
}

fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// transient errors.
///
/// The delay before retry `n` is `backoff_base_ms * 2^(n-1)` with ±25 %
/// jitter, capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    adapter: &'static str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    const MAX_DELAY_MS: u64 = 30_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = policy
                    .backoff_base_ms
                    .saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    source = adapter,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient source error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
