//! Rate-limited JSON client shared by the external collaborators.
//!
//! Each call sleeps a minimum interval before every attempt, injects the
//! service credential, and retries 429 responses with exponential backoff.
//! Any other non-2xx response fails immediately.

use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::ServiceError;

/// Longest remote body kept in errors and logs.
pub const MAX_ERROR_BODY: usize = 200;

/// How the API key is attached to a request.
#[derive(Clone)]
pub enum Credential {
    /// `?{name}={key}` on every request.
    QueryParam { name: &'static str, key: SecretString },
    /// `Authorization: Bearer {key}`.
    Bearer(SecretString),
    /// Public endpoint.
    None,
}

/// Pacing and retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Sleep before every attempt, successful or not.
    pub min_interval: Duration,
    /// Backoff after the n-th rate-limited attempt is `backoff_unit * 2^n`.
    pub backoff_unit: Duration,
    /// Total attempts before giving up with `RateLimited`.
    pub max_attempts: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            backoff_unit: Duration::from_secs(1),
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

/// JSON-over-HTTP client with credential injection and 429 backoff.
pub struct RateLimitedClient {
    service: String,
    base_url: String,
    credential: Credential,
    policy: RetryPolicy,
    http: reqwest::Client,
}

impl RateLimitedClient {
    pub fn new(service: &str, base_url: &str, credential: Credential, policy: RetryPolicy) -> Self {
        Self {
            service: service.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            policy,
            http: reqwest::Client::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Issue a request and decode the JSON response (`Null` for an empty body).
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value, ServiceError> {
        self.call_with_query(method, path, &[], payload).await
    }

    /// Like [`call`](Self::call) with extra query parameters.
    pub async fn call_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Option<&Value>,
    ) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..self.policy.max_attempts {
            tokio::time::sleep(self.policy.min_interval).await;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .timeout(self.policy.timeout)
                .query(query);
            request = match &self.credential {
                Credential::QueryParam { name, key } => {
                    request.query(&[(*name, key.expose_secret())])
                }
                Credential::Bearer(key) => request.bearer_auth(key.expose_secret()),
                Credential::None => request,
            };
            if let Some(body) = payload {
                request = request.json(body);
            }

            let resp = request.send().await.map_err(|e| ServiceError::Http {
                service: self.service.clone(),
                reason: e.to_string(),
            })?;
            let status = resp.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait = self.policy.backoff(attempt);
                tracing::warn!(
                    service = %self.service,
                    path,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                if attempt + 1 < self.policy.max_attempts {
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            let text = resp.text().await.map_err(|e| ServiceError::Http {
                service: self.service.clone(),
                reason: e.to_string(),
            })?;

            if !status.is_success() {
                let body = truncate(&text, MAX_ERROR_BODY);
                tracing::warn!(service = %self.service, path, status = status.as_u16(), "{body}");
                return Err(ServiceError::Remote {
                    service: self.service.clone(),
                    status: status.as_u16(),
                    body,
                });
            }

            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| ServiceError::InvalidResponse {
                service: self.service.clone(),
                reason: format!("{path}: {e}"),
            });
        }

        Err(ServiceError::RateLimited {
            service: self.service.clone(),
            path: path.to_string(),
            attempts: self.policy.max_attempts,
        })
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
