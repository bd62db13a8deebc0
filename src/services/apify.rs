//! Apify actor runs.
//!
//! A run is started, polled until the remote reports a terminal status, and
//! its dataset fetched. Progress is tracked as an [`ActorRunState`]; the wait
//! is bounded by `max_wait` and can be abandoned through a [`CancelToken`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::Value;
use tokio::time::Instant;

use super::http::{Credential, RateLimitedClient, RetryPolicy};
use super::{ActorRunner, CancelToken};
use crate::error::ServiceError;

pub const APIFY_BASE: &str = "https://api.apify.com/v2";

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_WAIT: Duration = Duration::from_secs(300);

/// Lifecycle of one actor run as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorRunState {
    Started,
    Polling { polls: u32 },
    Succeeded,
    Failed { status: String },
    TimedOut,
    Cancelled,
}

impl ActorRunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started | Self::Polling { .. })
    }

    /// Fold in a status reported by the remote.
    pub fn on_status(self, remote: &str) -> Self {
        if self.is_terminal() {
            return self;
        }
        match remote {
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" | "ABORTED" | "TIMED-OUT" => Self::Failed {
                status: remote.to_string(),
            },
            _ => match self {
                Self::Polling { polls } => Self::Polling { polls: polls + 1 },
                _ => Self::Polling { polls: 1 },
            },
        }
    }

    pub fn on_deadline(self) -> Self {
        if self.is_terminal() { self } else { Self::TimedOut }
    }

    pub fn on_cancel(self) -> Self {
        if self.is_terminal() { self } else { Self::Cancelled }
    }
}

pub struct ApifyClient {
    client: RateLimitedClient,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ApifyClient {
    pub fn new(api_key: SecretString) -> Self {
        let policy = RetryPolicy {
            min_interval: Duration::ZERO,
            backoff_unit: Duration::from_secs(2),
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        };
        Self::with_settings(api_key, APIFY_BASE, policy, POLL_INTERVAL, MAX_WAIT)
    }

    pub fn with_settings(
        api_key: SecretString,
        base_url: &str,
        policy: RetryPolicy,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            client: RateLimitedClient::new("apify", base_url, Credential::Bearer(api_key), policy),
            poll_interval,
            max_wait,
        }
    }

    fn service(&self) -> String {
        self.client.service().to_string()
    }

    async fn start(&self, actor_id: &str, input: &Value) -> Result<String, ServiceError> {
        // Actor ids are addressed as `user~name` in paths.
        let path = format!("/acts/{}/runs", actor_id.replace('/', "~"));
        let data = self.client.call(Method::POST, &path, Some(input)).await?;
        let run_id = data
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::InvalidResponse {
                service: self.service(),
                reason: "run id missing".to_string(),
            })?;
        tracing::info!(actor_id, run_id, "Started actor run");
        Ok(run_id.to_string())
    }

    /// Remote status, or `UNKNOWN` when the poll itself failed.
    async fn poll_status(&self, run_id: &str) -> String {
        match self
            .client
            .call(Method::GET, &format!("/actor-runs/{run_id}"), None)
            .await
        {
            Ok(data) => data
                .get("data")
                .and_then(|d| d.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
            Err(e) => {
                tracing::warn!(run_id, "Poll failed: {e}");
                "UNKNOWN".to_string()
            }
        }
    }

    async fn fetch_dataset(&self, run_id: &str) -> Result<Vec<Value>, ServiceError> {
        let data = self
            .client
            .call(
                Method::GET,
                &format!("/actor-runs/{run_id}/dataset/items"),
                None,
            )
            .await?;
        let items = match data {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        tracing::info!(run_id, count = items.len(), "Fetched actor dataset");
        Ok(items)
    }
}

#[async_trait]
impl ActorRunner for ApifyClient {
    async fn run_job(
        &self,
        actor_id: &str,
        input: Value,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>, ServiceError> {
        let run_id = self.start(actor_id, &input).await?;
        let deadline = Instant::now() + self.max_wait;
        let mut state = ActorRunState::Started;

        loop {
            let remote = self.poll_status(&run_id).await;
            state = state.on_status(&remote);
            tracing::debug!(run_id = %run_id, ?state, "Actor run polled");

            match &state {
                ActorRunState::Succeeded => break,
                ActorRunState::Failed { status } => {
                    return Err(ServiceError::JobFailed {
                        service: self.service(),
                        run_id,
                        status: status.clone(),
                    });
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                state = state.on_deadline();
                tracing::error!(run_id = %run_id, ?state, "Actor run did not finish in time");
                return Err(ServiceError::TimedOut {
                    service: self.service(),
                    run_id,
                    waited: self.max_wait,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    state = state.on_cancel();
                    tracing::info!(run_id = %run_id, ?state, "Actor run abandoned");
                    return Err(ServiceError::Cancelled {
                        service: self.service(),
                        run_id,
                    });
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.fetch_dataset(&run_id).await
    }
}
