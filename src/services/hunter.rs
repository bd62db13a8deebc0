//! Hunter email finder.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::Value;

use super::http::{Credential, RateLimitedClient, RetryPolicy};
use super::{EmailFinder, EmailMatch};

pub const HUNTER_BASE: &str = "https://api.hunter.io/v2";

pub struct HunterClient {
    client: RateLimitedClient,
}

impl HunterClient {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_policy(
            api_key,
            HUNTER_BASE,
            RetryPolicy::default().with_timeout(Duration::from_secs(15)),
        )
    }

    pub fn with_policy(api_key: SecretString, base_url: &str, policy: RetryPolicy) -> Self {
        Self {
            client: RateLimitedClient::new(
                "hunter",
                base_url,
                Credential::QueryParam {
                    name: "api_key",
                    key: api_key,
                },
                policy,
            ),
        }
    }
}

#[async_trait]
impl EmailFinder for HunterClient {
    async fn find_email(
        &self,
        first_name: &str,
        last_name: &str,
        domain: &str,
    ) -> Option<EmailMatch> {
        let response = self
            .client
            .call_with_query(
                Method::GET,
                "/email-finder",
                &[
                    ("domain", domain),
                    ("first_name", first_name),
                    ("last_name", last_name),
                ],
                None,
            )
            .await;

        let value = match response {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(domain, "Email lookup failed: {e}");
                return None;
            }
        };

        let data = value.get("data")?;
        let Some(address) = data
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
        else {
            tracing::info!("No email found for {first_name} {last_name} @ {domain}");
            return None;
        };
        let confidence = data
            .get("score")
            .and_then(Value::as_u64)
            .map(|s| s.min(100) as u32)
            .unwrap_or(0);

        Some(EmailMatch {
            address: address.to_string(),
            confidence,
        })
    }
}
