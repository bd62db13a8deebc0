//! Smartlead campaign delivery.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};

use super::http::{Credential, RateLimitedClient, RetryPolicy};
use super::{DeliveryService, LeadRecord, LeadStatus, SequenceStep};
use crate::error::ServiceError;

pub const SMARTLEAD_BASE: &str = "https://server.smartlead.ai/api/v1";

pub struct SmartleadClient {
    client: RateLimitedClient,
    sending_account: Option<String>,
}

impl SmartleadClient {
    pub fn new(api_key: SecretString, sending_account: Option<String>) -> Self {
        Self::with_policy(api_key, sending_account, SMARTLEAD_BASE, RetryPolicy::default())
    }

    pub fn with_policy(
        api_key: SecretString,
        sending_account: Option<String>,
        base_url: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client: RateLimitedClient::new(
                "smartlead",
                base_url,
                Credential::QueryParam {
                    name: "api_key",
                    key: api_key,
                },
                policy,
            ),
            sending_account,
        }
    }

    fn invalid(&self, reason: &str) -> ServiceError {
        ServiceError::InvalidResponse {
            service: self.client.service().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Ids come back as numbers or strings depending on the endpoint.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl DeliveryService for SmartleadClient {
    async fn create_campaign(&self, name: &str) -> Result<String, ServiceError> {
        let mut payload = json!({ "name": name });
        if let Some(account) = &self.sending_account {
            payload["sending_account_id"] = json!(account);
        }
        let data = self
            .client
            .call(Method::POST, "/campaigns/create", Some(&payload))
            .await?;
        let id = id_string(data.get("id")).ok_or_else(|| self.invalid("campaign id missing"))?;
        tracing::info!(campaign_id = %id, "Created campaign '{name}'");
        Ok(id)
    }

    async fn add_lead(&self, campaign_id: &str, lead: &LeadRecord) -> Result<String, ServiceError> {
        let payload = json!({
            "lead_list": [{
                "email": lead.email,
                "first_name": lead.first_name,
                "last_name": lead.last_name,
                "company_name": lead.company_name,
            }]
        });
        let data = self
            .client
            .call(
                Method::POST,
                &format!("/campaigns/{campaign_id}/leads"),
                Some(&payload),
            )
            .await?;
        let id = id_string(
            data.get("upload_list")
                .and_then(|list| list.get(0))
                .and_then(|entry| entry.get("id")),
        )
        .ok_or_else(|| self.invalid("lead id missing"))?;
        tracing::info!(campaign_id, lead_id = %id, "Registered lead");
        Ok(id)
    }

    async fn add_sequence_step(
        &self,
        campaign_id: &str,
        step: &SequenceStep,
    ) -> Result<(), ServiceError> {
        let payload = json!({
            "sequences": [{
                "seq_number": step.step,
                "subject": step.subject,
                "email_body": step.body,
                "seq_delay_details": { "delay_in_days": step.delay_days },
            }]
        });
        self.client
            .call(
                Method::POST,
                &format!("/campaigns/{campaign_id}/sequences"),
                Some(&payload),
            )
            .await?;
        tracing::info!(
            campaign_id,
            step = step.step,
            delay_days = step.delay_days,
            "Registered sequence step"
        );
        Ok(())
    }

    async fn lead_status(
        &self,
        campaign_id: &str,
        lead_id: &str,
    ) -> Result<LeadStatus, ServiceError> {
        let data = self
            .client
            .call(
                Method::GET,
                &format!("/campaigns/{campaign_id}/leads/{lead_id}/status"),
                None,
            )
            .await?;
        Ok(LeadStatus::from_raw(data))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::mock_server::{MockResponse, MockServer};

    fn client(server: &MockServer, account: Option<&str>) -> SmartleadClient {
        let policy = RetryPolicy {
            min_interval: Duration::from_millis(1),
            backoff_unit: Duration::from_millis(1),
            max_attempts: 3,
            timeout: Duration::from_secs(5),
        };
        SmartleadClient::with_policy(
            SecretString::from("sl-key"),
            account.map(str::to_string),
            &server.base_url(),
            policy,
        )
    }

    #[tokio::test]
    async fn campaign_lead_and_step() {
        let server = MockServer::start(vec![
            MockResponse::json(200, json!({"id": 4242})),
            MockResponse::json(200, json!({"upload_list": [{"id": "lead-9"}]})),
            MockResponse::json(200, json!({"ok": true})),
        ])
        .await;
        let client = client(&server, Some("acct-1"));

        let campaign = client.create_campaign("Outreach – Ada Lovelace").await.unwrap();
        assert_eq!(campaign, "4242");

        let lead = client
            .add_lead(
                &campaign,
                &LeadRecord {
                    email: "ada@acme.com".into(),
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    company_name: "Acme Capital".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(lead, "lead-9");

        client
            .add_sequence_step(
                &campaign,
                &SequenceStep {
                    step: 2,
                    subject: "Re: hello".into(),
                    body: "Following up".into(),
                    delay_days: 3,
                },
            )
            .await
            .unwrap();

        let requests = server.requests();
        assert!(requests[0].line.starts_with("POST /campaigns/create?api_key=sl-key"));
        assert!(requests[0].body.contains("\"sending_account_id\":\"acct-1\""));
        assert!(requests[1].line.starts_with("POST /campaigns/4242/leads"));
        assert!(requests[2].body.contains("\"delay_in_days\":3"));
    }

    #[tokio::test]
    async fn missing_lead_id_is_invalid() {
        let server = MockServer::start(vec![MockResponse::json(200, json!({"upload_list": []}))]).await;
        let err = client(&server, None)
            .add_lead(
                "1",
                &LeadRecord {
                    email: "a@b.c".into(),
                    first_name: "A".into(),
                    last_name: "B".into(),
                    company_name: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn status_reports_reply() {
        let server = MockServer::start(vec![MockResponse::json(200, json!({"reply_count": 1}))]).await;
        let status = client(&server, None).lead_status("1", "2").await.unwrap();
        assert!(status.replied);
        assert!(server.requests()[0].line.starts_with("GET /campaigns/1/leads/2/status"));
    }
}
