//! External collaborators: profile enrichment, email discovery, scraping
//! actors, news search, and outbound delivery.
//!
//! Each is a trait so the engine can be wired with real HTTP clients in
//! `main` and with stubs in tests. Enrichment-style lookups return `None`
//! on any non-success response; delivery calls surface their errors.

pub mod apify;
pub mod http;
pub mod hunter;
pub mod news_rss;
pub mod proxycurl;
pub mod smartlead;

#[cfg(test)]
pub(crate) mod mock_server;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::ServiceError;
use crate::prospects::model::{CompanyProfile, Profile};

pub use apify::{ActorRunState, ApifyClient};
pub use http::{Credential, RateLimitedClient, RetryPolicy};
pub use hunter::HunterClient;
pub use news_rss::GoogleNewsRss;
pub use proxycurl::ProxycurlClient;
pub use smartlead::SmartleadClient;

/// A discovered email address with the provider's confidence (0–100).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMatch {
    pub address: String,
    pub confidence: u32,
}

/// A person found by a company role lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleMatch {
    pub profile_url: String,
    pub role: String,
}

/// A news search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published: Option<String>,
}

/// Recipient registered with the delivery service.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
}

/// One step of a delivery sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStep {
    pub step: u32,
    pub subject: String,
    pub body: String,
    pub delay_days: u32,
}

/// Delivery state of a lead.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadStatus {
    pub replied: bool,
    pub raw: Value,
}

impl LeadStatus {
    /// Any of the provider's reply indicators counts.
    pub fn from_raw(raw: Value) -> Self {
        let replied = raw.get("replied").and_then(Value::as_bool).unwrap_or(false)
            || raw.get("reply_count").and_then(Value::as_i64).unwrap_or(0) > 0
            || raw.get("is_replied").and_then(Value::as_bool).unwrap_or(false);
        Self { replied, raw }
    }
}

/// Structured profile lookups.
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    /// `None` when the service has nothing or fails.
    async fn fetch_profile(&self, profile_url: &str) -> Option<Profile>;

    async fn fetch_company(&self, company_url: &str) -> Option<CompanyProfile>;
}

#[async_trait]
pub trait EmailFinder: Send + Sync {
    async fn find_email(&self, first_name: &str, last_name: &str, domain: &str)
    -> Option<EmailMatch>;
}

/// Finds the holder of a role at a company.
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn find_role(
        &self,
        company_url: &str,
        role: &str,
    ) -> Result<Option<RoleMatch>, ServiceError>;
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<NewsItem>, ServiceError>;
}

/// Long-running scraping jobs with poll-until-terminal semantics.
#[async_trait]
pub trait ActorRunner: Send + Sync {
    async fn run_job(
        &self,
        actor_id: &str,
        input: Value,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>, ServiceError>;
}

/// Outbound email delivery.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Returns the campaign id.
    async fn create_campaign(&self, name: &str) -> Result<String, ServiceError>;

    /// Returns the lead id.
    async fn add_lead(&self, campaign_id: &str, lead: &LeadRecord) -> Result<String, ServiceError>;

    async fn add_sequence_step(
        &self,
        campaign_id: &str,
        step: &SequenceStep,
    ) -> Result<(), ServiceError>;

    async fn lead_status(&self, campaign_id: &str, lead_id: &str)
    -> Result<LeadStatus, ServiceError>;
}

// ── Cancellation ────────────────────────────────────────────────────

/// Trigger side of a [`CancelToken`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative cancellation signal shared with long-running work.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Self { rx })
    }

    /// A token that never fires.
    pub fn never() -> Self {
        let (_handle, token) = Self::pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
