//! Job monitor: AI and data openings at monitored firms.
//!
//! Postings are hiring signals for the firm, never prospects themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use super::dedup::DedupGate;
use crate::error::Error;
use crate::services::{ActorRunner, CancelToken};
use crate::store::{Database, QueryType};

pub const JOBS_ACTOR: &str = "anchor/linkedin-jobs-scraper";
const MAX_ITEMS: u32 = 50;

/// Job title keywords that count as AI or data hiring.
pub const AI_JOB_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "data science",
    "data engineer",
    "ml engineer",
    "ai engineer",
    "head of data",
    "head of ai",
    "chief data",
    "nlp",
    "deep learning",
    "computer vision",
    "data platform",
    "data strategy",
    "analytics",
];

pub fn is_ai_job(title: &str) -> bool {
    let title = title.to_lowercase();
    AI_JOB_KEYWORDS.iter().any(|kw| title.contains(kw))
}

/// Actor input: postings from the last week matching the firm name.
pub fn job_search_input(firm_name: &str) -> Value {
    json!({
        "searchUrl": format!("https://www.linkedin.com/jobs/search/?keywords={firm_name}&f_TPR=r604800"),
        "maxItems": MAX_ITEMS,
        "proxy": { "useApifyProxy": true },
    })
}

/// A relevant opening at a monitored firm.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPosting {
    pub firm_id: Uuid,
    pub firm_name: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub posted_at: String,
}

fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

pub struct JobMonitor {
    runner: Option<Arc<dyn ActorRunner>>,
    db: Arc<dyn Database>,
    dedup: DedupGate,
}

impl JobMonitor {
    pub fn new(runner: Option<Arc<dyn ActorRunner>>, db: Arc<dyn Database>, dedup: DedupGate) -> Self {
        Self { runner, db, dedup }
    }

    /// Scrape postings for every monitored firm outside its dedup window.
    pub async fn scan_all_firms(
        &self,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<JobPosting>, Error> {
        let Some(runner) = &self.runner else {
            tracing::warn!("APIFY_API_KEY not set, skipping job scan");
            return Ok(Vec::new());
        };

        let firms = self.db.list_monitored_firms().await?;
        let mut results = Vec::new();

        for firm in &firms {
            if cancel.is_cancelled() {
                tracing::info!("Job scan cancelled");
                break;
            }
            let target = firm.id.to_string();
            if !self.dedup.should_scan(QueryType::Jobs, &target, now).await? {
                continue;
            }

            tracing::info!(firm = %firm.name, "Scanning jobs");
            let items = match runner
                .run_job(JOBS_ACTOR, job_search_input(&firm.name), cancel)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(firm = %firm.name, "Job scrape failed: {e}");
                    continue;
                }
            };

            let total = items.len();
            let relevant: Vec<JobPosting> = items
                .iter()
                .filter_map(|item| {
                    let title = str_field(item, "title")?;
                    is_ai_job(&title).then(|| JobPosting {
                        firm_id: firm.id,
                        firm_name: firm.name.clone(),
                        company: str_field(item, "companyName").unwrap_or_else(|| firm.name.clone()),
                        location: str_field(item, "location").unwrap_or_default(),
                        url: str_field(item, "url").unwrap_or_default(),
                        posted_at: str_field(item, "postedAt").unwrap_or_default(),
                        title,
                    })
                })
                .collect();

            tracing::info!(firm = %firm.name, relevant = relevant.len(), total, "Jobs filtered");
            self.dedup
                .record(QueryType::Jobs, &target, relevant.len(), now)
                .await?;
            results.extend(relevant);
        }

        tracing::info!(jobs = results.len(), firms = firms.len(), "Job scan complete");
        Ok(results)
    }
}
