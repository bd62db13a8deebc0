//! News monitor: firm mentions alongside AI and data keywords.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::dedup::DedupGate;
use crate::error::Error;
use crate::services::{NewsFeed, NewsItem};
use crate::store::{Database, QueryType};

/// Appointment and AI keywords that mark a hiring signal in a headline.
pub const HIRING_KEYWORDS: &[&str] = &[
    "hires",
    "hired",
    "appoints",
    "appointed",
    "names",
    "named",
    "joins",
    "joined",
    "recruits",
    "recruited",
    "head of ai",
    "head of data",
    "chief data",
    "chief ai",
    "data science",
    "machine learning",
    "artificial intelligence",
    "ai strategy",
    "digital transformation",
    "data platform",
];

pub fn has_hiring_signal(title: &str) -> bool {
    let title = title.to_lowercase();
    HIRING_KEYWORDS.iter().any(|kw| title.contains(kw))
}

pub fn firm_query(firm_name: &str) -> String {
    format!("\"{firm_name}\" AND (AI OR \"data science\" OR \"machine learning\")")
}

/// A headline attributed to a monitored firm.
#[derive(Debug, Clone, PartialEq)]
pub struct FirmArticle {
    pub firm_id: Uuid,
    pub firm_name: String,
    pub item: NewsItem,
    pub has_hiring_signal: bool,
}

pub struct NewsMonitor {
    feed: Arc<dyn NewsFeed>,
    db: Arc<dyn Database>,
    dedup: DedupGate,
}

impl NewsMonitor {
    pub fn new(feed: Arc<dyn NewsFeed>, db: Arc<dyn Database>, dedup: DedupGate) -> Self {
        Self { feed, db, dedup }
    }

    /// Search news for every monitored firm outside its dedup window.
    pub async fn scan_all_firms(&self, now: DateTime<Utc>) -> Result<Vec<FirmArticle>, Error> {
        let firms = self.db.list_monitored_firms().await?;
        let mut results = Vec::new();

        for firm in &firms {
            let target = firm.id.to_string();
            if !self.dedup.should_scan(QueryType::News, &target, now).await? {
                continue;
            }

            tracing::info!(firm = %firm.name, "Scanning news");
            let items = match self.feed.search(&firm_query(&firm.name)).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(firm = %firm.name, "News search failed: {e}");
                    continue;
                }
            };

            self.dedup
                .record(QueryType::News, &target, items.len(), now)
                .await?;
            results.extend(items.into_iter().map(|item| FirmArticle {
                firm_id: firm.id,
                firm_name: firm.name.clone(),
                has_hiring_signal: has_hiring_signal(&item.title),
                item,
            }));
        }

        tracing::info!(articles = results.len(), firms = firms.len(), "News scan complete");
        Ok(results)
    }
}
