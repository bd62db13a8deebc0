//! Scan and identity deduplication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::{Database, QueryType};

/// Suppresses repeat scans inside a lookback window and repeat
/// materialisation of an already-known profile.
#[derive(Clone)]
pub struct DedupGate {
    db: Arc<dyn Database>,
}

impl DedupGate {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// True unless `target` was scanned for `query_type` within its window.
    pub async fn should_scan(
        &self,
        query_type: QueryType,
        target: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let Some(last) = self.db.get_search_query(query_type, target).await? else {
            return Ok(true);
        };
        let fresh = last.last_run_at >= now - query_type.dedup_window();
        if fresh {
            tracing::debug!(
                %query_type,
                target,
                last_run_at = %last.last_run_at,
                "Scan suppressed by dedup window"
            );
        }
        Ok(!fresh)
    }

    /// Record a completed scan, including zero-result ones.
    pub async fn record(
        &self,
        query_type: QueryType,
        target: &str,
        result_count: usize,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.db
            .record_search_query(query_type, target, result_count as i64, now)
            .await
    }

    /// Id of the prospect already holding this profile reference.
    pub async fn existing_prospect(&self, profile_url: &str) -> Result<Option<Uuid>, DatabaseError> {
        Ok(self
            .db
            .find_prospect_by_profile_url(profile_url)
            .await?
            .map(|p| p.id))
    }
}
