//! `Database` trait: single async interface for all persistence.
//!
//! Reads are individual queries. Every multi-row state change goes through
//! [`Database::apply`], which runs a batch of [`WriteOp`]s in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::error::DatabaseError;
use crate::outreach::model::{Channel, Decision, DeliveryIds, OutreachDraft};
use crate::prospects::model::{Firm, Prospect, ProspectStatus};

/// Kind of discovery scan tracked by the dedup gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Jobs,
    News,
    People,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::News => "news",
            Self::People => "people",
        }
    }

    /// Lookback window within which a repeat scan is suppressed.
    pub fn dedup_window(&self) -> Duration {
        match self {
            Self::Jobs | Self::News => Duration::hours(24),
            Self::People => Duration::days(7),
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last scan of a (query type, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query_type: String,
    pub target_id: String,
    pub result_count: i64,
    pub last_run_at: DateTime<Utc>,
}

/// One write inside a unit of work.
#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertProspect(Box<Prospect>),
    InsertDraft(OutreachDraft),
    /// Move a prospect `from → to`. Rejected if the pair is not a legal
    /// transition; a no-op if the stored status is no longer `from`.
    AdvanceProspect {
        id: Uuid,
        from: ProspectStatus,
        to: ProspectStatus,
    },
    /// Administrative status change. Fails the batch with a conflict if the
    /// stored status is no longer `from`.
    OverrideStatus {
        id: Uuid,
        from: ProspectStatus,
        to: ProspectStatus,
    },
    /// Decide a pending draft. Fails the batch if it is already decided.
    DecideDraft { id: Uuid, decision: Decision },
    /// Record delivery ids and the send time.
    SetDelivery {
        draft_id: Uuid,
        delivery: DeliveryIds,
        sent_at: DateTime<Utc>,
    },
    /// Confirm a manual send.
    MarkSent { draft_id: Uuid, sent_at: DateTime<Utc> },
    AppendActivity(ActivityEntry),
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Firms ───────────────────────────────────────────────────────

    /// Seed a firm. Firms are otherwise read-only to the engine.
    async fn insert_firm(&self, firm: &Firm) -> Result<(), DatabaseError>;

    async fn get_firm(&self, id: Uuid) -> Result<Option<Firm>, DatabaseError>;

    /// All firms in listing order (creation order).
    async fn list_firms(&self) -> Result<Vec<Firm>, DatabaseError>;

    /// Firms with monitoring enabled, in listing order.
    async fn list_monitored_firms(&self) -> Result<Vec<Firm>, DatabaseError>;

    async fn set_firm_monitoring(&self, id: Uuid, enabled: bool) -> Result<(), DatabaseError>;

    // ── Prospects ───────────────────────────────────────────────────

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, DatabaseError>;

    async fn find_prospect_by_profile_url(
        &self,
        profile_url: &str,
    ) -> Result<Option<Prospect>, DatabaseError>;

    async fn list_prospects_by_status(
        &self,
        status: ProspectStatus,
    ) -> Result<Vec<Prospect>, DatabaseError>;

    // ── Drafts ──────────────────────────────────────────────────────

    async fn get_draft(&self, id: Uuid) -> Result<Option<OutreachDraft>, DatabaseError>;

    /// Drafts of one prospect ordered by step, then creation time.
    async fn list_drafts_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<OutreachDraft>, DatabaseError>;

    async fn list_pending_drafts(&self) -> Result<Vec<OutreachDraft>, DatabaseError>;

    /// Approved drafts on `channel` that have not been sent.
    async fn list_approved_unsent(
        &self,
        channel: Channel,
    ) -> Result<Vec<OutreachDraft>, DatabaseError>;

    /// Approved drafts that carry delivery ids.
    async fn list_delivery_tracked(&self) -> Result<Vec<OutreachDraft>, DatabaseError>;

    // ── Activity ────────────────────────────────────────────────────

    /// Newest first.
    async fn list_activity(
        &self,
        prospect_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, DatabaseError>;

    // ── Search queries ──────────────────────────────────────────────

    async fn get_search_query(
        &self,
        query_type: QueryType,
        target_id: &str,
    ) -> Result<Option<SearchQuery>, DatabaseError>;

    /// Insert or refresh the scan record for a target.
    async fn record_search_query(
        &self,
        query_type: QueryType,
        target_id: &str,
        result_count: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Unit of work ────────────────────────────────────────────────

    /// Apply all ops in one transaction; any failure rolls back the batch.
    async fn apply(&self, ops: Vec<WriteOp>) -> Result<(), DatabaseError>;
}
