//! Follow-up cadence and reply detection.
//!
//! A `sent` prospect gets its next email composed once the configured delay
//! has passed since the latest approval. Replies reported by the delivery
//! service stop the sequence.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::composer::{ComposedEmail, Composer};
use super::model::{Approval, Channel, Decision, DraftEdits, MAX_SEQUENCE_STEPS, OutreachDraft};
use crate::activity::{ActivityAction, ActivityEntry};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::notify::{DomainEvent, Outbox};
use crate::prospects::model::{Prospect, ProspectStatus};
use crate::services::DeliveryService;
use crate::store::{Database, WriteOp};

/// Counts from one progression pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressionSummary {
    pub composed: usize,
    pub replied: usize,
    pub skipped: usize,
}

/// Counts from one delivery status sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub replies: usize,
}

/// Where a prospect stands in the email cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStatus {
    pub current_step: u32,
    pub max_steps: u32,
    pub days_since_last_send: Option<i64>,
    pub has_reply: bool,
    pub status: ProspectStatus,
}

enum Progress {
    Composed,
    Replied,
    Skipped,
}

pub struct SequenceScheduler {
    db: Arc<dyn Database>,
    composer: Arc<Composer>,
    delivery: Option<Arc<dyn DeliveryService>>,
    config: EngineConfig,
    outbox: Outbox,
}

impl SequenceScheduler {
    pub fn new(
        db: Arc<dyn Database>,
        composer: Arc<Composer>,
        delivery: Option<Arc<dyn DeliveryService>>,
        config: EngineConfig,
        outbox: Outbox,
    ) -> Self {
        Self {
            db,
            composer,
            delivery,
            config,
            outbox,
        }
    }

    pub async fn check_sequence_progression(&self) -> Result<ProgressionSummary, Error> {
        self.check_sequence_progression_at(Utc::now()).await
    }

    /// Progression pass evaluated at `now`.
    pub async fn check_sequence_progression_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ProgressionSummary, Error> {
        let prospects = self.db.list_prospects_by_status(ProspectStatus::Sent).await?;
        let mut summary = ProgressionSummary::default();

        for prospect in &prospects {
            match self.progress_one(prospect, now).await {
                Ok(Progress::Composed) => summary.composed += 1,
                Ok(Progress::Replied) => summary.replied += 1,
                Ok(Progress::Skipped) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(prospect_id = %prospect.id, "Sequence check failed: {e}");
                    summary.skipped += 1;
                }
            }
        }

        if summary.composed > 0 && !self.config.auto_approve_followups {
            self.outbox.publish(DomainEvent::DraftsNeedReview {
                count: summary.composed,
            });
        }
        tracing::info!(
            checked = prospects.len(),
            composed = summary.composed,
            replied = summary.replied,
            "Sequence progression complete"
        );
        Ok(summary)
    }

    async fn progress_one(&self, prospect: &Prospect, now: DateTime<Utc>) -> Result<Progress, Error> {
        let drafts = self.db.list_drafts_for_prospect(prospect.id).await?;
        let approved: Vec<&OutreachDraft> = drafts
            .iter()
            .filter(|d| d.channel == Channel::Email && d.approval == Approval::Approved)
            .collect();

        let Some(latest) = approved.iter().max_by_key(|d| d.sequence_step) else {
            return Ok(Progress::Skipped);
        };
        let step = latest.sequence_step;
        if step >= MAX_SEQUENCE_STEPS {
            return Ok(Progress::Skipped);
        }
        let next_step = step + 1;

        let next_pending = drafts.iter().any(|d| {
            d.channel == Channel::Email
                && d.sequence_step == next_step
                && d.approval == Approval::Pending
        });
        if next_pending {
            return Ok(Progress::Skipped);
        }

        let Some(last_approved_at) = approved.iter().filter_map(|d| d.approved_at).max() else {
            return Ok(Progress::Skipped);
        };
        let days = (now - last_approved_at).num_days();
        let required = i64::from(self.config.delay_after_step(step));
        if days < required {
            tracing::debug!(prospect_id = %prospect.id, days, required, "Follow-up not due");
            return Ok(Progress::Skipped);
        }

        if self.check_reply(prospect, latest).await {
            self.handle_reply(prospect).await?;
            return Ok(Progress::Replied);
        }

        let Some(dossier) = prospect.dossier.as_deref() else {
            tracing::warn!(prospect_id = %prospect.id, "No dossier, cannot compose follow-up");
            return Ok(Progress::Skipped);
        };
        if !self.composer.is_enabled() {
            return Ok(Progress::Skipped);
        }

        let previous = ComposedEmail::as_previous(latest.subject.as_deref(), latest.effective_body());
        let email = match self.composer.compose_email(dossier, next_step, Some(&previous)).await {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(prospect_id = %prospect.id, step = next_step, "Follow-up composition failed: {e}");
                return Ok(Progress::Skipped);
            }
        };

        let auto_approved = self.config.auto_approve_followups;
        let draft = OutreachDraft::pending(
            prospect.id,
            Channel::Email,
            next_step,
            Some(email.subject),
            email.body,
        )
        .with_delivery(latest.delivery.clone());

        let mut ops = vec![WriteOp::InsertDraft(draft.clone())];
        if auto_approved {
            ops.push(WriteOp::DecideDraft {
                id: draft.id,
                decision: Decision::Approve {
                    at: now,
                    edits: DraftEdits::default(),
                },
            });
        }
        ops.push(WriteOp::AppendActivity(ActivityEntry::for_prospect(
            prospect.id,
            ActivityAction::FollowupComposed,
            json!({ "draft_id": draft.id, "step": next_step, "auto_approved": auto_approved }),
        )));

        match self.db.apply(ops).await {
            Ok(()) => {
                tracing::info!(prospect_id = %prospect.id, step = next_step, auto_approved, "Follow-up composed");
                Ok(Progress::Composed)
            }
            Err(e) if e.is_unique_violation() => Ok(Progress::Skipped),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the delivery service whether the lead replied. Errors count as no.
    async fn check_reply(&self, prospect: &Prospect, draft: &OutreachDraft) -> bool {
        let (Some(delivery), Some(ids)) = (&self.delivery, &draft.delivery) else {
            return false;
        };
        match delivery.lead_status(&ids.campaign_id, &ids.lead_id).await {
            Ok(status) => status.replied,
            Err(e) => {
                tracing::warn!(prospect_id = %prospect.id, "Lead status check failed: {e}");
                false
            }
        }
    }

    async fn handle_reply(&self, prospect: &Prospect) -> Result<(), Error> {
        self.db
            .apply(vec![
                WriteOp::AdvanceProspect {
                    id: prospect.id,
                    from: ProspectStatus::Sent,
                    to: ProspectStatus::Replied,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::ReplyReceived,
                    json!({ "previous_status": prospect.status.as_str() }),
                )),
            ])
            .await?;
        tracing::info!(prospect_id = %prospect.id, "Reply detected, sequence stopped");
        self.outbox.publish(DomainEvent::ReplyReceived {
            prospect_id: prospect.id,
            name: prospect.full_name.clone(),
        });
        Ok(())
    }

    /// Poll the delivery service for every tracked prospect still in `sent`.
    pub async fn sync_delivery_statuses(&self) -> Result<SyncSummary, Error> {
        let Some(delivery) = &self.delivery else {
            return Ok(SyncSummary::default());
        };

        let drafts = self.db.list_delivery_tracked().await?;
        let mut seen = HashSet::new();
        let mut summary = SyncSummary::default();

        for draft in drafts {
            if !seen.insert(draft.prospect_id) {
                continue;
            }
            let Some(ids) = &draft.delivery else {
                continue;
            };
            let prospect = match self.db.get_prospect(draft.prospect_id).await? {
                Some(p) if p.status == ProspectStatus::Sent => p,
                _ => continue,
            };

            match delivery.lead_status(&ids.campaign_id, &ids.lead_id).await {
                Ok(status) => {
                    summary.synced += 1;
                    if status.replied {
                        self.handle_reply(&prospect).await?;
                        summary.replies += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(prospect_id = %prospect.id, "Delivery sync failed: {e}");
                }
            }
        }

        tracing::info!(synced = summary.synced, replies = summary.replies, "Delivery sync complete");
        Ok(summary)
    }

    /// Cadence position of one prospect, or `None` if it does not exist.
    pub async fn sequence_status(&self, prospect_id: Uuid) -> Result<Option<SequenceStatus>, Error> {
        self.sequence_status_at(prospect_id, Utc::now()).await
    }

    pub async fn sequence_status_at(
        &self,
        prospect_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SequenceStatus>, Error> {
        let Some(prospect) = self.db.get_prospect(prospect_id).await? else {
            return Ok(None);
        };
        let drafts = self.db.list_drafts_for_prospect(prospect_id).await?;
        let approved = drafts
            .iter()
            .filter(|d| d.channel == Channel::Email && d.approval == Approval::Approved);

        let current_step = approved.clone().map(|d| d.sequence_step).max().unwrap_or(0);
        let last_send = approved.filter_map(|d| d.sent_at.or(d.approved_at)).max();

        Ok(Some(SequenceStatus {
            current_step,
            max_steps: MAX_SEQUENCE_STEPS,
            days_since_last_send: last_send.map(|t| (now - t).num_days()),
            has_reply: matches!(prospect.status, ProspectStatus::Replied | ProspectStatus::Meeting),
            status: prospect.status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::{LlmError, ServiceError};
    use crate::llm::LlmProvider;
    use crate::outreach::model::DeliveryIds;
    use crate::outreach::prompts::Sender;
    use crate::prospects::model::LeadSource;
    use crate::services::{LeadRecord, LeadStatus, SequenceStep};
    use crate::store::LibSqlBackend;

    struct EchoLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _s: &str, _p: &str, _m: u64, _t: f64) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("SUBJECT: Next\nBODY:\nFollowing up".into())
        }
    }

    struct StatusDelivery {
        replied: AtomicBool,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryService for StatusDelivery {
        async fn create_campaign(&self, _n: &str) -> Result<String, ServiceError> {
            unreachable!()
        }
        async fn add_lead(&self, _c: &str, _l: &LeadRecord) -> Result<String, ServiceError> {
            unreachable!()
        }
        async fn add_sequence_step(&self, _c: &str, _s: &SequenceStep) -> Result<(), ServiceError> {
            unreachable!()
        }
        async fn lead_status(&self, _c: &str, _l: &str) -> Result<LeadStatus, ServiceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let replied = self.replied.load(Ordering::SeqCst);
            Ok(LeadStatus::from_raw(json!({ "reply_count": if replied { 1 } else { 0 } })))
        }
    }

    struct Fixture {
        db: Arc<LibSqlBackend>,
        scheduler: SequenceScheduler,
        llm: Arc<EchoLlm>,
        delivery: Arc<StatusDelivery>,
        events: mpsc::Receiver<DomainEvent>,
        prospect: Prospect,
    }

    async fn fixture(auto_approve: bool) -> Fixture {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut prospect = Prospect::new("Ada Lovelace", "https://linkedin.com/in/ada", LeadSource::Manual);
        prospect.status = ProspectStatus::Sent;
        prospect.dossier = Some("# Ada".into());
        db.apply(vec![WriteOp::InsertProspect(Box::new(prospect.clone()))])
            .await
            .unwrap();

        let llm = Arc::new(EchoLlm {
            calls: AtomicUsize::new(0),
        });
        let provider: Arc<dyn LlmProvider> = llm.clone();
        let composer = Arc::new(Composer::new(
            Some(provider),
            Sender {
                name: "Sam".into(),
                company: "Northwind".into(),
            },
        ));
        let delivery = Arc::new(StatusDelivery {
            replied: AtomicBool::new(false),
            polls: AtomicUsize::new(0),
        });
        let service: Arc<dyn DeliveryService> = delivery.clone();
        let (outbox, events) = Outbox::channel(16);
        let config = EngineConfig {
            auto_approve_followups: auto_approve,
            ..Default::default()
        };
        let scheduler = SequenceScheduler::new(db.clone(), composer, Some(service), config, outbox);
        Fixture {
            db,
            scheduler,
            llm,
            delivery,
            events,
            prospect,
        }
    }

    /// Insert an approved, sent email draft for `step`, approved at `at`.
    async fn sent_step(db: &LibSqlBackend, prospect_id: Uuid, step: u32, at: DateTime<Utc>) {
        let draft = OutreachDraft::pending(prospect_id, Channel::Email, step, Some("Hi".into()), "Body".into());
        db.apply(vec![
            WriteOp::InsertDraft(draft.clone()),
            WriteOp::DecideDraft {
                id: draft.id,
                decision: Decision::Approve {
                    at,
                    edits: DraftEdits::default(),
                },
            },
            WriteOp::SetDelivery {
                draft_id: draft.id,
                delivery: DeliveryIds {
                    campaign_id: "c1".into(),
                    lead_id: "l1".into(),
                },
                sent_at: at,
            },
        ])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn composes_follow_up_after_delay() {
        let mut f = fixture(false).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(4)).await;

        let summary = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(summary.composed, 1);

        let pending = f.db.list_pending_drafts().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sequence_step, 2);
        assert_eq!(pending[0].delivery.as_ref().unwrap().campaign_id, "c1");
        assert_eq!(
            f.events.try_recv().unwrap(),
            DomainEvent::DraftsNeedReview { count: 1 }
        );

        // Re-running finds the pending draft and composes nothing.
        let again = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(again.composed, 0);
        assert_eq!(f.llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_due_before_delay() {
        let f = fixture(false).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(2)).await;

        let summary = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(summary.composed, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(f.delivery.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reply_stops_sequence() {
        let mut f = fixture(false).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(10)).await;
        f.delivery.replied.store(true, Ordering::SeqCst);

        let summary = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(summary.replied, 1);
        assert_eq!(f.llm.calls.load(Ordering::SeqCst), 0);
        let prospect = f.db.get_prospect(f.prospect.id).await.unwrap().unwrap();
        assert_eq!(prospect.status, ProspectStatus::Replied);
        assert!(matches!(
            f.events.try_recv().unwrap(),
            DomainEvent::ReplyReceived { .. }
        ));
    }

    #[tokio::test]
    async fn auto_approve_skips_review() {
        let mut f = fixture(true).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(3)).await;

        let summary = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(summary.composed, 1);
        assert!(f.db.list_pending_drafts().await.unwrap().is_empty());
        let drafts = f.db.list_drafts_for_prospect(f.prospect.id).await.unwrap();
        assert_eq!(drafts[1].approval, Approval::Approved);
        assert_eq!(drafts[1].approved_at, Some(now));
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn final_step_ends_sequence() {
        let f = fixture(false).await;
        let now = Utc::now();
        for step in 1..=4 {
            sent_step(&f.db, f.prospect.id, step, now - Duration::days(30)).await;
        }
        let summary = f.scheduler.check_sequence_progression_at(now).await.unwrap();
        assert_eq!(summary.composed, 0);
        assert_eq!(f.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sync_detects_replies_once_per_prospect() {
        let f = fixture(false).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(5)).await;
        sent_step(&f.db, f.prospect.id, 2, now - Duration::days(1)).await;
        f.delivery.replied.store(true, Ordering::SeqCst);

        let summary = f.scheduler.sync_delivery_statuses().await.unwrap();
        assert_eq!(summary, SyncSummary { synced: 1, replies: 1 });
        assert_eq!(f.delivery.polls.load(Ordering::SeqCst), 1);

        let again = f.scheduler.sync_delivery_statuses().await.unwrap();
        assert_eq!(again, SyncSummary::default());
    }

    #[tokio::test]
    async fn status_reports_cadence_position() {
        let f = fixture(false).await;
        let now = Utc::now();
        sent_step(&f.db, f.prospect.id, 1, now - Duration::days(6)).await;
        sent_step(&f.db, f.prospect.id, 2, now - Duration::days(2)).await;

        let status = f.scheduler.sequence_status_at(f.prospect.id, now).await.unwrap().unwrap();
        assert_eq!(status.current_step, 2);
        assert_eq!(status.max_steps, 4);
        assert_eq!(status.days_since_last_send, Some(2));
        assert!(!status.has_reply);
        assert!(f.scheduler.sequence_status(Uuid::new_v4()).await.unwrap().is_none());
    }
}
