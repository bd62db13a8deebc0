//! Delivery of approved email drafts.
//!
//! The adapter reuses delivery ids already on the draft, so a retried or
//! re-triggered send never opens a second campaign for the same prospect.
//! Ids, the `approved → sent` move and the audit entry commit together; the
//! notification is published only after that commit.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::model::{Approval, DeliveryIds, OutreachDraft};
use crate::activity::{ActivityAction, ActivityEntry};
use crate::config::EngineConfig;
use crate::error::{DraftError, Error};
use crate::notify::{DomainEvent, Outbox};
use crate::prospects::model::ProspectStatus;
use crate::services::{DeliveryService, LeadRecord, SequenceStep};
use crate::store::{Database, WriteOp};

/// Result of a send attempt that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent(DeliveryIds),
    /// No delivery credential configured.
    NotConfigured,
    /// The draft is on a manual channel.
    ManualChannel,
    /// The draft already carries a send time.
    AlreadySent,
}

pub struct ExternalSendAdapter {
    db: Arc<dyn Database>,
    delivery: Option<Arc<dyn DeliveryService>>,
    config: EngineConfig,
    outbox: Outbox,
}

impl ExternalSendAdapter {
    pub fn new(
        db: Arc<dyn Database>,
        delivery: Option<Arc<dyn DeliveryService>>,
        config: EngineConfig,
        outbox: Outbox,
    ) -> Self {
        Self {
            db,
            delivery,
            config,
            outbox,
        }
    }

    /// Inter-step delay registered with the delivery service.
    fn step_delay(&self, step: u32) -> u32 {
        if step <= 1 {
            0
        } else {
            self.config.delay_after_step(step - 1)
        }
    }

    /// Ids of the approved, delivered draft for the step before `draft`.
    async fn prior_delivery(&self, draft: &OutreachDraft) -> Result<Option<DeliveryIds>, Error> {
        let drafts = self.db.list_drafts_for_prospect(draft.prospect_id).await?;
        Ok(drafts
            .into_iter()
            .filter(|d| {
                d.channel == draft.channel
                    && d.sequence_step + 1 == draft.sequence_step
                    && d.approval == Approval::Approved
                    && d.sent_at.is_some()
            })
            .find_map(|d| d.delivery))
    }

    /// Deliver an approved email draft.
    pub async fn send(&self, draft_id: Uuid) -> Result<SendOutcome, Error> {
        let Some(delivery) = &self.delivery else {
            tracing::warn!(%draft_id, "SMARTLEAD_API_KEY not set, skipping send");
            return Ok(SendOutcome::NotConfigured);
        };

        let draft = self
            .db
            .get_draft(draft_id)
            .await?
            .ok_or(DraftError::NotFound(draft_id))?;

        if !draft.channel.is_automatable() {
            tracing::info!(%draft_id, channel = %draft.channel, "Manual channel, not sending");
            return Ok(SendOutcome::ManualChannel);
        }
        if draft.approval != Approval::Approved {
            return Err(DraftError::NotApproved(draft_id).into());
        }
        if draft.sent_at.is_some() {
            tracing::debug!(%draft_id, "Draft already sent");
            return Ok(SendOutcome::AlreadySent);
        }

        let known_ids = match draft.delivery.clone() {
            Some(ids) => Some(ids),
            None if draft.sequence_step > 1 => match self.prior_delivery(&draft).await? {
                Some(ids) => Some(ids),
                None => {
                    tracing::error!(
                        %draft_id,
                        step = draft.sequence_step,
                        "Previous step has not been delivered"
                    );
                    return Err(DraftError::PriorStepUnsent {
                        prospect_id: draft.prospect_id,
                        step: draft.sequence_step,
                    }
                    .into());
                }
            },
            None => None,
        };

        let Some(prospect) = self.db.get_prospect(draft.prospect_id).await? else {
            tracing::error!(%draft_id, prospect_id = %draft.prospect_id, "Prospect not found");
            return Err(DraftError::ProspectNotFound(draft.prospect_id).into());
        };
        let Some(email) = prospect.email.clone() else {
            tracing::error!(%draft_id, prospect_id = %prospect.id, "Prospect has no email");
            return Err(DraftError::MissingEmail(prospect.id).into());
        };

        let subject = draft.subject.clone().unwrap_or_default();
        let body = draft.effective_body().to_string();

        let campaign_id = match &known_ids {
            Some(ids) => ids.campaign_id.clone(),
            None => {
                let name = format!("{} – {}", self.config.campaign_prefix, prospect.full_name);
                delivery.create_campaign(&name).await?
            }
        };

        delivery
            .add_sequence_step(
                &campaign_id,
                &SequenceStep {
                    step: draft.sequence_step,
                    subject: subject.clone(),
                    body,
                    delay_days: self.step_delay(draft.sequence_step),
                },
            )
            .await?;

        let lead_id = match &known_ids {
            Some(ids) => ids.lead_id.clone(),
            None => {
                let company_name = match prospect.firm_id {
                    Some(firm_id) => self
                        .db
                        .get_firm(firm_id)
                        .await?
                        .map(|f| f.name)
                        .unwrap_or_default(),
                    None => String::new(),
                };
                let lead = LeadRecord {
                    email,
                    first_name: prospect.first_name.clone(),
                    last_name: prospect.last_name.clone(),
                    company_name,
                };
                delivery.add_lead(&campaign_id, &lead).await?
            }
        };

        let ids = DeliveryIds {
            campaign_id,
            lead_id,
        };
        self.db
            .apply(vec![
                WriteOp::SetDelivery {
                    draft_id,
                    delivery: ids.clone(),
                    sent_at: Utc::now(),
                },
                WriteOp::AdvanceProspect {
                    id: prospect.id,
                    from: ProspectStatus::Approved,
                    to: ProspectStatus::Sent,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::EmailSent,
                    json!({
                        "step": draft.sequence_step,
                        "campaign_id": ids.campaign_id,
                        "lead_id": ids.lead_id,
                        "subject": subject,
                    }),
                )),
            ])
            .await?;

        tracing::info!(
            %draft_id,
            campaign_id = %ids.campaign_id,
            lead_id = %ids.lead_id,
            step = draft.sequence_step,
            "Draft delivered"
        );
        self.outbox.publish(DomainEvent::EmailSent {
            draft_id,
            prospect_id: prospect.id,
            name: prospect.full_name,
            step: draft.sequence_step,
        });
        Ok(SendOutcome::Sent(ids))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::outreach::model::{Channel, Decision, DraftEdits};
    use crate::prospects::model::{LeadSource, Prospect};
    use crate::services::LeadStatus;
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingDelivery {
        campaigns: AtomicUsize,
        leads: AtomicUsize,
        steps: Mutex<Vec<(String, u32, u32)>>,
    }

    #[async_trait]
    impl DeliveryService for RecordingDelivery {
        async fn create_campaign(&self, _name: &str) -> Result<String, ServiceError> {
            let n = self.campaigns.fetch_add(1, Ordering::SeqCst);
            Ok(format!("camp-{n}"))
        }

        async fn add_lead(&self, _campaign_id: &str, _lead: &LeadRecord) -> Result<String, ServiceError> {
            let n = self.leads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("lead-{n}"))
        }

        async fn add_sequence_step(
            &self,
            campaign_id: &str,
            step: &SequenceStep,
        ) -> Result<(), ServiceError> {
            self.steps
                .lock()
                .unwrap()
                .push((campaign_id.to_string(), step.step, step.delay_days));
            Ok(())
        }

        async fn lead_status(&self, _c: &str, _l: &str) -> Result<LeadStatus, ServiceError> {
            Ok(LeadStatus::from_raw(serde_json::Value::Null))
        }
    }

    struct Fixture {
        db: Arc<LibSqlBackend>,
        delivery: Arc<RecordingDelivery>,
        adapter: ExternalSendAdapter,
        prospect: Prospect,
    }

    async fn fixture(email: Option<&str>) -> Fixture {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut prospect = Prospect::new("Ada Lovelace", "https://linkedin.com/in/ada", LeadSource::Manual);
        prospect.status = ProspectStatus::Approved;
        prospect.email = email.map(str::to_string);
        db.apply(vec![WriteOp::InsertProspect(Box::new(prospect.clone()))])
            .await
            .unwrap();

        let delivery = Arc::new(RecordingDelivery::default());
        let service: Arc<dyn DeliveryService> = delivery.clone();
        let (outbox, _rx) = Outbox::channel(16);
        let adapter = ExternalSendAdapter::new(db.clone(), Some(service), EngineConfig::default(), outbox);
        Fixture {
            db,
            delivery,
            adapter,
            prospect,
        }
    }

    async fn approved_draft(db: &LibSqlBackend, prospect_id: Uuid, step: u32) -> OutreachDraft {
        let draft = OutreachDraft::pending(prospect_id, Channel::Email, step, Some("Hi".into()), "Body".into());
        db.apply(vec![
            WriteOp::InsertDraft(draft.clone()),
            WriteOp::DecideDraft {
                id: draft.id,
                decision: Decision::Approve {
                    at: Utc::now(),
                    edits: DraftEdits::default(),
                },
            },
        ])
        .await
        .unwrap();
        draft
    }

    #[tokio::test]
    async fn first_send_creates_campaign_and_advances_prospect() {
        let f = fixture(Some("ada@acme.com")).await;
        let draft = approved_draft(&f.db, f.prospect.id, 1).await;

        let outcome = f.adapter.send(draft.id).await.unwrap();
        let SendOutcome::Sent(ids) = outcome else {
            panic!("expected a send");
        };
        assert_eq!(ids.campaign_id, "camp-0");

        let stored = f.db.get_draft(draft.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery, Some(ids));
        assert!(stored.sent_at.is_some());
        let prospect = f.db.get_prospect(f.prospect.id).await.unwrap().unwrap();
        assert_eq!(prospect.status, ProspectStatus::Sent);
        assert_eq!(*f.delivery.steps.lock().unwrap(), vec![("camp-0".to_string(), 1, 0)]);

        // A second trigger is a no-op.
        assert_eq!(f.adapter.send(draft.id).await.unwrap(), SendOutcome::AlreadySent);
        assert_eq!(f.delivery.campaigns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn follow_up_reuses_campaign_with_step_delay() {
        let f = fixture(Some("ada@acme.com")).await;
        let first = approved_draft(&f.db, f.prospect.id, 1).await;
        f.adapter.send(first.id).await.unwrap();

        let second = approved_draft(&f.db, f.prospect.id, 2).await;
        f.adapter.send(second.id).await.unwrap();

        assert_eq!(f.delivery.campaigns.load(Ordering::SeqCst), 1);
        assert_eq!(f.delivery.leads.load(Ordering::SeqCst), 1);
        let steps = f.delivery.steps.lock().unwrap().clone();
        assert_eq!(steps[1], ("camp-0".to_string(), 2, 3));
    }

    #[tokio::test]
    async fn follow_up_before_prior_send_is_refused() {
        let f = fixture(Some("ada@acme.com")).await;
        approved_draft(&f.db, f.prospect.id, 1).await;
        let second = approved_draft(&f.db, f.prospect.id, 2).await;

        let err = f.adapter.send(second.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Draft(DraftError::PriorStepUnsent { step: 2, .. })
        ));
        assert_eq!(f.delivery.campaigns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_email_fails_without_mutation() {
        let f = fixture(None).await;
        let draft = approved_draft(&f.db, f.prospect.id, 1).await;

        let err = f.adapter.send(draft.id).await.unwrap_err();
        assert!(matches!(err, Error::Draft(DraftError::MissingEmail(_))));
        let stored = f.db.get_draft(draft.id).await.unwrap().unwrap();
        assert!(stored.delivery.is_none());
        assert_eq!(f.delivery.campaigns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_and_manual_are_skipped() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (outbox, _rx) = Outbox::channel(4);
        let adapter = ExternalSendAdapter::new(db.clone(), None, EngineConfig::default(), outbox);
        assert_eq!(
            adapter.send(Uuid::new_v4()).await.unwrap(),
            SendOutcome::NotConfigured
        );

        let f = fixture(Some("ada@acme.com")).await;
        let note = OutreachDraft::pending(f.prospect.id, Channel::LinkedinManual, 1, None, "Hi".into());
        f.db.apply(vec![WriteOp::InsertDraft(note.clone())]).await.unwrap();
        assert_eq!(f.adapter.send(note.id).await.unwrap(), SendOutcome::ManualChannel);
    }
}
