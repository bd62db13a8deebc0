//! Draft lifecycle: compose, review, regenerate and manual-channel tracking.
//!
//! A draft is decided exactly once. Every state change commits its draft
//! row, the prospect transition and the audit entry in a single
//! [`Database::apply`] batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::composer::{ComposedEmail, Composer};
use super::model::{Approval, Channel, Decision, DraftEdits, OutreachDraft};
use super::sender::ExternalSendAdapter;
use crate::activity::{ActivityAction, ActivityEntry};
use crate::error::{DatabaseError, DraftError, Error};
use crate::notify::{DomainEvent, Outbox};
use crate::prospects::model::{Prospect, ProspectStatus};
use crate::store::{Database, WriteOp};

const CONNECTION_SUBJECT: &str = "Connection Request";
const MESSAGE_SUBJECT: &str = "LinkedIn Message";
const REGENERATED_REASON: &str = "Regenerated";

/// What a human has to do by hand for an approved manual draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualActionKind {
    ConnectionRequest,
    Message,
}

/// An approved, unsent manual-channel draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualAction {
    pub draft_id: Uuid,
    pub prospect_id: Uuid,
    pub prospect_name: String,
    pub profile_url: String,
    pub kind: ManualActionKind,
    pub message: String,
    pub approved_at: Option<DateTime<Utc>>,
}

pub struct DraftStateMachine {
    db: Arc<dyn Database>,
    composer: Arc<Composer>,
    sender: Arc<ExternalSendAdapter>,
    outbox: Outbox,
}

impl DraftStateMachine {
    pub fn new(
        db: Arc<dyn Database>,
        composer: Arc<Composer>,
        sender: Arc<ExternalSendAdapter>,
        outbox: Outbox,
    ) -> Self {
        Self {
            db,
            composer,
            sender,
            outbox,
        }
    }

    async fn load_draft(&self, id: Uuid) -> Result<OutreachDraft, Error> {
        Ok(self
            .db
            .get_draft(id)
            .await?
            .ok_or(DraftError::NotFound(id))?)
    }

    async fn load_prospect(&self, id: Uuid) -> Result<Prospect, Error> {
        Ok(self
            .db
            .get_prospect(id)
            .await?
            .ok_or(DraftError::ProspectNotFound(id))?)
    }

    fn dossier(prospect: &Prospect) -> Result<&str, Error> {
        prospect
            .dossier
            .as_deref()
            .ok_or_else(|| DraftError::MissingDossier(prospect.id).into())
    }

    /// Map batch failures onto draft errors callers can act on.
    fn map_write(err: DatabaseError, draft: &OutreachDraft) -> Error {
        match err {
            DatabaseError::Conflict { .. } => DraftError::AlreadyDecided {
                id: draft.id,
                decision: "decided".to_string(),
            }
            .into(),
            e if e.is_unique_violation() => DraftError::DuplicatePending {
                channel: draft.channel.to_string(),
                step: draft.sequence_step,
            }
            .into(),
            e => e.into(),
        }
    }

    fn ensure_pending(draft: &OutreachDraft) -> Result<(), Error> {
        if draft.approval.is_decided() {
            return Err(DraftError::AlreadyDecided {
                id: draft.id,
                decision: draft.approval.as_str().to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ── Composition ─────────────────────────────────────────────────

    /// Compose the first email for a `ready` prospect.
    pub async fn compose_initial(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        let prospect = self.load_prospect(prospect_id).await?;
        let dossier = Self::dossier(&prospect)?;
        let email = self.composer.compose_email(dossier, 1, None).await?;

        let draft = OutreachDraft::pending(
            prospect.id,
            Channel::Email,
            1,
            Some(email.subject.clone()),
            email.body,
        );
        self.db
            .apply(vec![
                WriteOp::InsertDraft(draft.clone()),
                WriteOp::AdvanceProspect {
                    id: prospect.id,
                    from: ProspectStatus::Ready,
                    to: ProspectStatus::Drafted,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::DraftCreated,
                    json!({ "draft_id": draft.id, "channel": "email", "step": 1, "subject": email.subject }),
                )),
            ])
            .await
            .map_err(|e| Self::map_write(e, &draft))?;

        tracing::info!(%prospect_id, draft_id = %draft.id, "Initial draft composed");
        Ok(draft)
    }

    // ── Review ──────────────────────────────────────────────────────

    /// Approve a pending draft, optionally with edits. Email drafts are
    /// handed to the send adapter; a send failure leaves the approval in place.
    pub async fn approve(&self, draft_id: Uuid, edits: DraftEdits) -> Result<OutreachDraft, Error> {
        let draft = self.load_draft(draft_id).await?;
        Self::ensure_pending(&draft)?;
        let prospect = self.load_prospect(draft.prospect_id).await?;

        let edits = DraftEdits {
            subject: edits.subject.filter(|s| !s.trim().is_empty()),
            body: edits.body.filter(|b| !b.trim().is_empty()),
        };
        let edited = edits.subject.is_some() || edits.body.is_some();

        self.db
            .apply(vec![
                WriteOp::DecideDraft {
                    id: draft_id,
                    decision: Decision::Approve {
                        at: Utc::now(),
                        edits,
                    },
                },
                WriteOp::AdvanceProspect {
                    id: prospect.id,
                    from: ProspectStatus::Drafted,
                    to: ProspectStatus::Approved,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::DraftApproved,
                    json!({ "draft_id": draft_id, "step": draft.sequence_step, "edited": edited }),
                )),
            ])
            .await
            .map_err(|e| Self::map_write(e, &draft))?;

        tracing::info!(%draft_id, step = draft.sequence_step, edited, "Draft approved");
        self.outbox.publish(DomainEvent::DraftApproved {
            draft_id,
            prospect_id: prospect.id,
            name: prospect.full_name.clone(),
        });

        if draft.channel.is_automatable() {
            if let Err(e) = self.sender.send(draft_id).await {
                tracing::error!(%draft_id, "Send after approval failed: {e}");
            }
        }

        self.load_draft(draft_id).await
    }

    /// Reject a pending draft.
    pub async fn reject(&self, draft_id: Uuid, reason: &str) -> Result<OutreachDraft, Error> {
        let draft = self.load_draft(draft_id).await?;
        Self::ensure_pending(&draft)?;

        self.db
            .apply(vec![
                WriteOp::DecideDraft {
                    id: draft_id,
                    decision: Decision::Reject {
                        reason: reason.to_string(),
                    },
                },
                WriteOp::AdvanceProspect {
                    id: draft.prospect_id,
                    from: ProspectStatus::Drafted,
                    to: ProspectStatus::Rejected,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    draft.prospect_id,
                    ActivityAction::DraftRejected,
                    json!({ "draft_id": draft_id, "reason": reason }),
                )),
            ])
            .await
            .map_err(|e| Self::map_write(e, &draft))?;

        tracing::info!(%draft_id, reason, "Draft rejected");
        self.load_draft(draft_id).await
    }

    /// Replace a pending draft with a freshly composed one. The old draft is
    /// rejected as "Regenerated"; nothing changes if composition fails.
    pub async fn regenerate(&self, draft_id: Uuid) -> Result<OutreachDraft, Error> {
        let old = self.load_draft(draft_id).await?;
        Self::ensure_pending(&old)?;
        let prospect = self.load_prospect(old.prospect_id).await?;
        let dossier = Self::dossier(&prospect)?;

        let (subject, body) = match old.channel {
            Channel::Email => {
                let previous = if old.sequence_step > 1 {
                    self.previous_email(prospect.id, old.sequence_step).await?
                } else {
                    None
                };
                let email = self
                    .composer
                    .compose_email(dossier, old.sequence_step, previous.as_deref())
                    .await?;
                (Some(email.subject), email.body)
            }
            Channel::LinkedinManual if old.sequence_step <= 1 => (
                old.subject.clone(),
                self.composer.compose_linkedin_connection(dossier).await?,
            ),
            Channel::LinkedinManual => (
                old.subject.clone(),
                self.composer.compose_linkedin_message(dossier).await?,
            ),
        };

        let fresh = OutreachDraft::pending(prospect.id, old.channel, old.sequence_step, subject, body)
            .with_delivery(old.delivery.clone());
        self.db
            .apply(vec![
                WriteOp::DecideDraft {
                    id: old.id,
                    decision: Decision::Reject {
                        reason: REGENERATED_REASON.to_string(),
                    },
                },
                WriteOp::InsertDraft(fresh.clone()),
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::DraftRegenerated,
                    json!({ "old_draft_id": old.id, "new_draft_id": fresh.id, "step": old.sequence_step }),
                )),
            ])
            .await
            .map_err(|e| Self::map_write(e, &old))?;

        tracing::info!(old = %old.id, new = %fresh.id, "Draft regenerated");
        Ok(fresh)
    }

    /// Subject and body of the approved email for the step before `step`.
    async fn previous_email(&self, prospect_id: Uuid, step: u32) -> Result<Option<String>, Error> {
        let drafts = self.db.list_drafts_for_prospect(prospect_id).await?;
        Ok(drafts
            .iter()
            .filter(|d| {
                d.channel == Channel::Email
                    && d.sequence_step + 1 == step
                    && d.approval == Approval::Approved
            })
            .last()
            .map(|d| ComposedEmail::as_previous(d.subject.as_deref(), d.effective_body())))
    }

    // ── Manual channel ──────────────────────────────────────────────

    /// Queue a LinkedIn connection note for review.
    pub async fn queue_connection_request(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        let prospect = self.load_prospect(prospect_id).await?;
        let note = self
            .composer
            .compose_linkedin_connection(Self::dossier(&prospect)?)
            .await?;
        self.queue_manual(&prospect, 1, CONNECTION_SUBJECT, note).await
    }

    /// Queue a LinkedIn follow-up message for review.
    pub async fn queue_linkedin_message(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        let prospect = self.load_prospect(prospect_id).await?;
        let message = self
            .composer
            .compose_linkedin_message(Self::dossier(&prospect)?)
            .await?;
        self.queue_manual(&prospect, 2, MESSAGE_SUBJECT, message).await
    }

    async fn queue_manual(
        &self,
        prospect: &Prospect,
        step: u32,
        subject: &str,
        body: String,
    ) -> Result<OutreachDraft, Error> {
        let draft = OutreachDraft::pending(
            prospect.id,
            Channel::LinkedinManual,
            step,
            Some(subject.to_string()),
            body,
        );
        self.db
            .apply(vec![
                WriteOp::InsertDraft(draft.clone()),
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect.id,
                    ActivityAction::DraftCreated,
                    json!({ "draft_id": draft.id, "channel": "linkedin", "step": step }),
                )),
            ])
            .await
            .map_err(|e| Self::map_write(e, &draft))?;
        tracing::info!(prospect_id = %prospect.id, step, "LinkedIn draft queued");
        Ok(draft)
    }

    /// Approved, unsent LinkedIn drafts waiting for a human.
    pub async fn pending_manual_actions(&self) -> Result<Vec<ManualAction>, Error> {
        let drafts = self.db.list_approved_unsent(Channel::LinkedinManual).await?;
        let mut actions = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(prospect) = self.db.get_prospect(draft.prospect_id).await? else {
                tracing::warn!(draft_id = %draft.id, "Manual draft without prospect, skipping");
                continue;
            };
            actions.push(ManualAction {
                draft_id: draft.id,
                prospect_id: prospect.id,
                prospect_name: prospect.full_name,
                profile_url: prospect.profile_url,
                kind: if draft.sequence_step <= 1 {
                    ManualActionKind::ConnectionRequest
                } else {
                    ManualActionKind::Message
                },
                message: draft.effective_body().to_string(),
                approved_at: draft.approved_at,
            });
        }
        Ok(actions)
    }

    /// Confirm that a human sent an approved LinkedIn draft.
    pub async fn mark_manual_sent(&self, draft_id: Uuid) -> Result<OutreachDraft, Error> {
        let draft = self.load_draft(draft_id).await?;
        if draft.channel != Channel::LinkedinManual {
            return Err(DraftError::WrongChannel {
                id: draft_id,
                channel: draft.channel.to_string(),
            }
            .into());
        }
        if draft.approval != Approval::Approved {
            return Err(DraftError::NotApproved(draft_id).into());
        }

        let action = if draft.sequence_step <= 1 {
            ActivityAction::LinkedinConnectionSent
        } else {
            ActivityAction::LinkedinMessageSent
        };
        self.db
            .apply(vec![
                WriteOp::MarkSent {
                    draft_id,
                    sent_at: Utc::now(),
                },
                WriteOp::AdvanceProspect {
                    id: draft.prospect_id,
                    from: ProspectStatus::Approved,
                    to: ProspectStatus::Sent,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    draft.prospect_id,
                    action,
                    json!({ "draft_id": draft_id, "step": draft.sequence_step }),
                )),
            ])
            .await?;

        tracing::info!(%draft_id, %action, "Manual send recorded");
        self.load_draft(draft_id).await
    }
}
