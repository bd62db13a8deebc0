//! Composition root.
//!
//! [`Engine`] owns one instance of every lifecycle component and exposes
//! the operations the dashboard and CLI collaborators call. Collaborators
//! are injected through [`EngineDeps`]; nothing is a process-wide global.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::activity::{ActivityAction, ActivityEntry};
use crate::config::{Credentials, EngineConfig, ScheduleConfig};
use crate::error::{ConfigError, Error, LlmError, StatusError};
use crate::llm::{LlmProvider, create_provider};
use crate::notify::Outbox;
use crate::outreach::prompts::Sender;
use crate::outreach::{
    Composer, DraftEdits, DraftStateMachine, ExternalSendAdapter, ManualAction, OutreachDraft,
    ProgressionSummary, SendOutcome, SequenceScheduler, SequenceStatus, SyncSummary,
};
use crate::prospects::model::{Prospect, ProspectStatus};
use crate::prospects::scoring::ScoringEngine;
use crate::scheduler::{Scheduler, Trigger};
use crate::scout::{
    DedupGate, EnrichmentPipeline, JobMonitor, LeadHints, LeadIdentity, NewsMonitor, PeopleSearch,
    ScanSummary, Scout,
};
use crate::services::apify::ApifyClient;
use crate::services::hunter::HunterClient;
use crate::services::news_rss::GoogleNewsRss;
use crate::services::proxycurl::ProxycurlClient;
use crate::services::smartlead::SmartleadClient;
use crate::services::{
    ActorRunner, CancelToken, DeliveryService, EmailFinder, NewsFeed, ProfileEnricher, RoleLookup,
};
use crate::store::{Database, WriteOp};

/// External collaborators. `None` disables the dependent step.
pub struct EngineDeps {
    pub db: Arc<dyn Database>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub enricher: Option<Arc<dyn ProfileEnricher>>,
    pub emails: Option<Arc<dyn EmailFinder>>,
    pub roles: Option<Arc<dyn RoleLookup>>,
    pub news: Arc<dyn NewsFeed>,
    pub actors: Option<Arc<dyn ActorRunner>>,
    pub delivery: Option<Arc<dyn DeliveryService>>,
}

impl EngineDeps {
    /// Build the production clients for whichever credentials are present.
    pub fn from_credentials(
        db: Arc<dyn Database>,
        credentials: &Credentials,
        model: &str,
    ) -> Result<Self, LlmError> {
        let llm = create_provider(credentials.anthropic.as_ref(), model)?;

        let proxycurl = credentials
            .proxycurl
            .clone()
            .map(|key| Arc::new(ProxycurlClient::new(key)));
        let enricher = proxycurl
            .clone()
            .map(|c| -> Arc<dyn ProfileEnricher> { c });
        let roles = proxycurl.map(|c| -> Arc<dyn RoleLookup> { c });

        let emails = credentials
            .hunter
            .clone()
            .map(|key| -> Arc<dyn EmailFinder> { Arc::new(HunterClient::new(key)) });
        let actors = credentials
            .apify
            .clone()
            .map(|key| -> Arc<dyn ActorRunner> { Arc::new(ApifyClient::new(key)) });
        let delivery = credentials.smartlead.clone().map(|key| -> Arc<dyn DeliveryService> {
            Arc::new(SmartleadClient::new(
                key,
                credentials.smartlead_sending_account.clone(),
            ))
        });

        for (name, present) in [
            ("enrichment", enricher.is_some()),
            ("email discovery", emails.is_some()),
            ("job scraping", actors.is_some()),
            ("delivery", delivery.is_some()),
        ] {
            if !present {
                tracing::warn!(service = name, "Credential missing, service disabled");
            }
        }

        Ok(Self {
            db,
            llm,
            enricher,
            emails,
            roles,
            news: Arc::new(GoogleNewsRss::default()),
            actors,
            delivery,
        })
    }
}

pub struct Engine {
    db: Arc<dyn Database>,
    drafts: Arc<DraftStateMachine>,
    sender: Arc<ExternalSendAdapter>,
    sequence: SequenceScheduler,
    scout: Scout,
}

impl Engine {
    pub fn new(config: EngineConfig, deps: EngineDeps, outbox: Outbox) -> Self {
        let db = deps.db;
        let composer = Arc::new(Composer::new(
            deps.llm,
            Sender {
                name: config.sender_name.clone(),
                company: config.sender_company.clone(),
            },
        ));
        let sender = Arc::new(ExternalSendAdapter::new(
            Arc::clone(&db),
            deps.delivery.clone(),
            config.clone(),
            outbox.clone(),
        ));
        let drafts = Arc::new(DraftStateMachine::new(
            Arc::clone(&db),
            Arc::clone(&composer),
            Arc::clone(&sender),
            outbox.clone(),
        ));
        let sequence = SequenceScheduler::new(
            Arc::clone(&db),
            Arc::clone(&composer),
            deps.delivery,
            config.clone(),
            outbox.clone(),
        );

        let dedup = DedupGate::new(Arc::clone(&db));
        let pipeline = Arc::new(EnrichmentPipeline::new(
            Arc::clone(&db),
            dedup.clone(),
            ScoringEngine::new(config.enrichment_threshold, config.notification_threshold),
            deps.enricher,
            deps.emails,
            Arc::clone(&drafts),
            composer.is_enabled(),
            outbox,
        ));
        let scout = Scout::new(
            NewsMonitor::new(deps.news, Arc::clone(&db), dedup.clone()),
            JobMonitor::new(deps.actors, Arc::clone(&db), dedup.clone()),
            PeopleSearch::new(deps.roles, Arc::clone(&db), dedup),
            pipeline,
        );

        Self {
            db,
            drafts,
            sender,
            sequence,
            scout,
        }
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    // ── Status overrides ────────────────────────────────────────────

    /// Administrative status change (pause, reject, meeting booked).
    ///
    /// The move must be a legal lifecycle transition; it is written together
    /// with its `status_changed` audit entry. Setting the current status
    /// again is a no-op.
    pub async fn set_prospect_status(
        &self,
        prospect_id: Uuid,
        to: ProspectStatus,
    ) -> Result<Prospect, Error> {
        let prospect = self
            .db
            .get_prospect(prospect_id)
            .await?
            .ok_or(StatusError::ProspectNotFound(prospect_id))?;
        let from = prospect.status;
        if from == to {
            return Ok(prospect);
        }
        if !from.can_transition_to(to) {
            return Err(StatusError::IllegalTransition {
                id: prospect_id,
                from,
                to,
            }
            .into());
        }

        self.db
            .apply(vec![
                WriteOp::OverrideStatus {
                    id: prospect_id,
                    from,
                    to,
                },
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    prospect_id,
                    ActivityAction::StatusChanged,
                    json!({ "from": from.as_str(), "to": to.as_str() }),
                )),
            ])
            .await?;
        tracing::info!(prospect_id = %prospect_id, %from, %to, "Prospect status changed");

        self.db
            .get_prospect(prospect_id)
            .await?
            .ok_or_else(|| StatusError::ProspectNotFound(prospect_id).into())
    }

    // ── Discovery ───────────────────────────────────────────────────

    pub async fn process_discovered_lead(
        &self,
        identity: &LeadIdentity,
        hints: &LeadHints,
    ) -> Result<Option<Uuid>, Error> {
        self.scout.pipeline().process_discovered_lead(identity, hints).await
    }

    pub async fn run_full_scan(&self, cancel: &CancelToken) -> ScanSummary {
        self.scout.run_full_scan(cancel).await
    }

    pub async fn run_people_scan(&self, cancel: &CancelToken) -> ScanSummary {
        self.scout.run_people_scan(cancel).await
    }

    pub async fn run_news_scan(&self) -> ScanSummary {
        self.scout.run_news_scan().await
    }

    // ── Sequencing ──────────────────────────────────────────────────

    pub async fn check_sequence_progression(&self) -> Result<ProgressionSummary, Error> {
        self.sequence.check_sequence_progression().await
    }

    pub async fn sync_delivery_statuses(&self) -> Result<SyncSummary, Error> {
        self.sequence.sync_delivery_statuses().await
    }

    pub async fn sequence_status(&self, prospect_id: Uuid) -> Result<Option<SequenceStatus>, Error> {
        self.sequence.sequence_status(prospect_id).await
    }

    // ── Drafts ──────────────────────────────────────────────────────

    pub async fn compose_initial(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        self.drafts.compose_initial(prospect_id).await
    }

    pub async fn approve(&self, draft_id: Uuid, edits: DraftEdits) -> Result<OutreachDraft, Error> {
        self.drafts.approve(draft_id, edits).await
    }

    pub async fn reject(&self, draft_id: Uuid, reason: &str) -> Result<OutreachDraft, Error> {
        self.drafts.reject(draft_id, reason).await
    }

    pub async fn regenerate(&self, draft_id: Uuid) -> Result<OutreachDraft, Error> {
        self.drafts.regenerate(draft_id).await
    }

    /// Retry delivery of an approved email draft.
    pub async fn send(&self, draft_id: Uuid) -> Result<SendOutcome, Error> {
        self.sender.send(draft_id).await
    }

    pub async fn queue_connection_request(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        self.drafts.queue_connection_request(prospect_id).await
    }

    pub async fn queue_linkedin_message(&self, prospect_id: Uuid) -> Result<OutreachDraft, Error> {
        self.drafts.queue_linkedin_message(prospect_id).await
    }

    pub async fn pending_manual_actions(&self) -> Result<Vec<ManualAction>, Error> {
        self.drafts.pending_manual_actions().await
    }

    pub async fn mark_manual_sent(&self, draft_id: Uuid) -> Result<OutreachDraft, Error> {
        self.drafts.mark_manual_sent(draft_id).await
    }

    // ── Background jobs ─────────────────────────────────────────────

    /// Register the background jobs. The caller starts and stops the
    /// returned scheduler.
    pub fn schedule(self: &Arc<Self>, config: &ScheduleConfig) -> Result<Scheduler, ConfigError> {
        let mut scheduler = Scheduler::new();

        let engine = Arc::clone(self);
        scheduler.add_job("full_scan", Trigger::cron(&config.full_scan_cron)?, move |cancel| {
            let engine = Arc::clone(&engine);
            async move {
                engine.run_full_scan(&cancel).await;
            }
        });

        let engine = Arc::clone(self);
        scheduler.add_job("people_scan", Trigger::cron(&config.people_scan_cron)?, move |cancel| {
            let engine = Arc::clone(&engine);
            async move {
                engine.run_people_scan(&cancel).await;
            }
        });

        let engine = Arc::clone(self);
        scheduler.add_job("news_scan", Trigger::every(config.news_scan_every), move |_| {
            let engine = Arc::clone(&engine);
            async move {
                engine.run_news_scan().await;
            }
        });

        let engine = Arc::clone(self);
        scheduler.add_job(
            "sequence_check",
            Trigger::cron(&config.sequence_check_cron)?,
            move |_| {
                let engine = Arc::clone(&engine);
                async move {
                    if let Err(e) = engine.check_sequence_progression().await {
                        tracing::error!("Sequence check failed: {e}");
                    }
                }
            },
        );

        let engine = Arc::clone(self);
        scheduler.add_job("delivery_sync", Trigger::every(config.delivery_sync_every), move |_| {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(e) = engine.sync_delivery_statuses().await {
                    tracing::error!("Delivery sync failed: {e}");
                }
            }
        });

        Ok(scheduler)
    }
}
