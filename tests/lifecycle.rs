//! End-to-end lifecycle scenarios against an in-memory store with stub
//! collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use prospect_engine::activity::{ActivityAction, ActivityEntry};
use prospect_engine::config::EngineConfig;
use prospect_engine::engine::{Engine, EngineDeps};
use prospect_engine::error::{DraftError, Error, LlmError, ServiceError, StatusError};
use prospect_engine::llm::LlmProvider;
use prospect_engine::notify::{DomainEvent, Outbox};
use prospect_engine::outreach::model::{DeliveryIds, Decision};
use prospect_engine::outreach::{Approval, Channel, DraftEdits, OutreachDraft, ProgressionSummary};
use prospect_engine::prospects::model::{
    CompanyProfile, Firm, LeadSource, Profile, Prospect, ProspectStatus,
};
use prospect_engine::prospects::scoring::ScoringEngine;
use prospect_engine::scout::{LeadHints, LeadIdentity};
use prospect_engine::services::{
    DeliveryService, LeadRecord, LeadStatus, NewsFeed, NewsItem, ProfileEnricher, SequenceStep,
};
use prospect_engine::store::{Database, LibSqlBackend, QueryType, WriteOp};

// ── Stubs ───────────────────────────────────────────────────────────

struct CountingEnricher {
    calls: AtomicUsize,
}

#[async_trait]
impl ProfileEnricher for CountingEnricher {
    async fn fetch_profile(&self, _profile_url: &str) -> Option<Profile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(Profile {
            full_name: "Ada Lovelace".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            title: Some("Head of AI".into()),
            company: Some("Acme Capital Partners".into()),
            hired_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            skills: vec!["Machine Learning".into(), "Python".into()],
            personal_emails: vec!["ada@example.com".into()],
            ..Default::default()
        })
    }

    async fn fetch_company(&self, _company_url: &str) -> Option<CompanyProfile> {
        None
    }
}

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
        Ok("SUBJECT: Quick question\nBODY:\nHello from the test".into())
    }
}

struct ScriptedDelivery {
    replied: AtomicBool,
    polls: AtomicUsize,
    campaigns: AtomicUsize,
    steps: AtomicUsize,
}

#[async_trait]
impl DeliveryService for ScriptedDelivery {
    async fn create_campaign(&self, _name: &str) -> Result<String, ServiceError> {
        let n = self.campaigns.fetch_add(1, Ordering::SeqCst);
        Ok(format!("camp-{}", n + 1))
    }

    async fn add_lead(&self, _campaign_id: &str, _lead: &LeadRecord) -> Result<String, ServiceError> {
        Ok("lead-1".into())
    }

    async fn add_sequence_step(&self, _campaign_id: &str, _step: &SequenceStep) -> Result<(), ServiceError> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lead_status(&self, _campaign_id: &str, _lead_id: &str) -> Result<LeadStatus, ServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(LeadStatus::from_raw(json!({
            "replied": self.replied.load(Ordering::SeqCst),
        })))
    }
}

struct QuietFeed;

#[async_trait]
impl NewsFeed for QuietFeed {
    async fn search(&self, _query: &str) -> Result<Vec<NewsItem>, ServiceError> {
        Ok(Vec::new())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    engine: Arc<Engine>,
    db: Arc<dyn Database>,
    enricher: Arc<CountingEnricher>,
    llm: Arc<EchoLlm>,
    delivery: Arc<ScriptedDelivery>,
    _events: tokio::sync::mpsc::Receiver<DomainEvent>,
}

async fn harness(with_llm: bool) -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    db.insert_firm(&Firm::new("Acme Capital").with_website("https://www.acme.example"))
        .await
        .unwrap();

    let enricher = Arc::new(CountingEnricher {
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(EchoLlm {
        calls: AtomicUsize::new(0),
    });
    let delivery = Arc::new(ScriptedDelivery {
        replied: AtomicBool::new(false),
        polls: AtomicUsize::new(0),
        campaigns: AtomicUsize::new(0),
        steps: AtomicUsize::new(0),
    });

    let enricher_dep: Arc<dyn ProfileEnricher> = enricher.clone();
    let llm_dep: Arc<dyn LlmProvider> = llm.clone();
    let delivery_dep: Arc<dyn DeliveryService> = delivery.clone();
    let deps = EngineDeps {
        db: Arc::clone(&db),
        llm: with_llm.then_some(llm_dep),
        enricher: Some(enricher_dep),
        emails: None,
        roles: None,
        news: Arc::new(QuietFeed),
        actors: None,
        delivery: Some(delivery_dep),
    };
    let (outbox, events) = Outbox::channel(64);
    let engine = Arc::new(Engine::new(EngineConfig::default(), deps, outbox));

    Harness {
        engine,
        db,
        enricher,
        llm,
        delivery,
        _events: events,
    }
}

fn head_of_ai(url: &str) -> LeadIdentity {
    LeadIdentity {
        profile_url: url.into(),
        title: "Head of AI".into(),
        source: LeadSource::NewsMonitor,
    }
}

/// A prospect already in `sent` with an approved, delivered step-1 email.
async fn sent_prospect(db: &Arc<dyn Database>, approved_at: DateTime<Utc>) -> Prospect {
    prospect_with_step_one(db, ProspectStatus::Sent, approved_at).await
}

async fn prospect_with_step_one(
    db: &Arc<dyn Database>,
    status: ProspectStatus,
    approved_at: DateTime<Utc>,
) -> Prospect {
    let mut prospect = Prospect::new("Grace Hopper", "https://linkedin.com/in/grace", LeadSource::Manual);
    prospect.status = status;
    prospect.email = Some("grace@example.com".into());
    prospect.dossier = Some("# Grace Hopper".into());
    db.apply(vec![WriteOp::InsertProspect(Box::new(prospect.clone()))])
        .await
        .unwrap();
    approve_step(db, prospect.id, 1, approved_at).await;
    prospect
}

async fn approve_step(db: &Arc<dyn Database>, prospect_id: Uuid, step: u32, at: DateTime<Utc>) {
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
                campaign_id: "camp-existing".into(),
                lead_id: "lead-existing".into(),
            },
            sent_at: at,
        },
    ])
    .await
    .unwrap();
}

async fn pending_steps(db: &Arc<dyn Database>, prospect_id: Uuid) -> Vec<u32> {
    db.list_drafts_for_prospect(prospect_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.approval == Approval::Pending)
        .map(|d| d.sequence_step)
        .collect()
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_fresh_lead_is_enriched_and_persisted() {
    let h = harness(false).await;
    let identity = head_of_ai("https://linkedin.com/in/ada");

    let pre = ScoringEngine::new(0.40, 0.65).pre_score("Head of AI", &LeadSource::NewsMonitor, false, false);
    assert_eq!(pre.total, 0.55);

    let id = h
        .engine
        .process_discovered_lead(&identity, &LeadHints::default())
        .await
        .unwrap()
        .expect("lead above threshold");
    assert_eq!(h.enricher.calls.load(Ordering::SeqCst), 1);

    let prospect = h.db.get_prospect(id).await.unwrap().unwrap();
    assert!(matches!(prospect.status, ProspectStatus::Ready | ProspectStatus::Drafted));
    assert!(prospect.relevance_score > 0.0);
    assert!(!prospect.score_breakdown.is_empty());
    assert!(prospect.firm_id.is_some());
    assert_eq!(prospect.email.as_deref(), Some("ada@example.com"));
    assert!(prospect.dossier.is_some());
}

#[tokio::test]
async fn scenario_b_due_follow_up_is_composed() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(4)).await;

    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(
        summary,
        ProgressionSummary {
            composed: 1,
            replied: 0,
            skipped: 0
        }
    );
    assert_eq!(pending_steps(&h.db, prospect.id).await, vec![2]);

    let drafts = h.db.list_drafts_for_prospect(prospect.id).await.unwrap();
    let step_two = drafts.iter().find(|d| d.sequence_step == 2).unwrap();
    assert_eq!(step_two.delivery.as_ref().unwrap().campaign_id, "camp-existing");
}

#[tokio::test]
async fn scenario_c_follow_up_not_yet_due() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(1)).await;

    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(
        summary,
        ProgressionSummary {
            composed: 0,
            replied: 0,
            skipped: 1
        }
    );
    assert!(pending_steps(&h.db, prospect.id).await.is_empty());
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_d_reply_retires_the_sequence() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(1)).await;
    h.delivery.replied.store(true, Ordering::SeqCst);

    let sync = h.engine.sync_delivery_statuses().await.unwrap();
    assert_eq!(sync.replies, 1);
    let stored = h.db.get_prospect(prospect.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProspectStatus::Replied);

    // Well past every delay, the replied prospect is never progressed again.
    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(summary, ProgressionSummary::default());
    assert!(pending_steps(&h.db, prospect.id).await.is_empty());
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

// ── Properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn rediscovery_returns_the_same_prospect() {
    let h = harness(false).await;
    let identity = head_of_ai("https://linkedin.com/in/ada");

    let first = h.engine.process_discovered_lead(&identity, &LeadHints::default()).await.unwrap();
    let second = h.engine.process_discovered_lead(&identity, &LeadHints::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.db.list_prospects_by_status(ProspectStatus::Ready).await.unwrap().len(), 1);
}

#[tokio::test]
async fn below_threshold_never_enriches() {
    let h = harness(false).await;
    let identity = LeadIdentity {
        profile_url: "https://linkedin.com/in/office".into(),
        title: "Office Manager".into(),
        source: LeadSource::Other("forum".into()),
    };

    let result = h.engine.process_discovered_lead(&identity, &LeadHints::default()).await.unwrap();
    assert!(result.is_none());
    assert_eq!(h.enricher.calls.load(Ordering::SeqCst), 0);
    assert!(
        h.db.find_prospect_by_profile_url("https://linkedin.com/in/office")
            .await
            .unwrap()
            .is_none()
    );
}

#[test]
fn signals_never_lower_the_pre_score() {
    let scoring = ScoringEngine::new(0.40, 0.65);
    let titles = ["Head of AI", "Chief Technology Officer", "Senior Data Engineer", "Barista", ""];
    let sources = [
        LeadSource::PeopleSearch,
        LeadSource::Manual,
        LeadSource::JobMonitor,
        LeadSource::Other("x".into()),
    ];
    for title in titles {
        for source in &sources {
            let base = scoring.pre_score(title, source, false, false).total;
            for (hiring, news) in [(true, false), (false, true), (true, true)] {
                let with = scoring.pre_score(title, source, hiring, news).total;
                assert!(with >= base, "{title} {source:?}: {with} < {base}");
                assert!((0.0..=1.0).contains(&with));
            }
        }
    }
}

#[tokio::test]
async fn one_pending_draft_per_channel_and_step() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(1)).await;

    h.engine.queue_connection_request(prospect.id).await.unwrap();
    let duplicate = h.engine.queue_connection_request(prospect.id).await;
    assert!(matches!(
        duplicate,
        Err(Error::Draft(DraftError::DuplicatePending { step: 1, .. }))
    ));
    let linkedin_pending = h
        .db
        .list_pending_drafts()
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.prospect_id == prospect.id && d.channel == Channel::LinkedinManual)
        .count();
    assert_eq!(linkedin_pending, 1);
}

#[tokio::test]
async fn step_two_waits_for_the_full_delay() {
    let h = harness(true).await;
    let early = sent_prospect(&h.db, Utc::now() - Duration::days(3) + Duration::hours(1)).await;

    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(summary.composed, 0);
    assert!(pending_steps(&h.db, early.id).await.is_empty());

    // Move the approval back past T+3d.
    let h = harness(true).await;
    let due = sent_prospect(&h.db, Utc::now() - Duration::days(3) - Duration::minutes(1)).await;
    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(summary.composed, 1);
    let again = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(again.composed, 0);
    assert_eq!(pending_steps(&h.db, due.id).await, vec![2]);
}

#[tokio::test]
async fn reply_short_circuits_a_due_step() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(10)).await;
    h.delivery.replied.store(true, Ordering::SeqCst);

    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(
        summary,
        ProgressionSummary {
            composed: 0,
            replied: 1,
            skipped: 0
        }
    );
    let stored = h.db.get_prospect(prospect.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProspectStatus::Replied);
    assert!(pending_steps(&h.db, prospect.id).await.is_empty());
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn final_step_is_never_progressed() {
    let h = harness(true).await;
    let long_ago = Utc::now() - Duration::days(60);
    let prospect = sent_prospect(&h.db, long_ago).await;
    for step in 2..=4 {
        approve_step(&h.db, prospect.id, step, long_ago).await;
    }

    for _ in 0..2 {
        let summary = h.engine.check_sequence_progression().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.composed, 0);
    }
    assert_eq!(h.delivery.polls.load(Ordering::SeqCst), 0);
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

// ── Review flow ─────────────────────────────────────────────────────

#[tokio::test]
async fn approval_sends_and_is_decided_once() {
    let h = harness(true).await;
    let id = h
        .engine
        .process_discovered_lead(&head_of_ai("https://linkedin.com/in/ada"), &LeadHints::default())
        .await
        .unwrap()
        .unwrap();
    let prospect = h.db.get_prospect(id).await.unwrap().unwrap();
    assert_eq!(prospect.status, ProspectStatus::Drafted);

    let pending = h.db.list_pending_drafts().await.unwrap();
    assert_eq!(pending.len(), 1);
    let draft_id = pending[0].id;

    let approved = h
        .engine
        .approve(
            draft_id,
            DraftEdits {
                subject: None,
                body: Some("Edited by hand".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.approval, Approval::Approved);
    assert_eq!(approved.effective_body(), "Edited by hand");
    assert!(approved.sent_at.is_some());
    assert_eq!(approved.delivery.as_ref().unwrap().campaign_id, "camp-1");
    assert_eq!(h.delivery.steps.load(Ordering::SeqCst), 1);

    let prospect = h.db.get_prospect(id).await.unwrap().unwrap();
    assert_eq!(prospect.status, ProspectStatus::Sent);

    let second = h.engine.reject(draft_id, "changed my mind").await;
    assert!(matches!(
        second,
        Err(Error::Draft(DraftError::AlreadyDecided { .. }))
    ));
    let unchanged = h.db.get_draft(draft_id).await.unwrap().unwrap();
    assert_eq!(unchanged.approval, Approval::Approved);
    assert_eq!(h.delivery.campaigns.load(Ordering::SeqCst), 1);

    let status = h.engine.sequence_status(id).await.unwrap().unwrap();
    assert_eq!(status.current_step, 1);
    assert!(!status.has_reply);
}

#[tokio::test]
async fn regenerate_replaces_the_pending_draft() {
    let h = harness(true).await;
    let id = h
        .engine
        .process_discovered_lead(&head_of_ai("https://linkedin.com/in/ada"), &LeadHints::default())
        .await
        .unwrap()
        .unwrap();
    let old = h.db.list_pending_drafts().await.unwrap().remove(0);

    let fresh = h.engine.regenerate(old.id).await.unwrap();
    assert_ne!(fresh.id, old.id);
    assert_eq!(fresh.sequence_step, 1);

    let old = h.db.get_draft(old.id).await.unwrap().unwrap();
    assert_eq!(old.approval, Approval::Rejected);
    assert_eq!(old.rejection_reason.as_deref(), Some("Regenerated"));
    assert_eq!(pending_steps(&h.db, id).await, vec![1]);
}

#[tokio::test]
async fn manual_linkedin_flow() {
    let h = harness(true).await;
    let id = h
        .engine
        .process_discovered_lead(&head_of_ai("https://linkedin.com/in/ada"), &LeadHints::default())
        .await
        .unwrap()
        .unwrap();

    let note = h.engine.queue_connection_request(id).await.unwrap();
    assert_eq!(note.channel, Channel::LinkedinManual);
    assert!(h.engine.pending_manual_actions().await.unwrap().is_empty());

    h.engine.approve(note.id, DraftEdits::default()).await.unwrap();
    let actions = h.engine.pending_manual_actions().await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].draft_id, note.id);
    assert_eq!(h.delivery.campaigns.load(Ordering::SeqCst), 0);

    let sent = h.engine.mark_manual_sent(note.id).await.unwrap();
    assert!(sent.sent_at.is_some());
    assert!(h.engine.pending_manual_actions().await.unwrap().is_empty());
}

// ── Status overrides ────────────────────────────────────────────────

#[tokio::test]
async fn meeting_booked_is_audited() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(1)).await;

    let updated = h
        .engine
        .set_prospect_status(prospect.id, ProspectStatus::Meeting)
        .await
        .unwrap();
    assert_eq!(updated.status, ProspectStatus::Meeting);

    let activity = h.db.list_activity(Some(prospect.id), 10).await.unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].action, ActivityAction::StatusChanged);
    assert_eq!(activity[0].detail["from"], "sent");
    assert_eq!(activity[0].detail["to"], "meeting");
}

#[tokio::test]
async fn illegal_override_is_refused_without_audit() {
    let h = harness(true).await;
    let prospect = sent_prospect(&h.db, Utc::now() - Duration::days(1)).await;

    let result = h
        .engine
        .set_prospect_status(prospect.id, ProspectStatus::Paused)
        .await;
    assert!(matches!(
        result,
        Err(Error::Status(StatusError::IllegalTransition {
            from: ProspectStatus::Sent,
            to: ProspectStatus::Paused,
            ..
        }))
    ));
    let stored = h.db.get_prospect(prospect.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProspectStatus::Sent);
    assert!(h.db.list_activity(Some(prospect.id), 10).await.unwrap().is_empty());

    let missing = h
        .engine
        .set_prospect_status(Uuid::new_v4(), ProspectStatus::Rejected)
        .await;
    assert!(matches!(
        missing,
        Err(Error::Status(StatusError::ProspectNotFound(_)))
    ));
}

#[tokio::test]
async fn paused_prospect_is_never_progressed() {
    let h = harness(true).await;
    let prospect = prospect_with_step_one(
        &h.db,
        ProspectStatus::Approved,
        Utc::now() - Duration::days(10),
    )
    .await;

    h.engine
        .set_prospect_status(prospect.id, ProspectStatus::Paused)
        .await
        .unwrap();

    let summary = h.engine.check_sequence_progression().await.unwrap();
    assert_eq!(summary, ProgressionSummary::default());
    assert!(pending_steps(&h.db, prospect.id).await.is_empty());
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.db.get_prospect(prospect.id).await.unwrap().unwrap().status,
        ProspectStatus::Paused
    );
}

// ── Concurrent jobs ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_keep_their_own_writes() {
    let h = harness(true).await;
    for i in 0..30 {
        h.db.insert_firm(&Firm::new(&format!("Fund {i}"))).await.unwrap();
    }
    let firms = h.db.list_monitored_firms().await.unwrap();

    // A job whose batches keep failing shares the store with a news scan
    // that records a dedup entry per firm.
    let stop = Arc::new(AtomicBool::new(false));
    let failing = {
        let db = Arc::clone(&h.db);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut failures = 0;
            while !stop.load(Ordering::SeqCst) || failures == 0 {
                let batch = vec![
                    WriteOp::AppendActivity(ActivityEntry::new(
                        None,
                        ActivityAction::DraftRejected,
                        json!({}),
                    )),
                    WriteOp::DecideDraft {
                        id: Uuid::new_v4(),
                        decision: Decision::Reject {
                            reason: "gone".into(),
                        },
                    },
                ];
                assert!(db.apply(batch).await.is_err());
                failures += 1;
                tokio::task::yield_now().await;
            }
        })
    };

    h.engine.run_news_scan().await;
    stop.store(true, Ordering::SeqCst);
    failing.await.unwrap();

    for firm in &firms {
        let record = h
            .db
            .get_search_query(QueryType::News, &firm.id.to_string())
            .await
            .unwrap();
        assert!(record.is_some(), "{} scan was lost", firm.name);
    }
    assert!(h.db.list_activity(None, 10).await.unwrap().is_empty());
}
