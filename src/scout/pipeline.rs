//! Discovery → pre-score → enrichment → full score → persistence.
//!
//! Each step commits on its own. A failed external fetch degrades the
//! prospect record instead of aborting the batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::dedup::DedupGate;
use super::jobs::JobMonitor;
use super::news::NewsMonitor;
use super::people::{DiscoveredPerson, PeopleSearch};
use crate::activity::{ActivityAction, ActivityEntry};
use crate::error::Error;
use crate::notify::{DomainEvent, Outbox};
use crate::outreach::DraftStateMachine;
use crate::prospects::dossier::build_dossier;
use crate::prospects::model::{CompanyContext, Firm, LeadSource, Prospect, ProspectStatus, Profile};
use crate::prospects::scoring::{ScoringEngine, classify_role_type};
use crate::services::{CancelToken, EmailFinder, EmailMatch, ProfileEnricher};
use crate::store::{Database, WriteOp};

/// Who was discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadIdentity {
    pub profile_url: String,
    /// Title as seen at discovery time.
    pub title: String,
    pub source: LeadSource,
}

/// Signals gathered alongside the discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadHints {
    pub has_hiring_signal: bool,
    pub has_news_mention: bool,
    /// Known firm; skips name matching when set.
    pub firm_id: Option<Uuid>,
}

/// How a discovered lead was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadOutcome {
    Created(Uuid),
    Existing(Uuid),
}

impl LeadOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }
}

/// First firm whose name occurs in `employer`, in listing order.
///
/// Ambiguous when one firm name contains another ("Acme" and "Acme Growth");
/// the earlier-listed firm wins. Callers that know the firm pass its id.
pub fn match_firm<'a>(firms: &'a [Firm], employer: &str) -> Option<&'a Firm> {
    let employer = employer.to_lowercase();
    if employer.trim().is_empty() {
        return None;
    }
    firms
        .iter()
        .find(|f| !f.name.trim().is_empty() && employer.contains(&f.name.to_lowercase()))
}

pub struct EnrichmentPipeline {
    db: Arc<dyn Database>,
    dedup: DedupGate,
    scoring: ScoringEngine,
    enricher: Option<Arc<dyn ProfileEnricher>>,
    emails: Option<Arc<dyn EmailFinder>>,
    drafts: Arc<DraftStateMachine>,
    auto_draft: bool,
    outbox: Outbox,
}

impl EnrichmentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Database>,
        dedup: DedupGate,
        scoring: ScoringEngine,
        enricher: Option<Arc<dyn ProfileEnricher>>,
        emails: Option<Arc<dyn EmailFinder>>,
        drafts: Arc<DraftStateMachine>,
        auto_draft: bool,
        outbox: Outbox,
    ) -> Self {
        Self {
            db,
            dedup,
            scoring,
            enricher,
            emails,
            drafts,
            auto_draft,
            outbox,
        }
    }

    /// Run one lead through the funnel. Returns the prospect id, or `None`
    /// when the lead was gated out or could not be enriched.
    pub async fn process_discovered_lead(
        &self,
        identity: &LeadIdentity,
        hints: &LeadHints,
    ) -> Result<Option<Uuid>, Error> {
        Ok(self.process(identity, hints).await?.map(|o| o.id()))
    }

    /// Same as [`process_discovered_lead`](Self::process_discovered_lead),
    /// distinguishing new prospects from re-discoveries.
    pub async fn process(
        &self,
        identity: &LeadIdentity,
        hints: &LeadHints,
    ) -> Result<Option<LeadOutcome>, Error> {
        let url = identity.profile_url.as_str();

        if let Some(existing) = self.dedup.existing_prospect(url).await? {
            tracing::debug!(profile_url = url, prospect_id = %existing, "Already known");
            return Ok(Some(LeadOutcome::Existing(existing)));
        }

        let pre = self.scoring.pre_score(
            &identity.title,
            &identity.source,
            hints.has_hiring_signal,
            hints.has_news_mention,
        );
        tracing::info!(profile_url = url, title = %identity.title, score = pre.total, "Pre-scored");
        if !self.scoring.should_enrich(&pre) {
            tracing::info!(
                profile_url = url,
                score = pre.total,
                threshold = self.scoring.enrichment_threshold,
                "Below enrichment threshold"
            );
            return Ok(None);
        }

        let Some(enricher) = &self.enricher else {
            tracing::warn!("PROXYCURL_API_KEY not set, cannot enrich");
            return Ok(None);
        };
        let Some(profile) = enricher.fetch_profile(url).await else {
            tracing::warn!(profile_url = url, "Enrichment returned nothing");
            return Ok(None);
        };
        tracing::info!(
            name = %profile.full_name,
            title = ?profile.title,
            company = ?profile.company,
            "Enriched"
        );

        let firm = self.resolve_firm(hints.firm_id, &profile).await?;
        let email = self.discover_email(&profile, firm.as_ref()).await;
        let context = self.company_context(firm.as_ref(), enricher.as_ref()).await;

        let today = Utc::now().date_naive();
        let full = self.scoring.full_score(&profile, firm.is_some(), today);
        let dossier = build_dossier(&profile, context.as_ref(), email.as_ref(), today);

        let mut prospect = Prospect::new(&profile.full_name, url, identity.source.clone());
        if !profile.first_name.is_empty() {
            prospect.first_name = profile.first_name.clone();
            prospect.last_name = profile.last_name.clone();
        }
        prospect.title = profile.title.clone();
        prospect.headline = profile.headline.clone();
        prospect.role_type =
            classify_role_type(profile.title.as_deref().unwrap_or_default(), &profile.skills);
        prospect.firm_id = firm.as_ref().map(|f| f.id);
        prospect.email = profile
            .personal_emails
            .first()
            .cloned()
            .or_else(|| email.as_ref().map(|e| e.address.clone()));
        prospect.email_confidence = if profile.personal_emails.is_empty() {
            email.as_ref().map(|e| e.confidence)
        } else {
            None
        };
        prospect.relevance_score = full.total;
        prospect.score_breakdown = full.breakdown.clone();
        prospect.dossier = Some(dossier);
        prospect.company_context = context;
        prospect.education = profile.education.clone();
        prospect.experience = profile.experience.clone();
        prospect.skills = profile.skills.clone();
        prospect.hired_date = profile.hired_date;
        prospect.status = ProspectStatus::Ready;

        let id = prospect.id;
        let saved = self
            .db
            .apply(vec![
                WriteOp::InsertProspect(Box::new(prospect.clone())),
                WriteOp::AppendActivity(ActivityEntry::for_prospect(
                    id,
                    ActivityAction::AutoDiscovered,
                    json!({
                        "source": identity.source.as_str(),
                        "pre_score": pre.total,
                        "pre_breakdown": pre.breakdown,
                        "full_score": full.total,
                    }),
                )),
            ])
            .await;
        match saved {
            Ok(()) => {}
            // Lost a race with a concurrent discovery of the same profile.
            Err(e) if e.is_unique_violation() => {
                if let Some(existing) = self.dedup.existing_prospect(url).await? {
                    return Ok(Some(LeadOutcome::Existing(existing)));
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(prospect_id = %id, name = %prospect.full_name, score = full.total, "Prospect saved");

        if self.auto_draft {
            if let Err(e) = self.drafts.compose_initial(id).await {
                tracing::warn!(prospect_id = %id, "Auto-draft failed: {e}");
            }
        }

        if self.scoring.should_notify(&full) {
            self.outbox.publish(DomainEvent::NewLead {
                prospect_id: id,
                name: prospect.full_name,
                title: prospect.title,
                score: full.total,
            });
        }

        Ok(Some(LeadOutcome::Created(id)))
    }

    async fn resolve_firm(&self, firm_id: Option<Uuid>, profile: &Profile) -> Result<Option<Firm>, Error> {
        if let Some(id) = firm_id {
            let firm = self.db.get_firm(id).await?;
            if firm.is_none() {
                tracing::warn!(firm_id = %id, "Hinted firm not found");
            }
            return Ok(firm);
        }
        let Some(employer) = profile.company.as_deref() else {
            return Ok(None);
        };
        let firms = self.db.list_firms().await?;
        Ok(match_firm(&firms, employer).cloned())
    }

    /// Profile email first, then the finder against the firm's domain.
    async fn discover_email(&self, profile: &Profile, firm: Option<&Firm>) -> Option<EmailMatch> {
        if !profile.personal_emails.is_empty() {
            return None;
        }
        let finder = self.emails.as_ref()?;
        let domain = firm?.domain()?;
        let found = finder
            .find_email(&profile.first_name, &profile.last_name, &domain)
            .await;
        if found.is_none() {
            tracing::debug!(name = %profile.full_name, domain = %domain, "No email found");
        }
        found
    }

    async fn company_context(
        &self,
        firm: Option<&Firm>,
        enricher: &dyn ProfileEnricher,
    ) -> Option<CompanyContext> {
        let firm = firm?;
        let profile = match firm.linkedin_url.as_deref() {
            Some(url) => enricher.fetch_company(url).await,
            None => None,
        };
        Some(CompanyContext {
            firm_name: firm.name.clone(),
            aum: firm.aum.clone(),
            sectors: firm.sectors.clone(),
            website: firm.website.clone(),
            profile,
        })
    }
}

// ── Scans ───────────────────────────────────────────────────────────

/// Counts from one full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub news_articles: usize,
    pub jobs_found: usize,
    pub people_found: usize,
    pub prospects_created: usize,
}

/// Runs the discovery sources and feeds what they find into the pipeline.
pub struct Scout {
    news: NewsMonitor,
    jobs: JobMonitor,
    people: PeopleSearch,
    pipeline: Arc<EnrichmentPipeline>,
}

impl Scout {
    pub fn new(
        news: NewsMonitor,
        jobs: JobMonitor,
        people: PeopleSearch,
        pipeline: Arc<EnrichmentPipeline>,
    ) -> Self {
        Self {
            news,
            jobs,
            people,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &EnrichmentPipeline {
        &self.pipeline
    }

    /// News, then jobs, then people; each person goes through the pipeline
    /// with the firm's news and job signals.
    pub async fn run_full_scan(&self, cancel: &CancelToken) -> ScanSummary {
        let now = Utc::now();
        let mut summary = ScanSummary::default();

        tracing::info!("Starting news scan");
        let news = self.news.scan_all_firms(now).await.unwrap_or_else(|e| {
            tracing::error!("News scan failed: {e}");
            Vec::new()
        });
        summary.news_articles = news.len();
        let firms_with_news: HashSet<Uuid> = news.iter().map(|a| a.firm_id).collect();

        tracing::info!("Starting job scan");
        let jobs = self.jobs.scan_all_firms(now, cancel).await.unwrap_or_else(|e| {
            tracing::error!("Job scan failed: {e}");
            Vec::new()
        });
        summary.jobs_found = jobs.len();
        let firms_with_jobs: HashSet<Uuid> = jobs.iter().map(|j| j.firm_id).collect();

        tracing::info!("Starting people search");
        let people = self.people.search_all_firms(now).await.unwrap_or_else(|e| {
            tracing::error!("People search failed: {e}");
            Vec::new()
        });
        summary.people_found = people.len();

        let signals: HashMap<Uuid, (bool, bool)> = people
            .iter()
            .map(|p| {
                (
                    p.firm_id,
                    (firms_with_jobs.contains(&p.firm_id), firms_with_news.contains(&p.firm_id)),
                )
            })
            .collect();
        summary.prospects_created = self.process_people(&people, &signals, cancel).await;

        tracing::info!(
            news_articles = summary.news_articles,
            jobs_found = summary.jobs_found,
            people_found = summary.people_found,
            prospects_created = summary.prospects_created,
            "Full scan complete"
        );
        summary
    }

    /// People search only, without firm signals.
    pub async fn run_people_scan(&self, cancel: &CancelToken) -> ScanSummary {
        let people = self.people.search_all_firms(Utc::now()).await.unwrap_or_else(|e| {
            tracing::error!("People search failed: {e}");
            Vec::new()
        });
        let created = self.process_people(&people, &HashMap::new(), cancel).await;
        ScanSummary {
            people_found: people.len(),
            prospects_created: created,
            ..Default::default()
        }
    }

    /// News only. Articles are signals and create no prospects.
    pub async fn run_news_scan(&self) -> ScanSummary {
        let news = self.news.scan_all_firms(Utc::now()).await.unwrap_or_else(|e| {
            tracing::error!("News scan failed: {e}");
            Vec::new()
        });
        ScanSummary {
            news_articles: news.len(),
            ..Default::default()
        }
    }

    async fn process_people(
        &self,
        people: &[DiscoveredPerson],
        signals: &HashMap<Uuid, (bool, bool)>,
        cancel: &CancelToken,
    ) -> usize {
        tracing::info!(count = people.len(), "Processing discovered leads");
        let mut created = 0;
        for person in people {
            if cancel.is_cancelled() {
                tracing::info!("Lead processing cancelled");
                break;
            }
            let (has_hiring_signal, has_news_mention) =
                signals.get(&person.firm_id).copied().unwrap_or_default();
            let identity = LeadIdentity {
                profile_url: person.profile_url.clone(),
                title: person.role.clone(),
                source: LeadSource::PeopleSearch,
            };
            let hints = LeadHints {
                has_hiring_signal,
                has_news_mention,
                firm_id: Some(person.firm_id),
            };
            match self.pipeline.process(&identity, &hints).await {
                Ok(Some(LeadOutcome::Created(_))) => created += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(profile_url = %person.profile_url, "Pipeline error: {e}");
                }
            }
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_listed_firm_wins() {
        let firms = vec![Firm::new("Acme"), Firm::new("Acme Growth"), Firm::new("Birch")];
        assert_eq!(match_firm(&firms, "Acme Growth Partners").unwrap().name, "Acme");
        assert_eq!(match_firm(&firms, "birch capital").unwrap().name, "Birch");
        assert!(match_firm(&firms, "Cedar").is_none());
        assert!(match_firm(&firms, "  ").is_none());
    }
}
