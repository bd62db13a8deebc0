//! Prospect and firm data model.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    New,
    Researching,
    Ready,
    Drafted,
    Approved,
    Sent,
    Replied,
    Meeting,
    Rejected,
    Paused,
}

impl ProspectStatus {
    /// Check if this status may advance to `target`.
    pub fn can_transition_to(&self, target: ProspectStatus) -> bool {
        use ProspectStatus::*;

        if matches!(target, Rejected | Paused) {
            return self.is_pre_send();
        }

        matches!(
            (self, target),
            (New, Researching)
                | (Researching, Ready)
                | (Ready, Drafted)
                | (Drafted, Approved)
                | (Approved, Sent)
                | (Sent, Replied)
                | (Sent, Meeting)
                | (Replied, Meeting)
        )
    }

    /// Statuses from which administrative overrides (reject, pause) apply.
    pub fn is_pre_send(&self) -> bool {
        matches!(
            self,
            Self::New | Self::Researching | Self::Ready | Self::Drafted | Self::Approved
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Meeting | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Researching => "researching",
            Self::Ready => "ready",
            Self::Drafted => "drafted",
            Self::Approved => "approved",
            Self::Sent => "sent",
            Self::Replied => "replied",
            Self::Meeting => "meeting",
            Self::Rejected => "rejected",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProspectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "new" => Self::New,
            "researching" => Self::Researching,
            "ready" => Self::Ready,
            "drafted" => Self::Drafted,
            "approved" => Self::Approved,
            "sent" => Self::Sent,
            "replied" => Self::Replied,
            "meeting" => Self::Meeting,
            "rejected" => Self::Rejected,
            "paused" => Self::Paused,
            other => return Err(format!("unknown prospect status: {other}")),
        })
    }
}

/// Role category derived from title and skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    AiLead,
    DataLead,
    Cto,
    Cdo,
    HeadOfAnalytics,
    Other,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiLead => "ai_lead",
            Self::DataLead => "data_lead",
            Self::Cto => "cto",
            Self::Cdo => "cdo",
            Self::HeadOfAnalytics => "head_of_analytics",
            Self::Other => "other",
        }
    }

    /// Unknown strings map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "ai_lead" => Self::AiLead,
            "data_lead" => Self::DataLead,
            "cto" => Self::Cto,
            "cdo" => Self::Cdo,
            "head_of_analytics" => Self::HeadOfAnalytics,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a lead was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadSource {
    PeopleSearch,
    NewsMonitor,
    JobMonitor,
    Manual,
    Other(String),
}

impl LeadSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PeopleSearch => "people_search",
            Self::NewsMonitor => "news_monitor",
            Self::JobMonitor => "job_monitor",
            Self::Manual => "manual",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "people_search" => Self::PeopleSearch,
            "news_monitor" => Self::NewsMonitor,
            "job_monitor" => Self::JobMonitor,
            "manual" => Self::Manual,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target firm. Seeded externally; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firm {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub aum: Option<String>,
    pub sectors: Vec<String>,
    pub monitoring_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Firm {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            website: None,
            linkedin_url: None,
            aum: None,
            sectors: Vec::new(),
            monitoring_enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }

    pub fn with_linkedin(mut self, url: &str) -> Self {
        self.linkedin_url = Some(url.to_string());
        self
    }

    /// Bare email domain derived from the website.
    pub fn domain(&self) -> Option<String> {
        self.website.as_deref().and_then(domain_from_website)
    }
}

/// Strip scheme, `www.` and any path from a website URL.
pub fn domain_from_website(website: &str) -> Option<String> {
    let trimmed = website.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let domain = without_www.split('/').next().unwrap_or_default();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub school: String,
    pub degree: Option<String>,
    pub field: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub title: String,
    pub company: String,
    pub description: Option<String>,
    pub start_year: Option<i32>,
    pub start_month: Option<u32>,
    pub end_year: Option<i32>,
    pub end_month: Option<u32>,
    pub is_current: bool,
}

/// Structured profile returned by the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub location: Option<String>,
    /// Title of the current position.
    pub title: Option<String>,
    /// Employer of the current position.
    pub company: Option<String>,
    pub hired_date: Option<NaiveDate>,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<String>,
    pub personal_emails: Vec<String>,
    pub personal_numbers: Vec<String>,
}

/// Public company page snapshot from the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub specialities: Vec<String>,
    pub website: Option<String>,
    pub company_size: Option<String>,
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub tagline: Option<String>,
    pub follower_count: Option<i64>,
    pub recent_updates: Vec<String>,
}

/// Company context stored on the prospect: firm fields plus the fetched page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyContext {
    pub firm_name: String,
    pub aum: Option<String>,
    pub sectors: Vec<String>,
    pub website: Option<String>,
    pub profile: Option<CompanyProfile>,
}

/// A relevance score with its itemised components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub total: f64,
    pub breakdown: BTreeMap<String, f64>,
}

/// A prospect record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prospect {
    pub id: Uuid,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub headline: Option<String>,
    pub role_type: RoleType,
    pub firm_id: Option<Uuid>,
    /// Unique external profile reference.
    pub profile_url: String,
    pub email: Option<String>,
    pub email_confidence: Option<u32>,
    /// Always the full score, never the pre-score.
    pub relevance_score: f64,
    pub score_breakdown: BTreeMap<String, f64>,
    pub dossier: Option<String>,
    pub company_context: Option<CompanyContext>,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<String>,
    pub status: ProspectStatus,
    pub source: LeadSource,
    pub hired_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    /// Minimal record in `new` status.
    pub fn new(full_name: &str, profile_url: &str, source: LeadSource) -> Self {
        let now = Utc::now();
        let mut parts = full_name.split_whitespace();
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = parts.collect::<Vec<_>>().join(" ");
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            first_name,
            last_name,
            title: None,
            headline: None,
            role_type: RoleType::Other,
            firm_id: None,
            profile_url: profile_url.to_string(),
            email: None,
            email_confidence: None,
            relevance_score: 0.0,
            score_breakdown: BTreeMap::new(),
            dossier: None,
            company_context: None,
            education: Vec::new(),
            experience: Vec::new(),
            skills: Vec::new(),
            status: ProspectStatus::New,
            source,
            hired_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_lifecycle_is_legal() {
        use ProspectStatus::*;
        let path = [Researching, Ready, Drafted, Approved, Sent, Replied, Meeting];
        let mut current = New;
        for next in path {
            assert!(current.can_transition_to(next), "{current} -> {next}");
            current = next;
        }
    }

    #[test]
    fn backwards_and_skips_are_illegal() {
        use ProspectStatus::*;
        assert!(!Sent.can_transition_to(Approved));
        assert!(!Ready.can_transition_to(Sent));
        assert!(!Drafted.can_transition_to(Sent));
        assert!(!Replied.can_transition_to(Sent));
        assert!(!Meeting.can_transition_to(Replied));
    }

    #[test]
    fn overrides_only_before_send() {
        use ProspectStatus::*;
        for status in [New, Researching, Ready, Drafted, Approved] {
            assert!(status.can_transition_to(Rejected));
            assert!(status.can_transition_to(Paused));
        }
        for status in [Sent, Replied, Meeting, Rejected, Paused] {
            assert!(!status.can_transition_to(Rejected));
            assert!(!status.can_transition_to(Paused));
        }
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ProspectStatus::New,
            ProspectStatus::Drafted,
            ProspectStatus::Replied,
            ProspectStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<ProspectStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ProspectStatus>().is_err());
    }

    #[test]
    fn unknown_source_is_kept() {
        assert_eq!(LeadSource::parse("manual"), LeadSource::Manual);
        let other = LeadSource::parse("conference");
        assert_eq!(other.as_str(), "conference");
    }

    #[test]
    fn domain_strips_scheme_www_and_path() {
        assert_eq!(
            domain_from_website("https://www.Acme-Capital.com/about"),
            Some("acme-capital.com".to_string())
        );
        assert_eq!(domain_from_website("http://fund.io"), Some("fund.io".to_string()));
        assert_eq!(domain_from_website("  "), None);
    }

    #[test]
    fn new_prospect_splits_name() {
        let p = Prospect::new("Ada King Lovelace", "https://linkedin.com/in/ada", LeadSource::Manual);
        assert_eq!(p.first_name, "Ada");
        assert_eq!(p.last_name, "King Lovelace");
        assert_eq!(p.status, ProspectStatus::New);
    }
}
