//! Proxycurl: person profiles, company pages and role lookup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

use super::http::{Credential, RateLimitedClient, RetryPolicy};
use super::{ProfileEnricher, RoleLookup, RoleMatch};
use crate::error::ServiceError;
use crate::prospects::model::{CompanyProfile, EducationEntry, ExperienceEntry, Profile};

pub const PROXYCURL_BASE: &str = "https://nubela.co/proxycurl/api";

/// Roles looked up at every monitored firm.
pub const TARGET_ROLES: &[&str] = &[
    "Head of AI",
    "Head of Data",
    "Chief Data Officer",
    "Chief Technology Officer",
    "VP of Data",
    "Director of Data Science",
    "Head of Machine Learning",
    "Head of Analytics",
];

const MAX_UPDATES: usize = 5;
const MAX_UPDATE_CHARS: usize = 500;

pub struct ProxycurlClient {
    lookups: RateLimitedClient,
    roles: RateLimitedClient,
}

impl ProxycurlClient {
    pub fn new(api_key: SecretString) -> Self {
        let roles = RetryPolicy {
            min_interval: Duration::from_secs(6),
            backoff_unit: Duration::from_secs(30),
            max_attempts: 2,
            timeout: Duration::from_secs(30),
        };
        Self::with_policies(api_key, PROXYCURL_BASE, RetryPolicy::default(), roles)
    }

    /// Point the client at another host with custom pacing.
    pub fn with_policies(
        api_key: SecretString,
        base_url: &str,
        lookups: RetryPolicy,
        roles: RetryPolicy,
    ) -> Self {
        Self {
            lookups: RateLimitedClient::new(
                "proxycurl",
                base_url,
                Credential::Bearer(api_key.clone()),
                lookups,
            ),
            roles: RateLimitedClient::new(
                "proxycurl",
                base_url,
                Credential::Bearer(api_key),
                roles,
            ),
        }
    }

    async fn lookup(&self, path: &str, query: &[(&str, &str)]) -> Option<Value> {
        match self
            .lookups
            .call_with_query(Method::GET, path, query, None)
            .await
        {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Proxycurl lookup failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl ProfileEnricher for ProxycurlClient {
    async fn fetch_profile(&self, profile_url: &str) -> Option<Profile> {
        let raw = self
            .lookup(
                "/v2/linkedin",
                &[
                    ("linkedin_profile_url", profile_url),
                    ("use_cache", "if-recent"),
                    ("skills", "include"),
                    ("inferred_salary", "skip"),
                    ("personal_email", "include"),
                    ("personal_contact_number", "include"),
                ],
            )
            .await?;
        match serde_json::from_value::<RawProfile>(raw) {
            Ok(raw) => raw.into_profile(),
            Err(e) => {
                tracing::warn!(profile_url, "Unreadable profile payload: {e}");
                None
            }
        }
    }

    async fn fetch_company(&self, company_url: &str) -> Option<CompanyProfile> {
        let raw = self
            .lookup(
                "/linkedin/company",
                &[("url", company_url), ("use_cache", "if-recent")],
            )
            .await?;
        match serde_json::from_value::<RawCompany>(raw) {
            Ok(raw) => Some(raw.into()),
            Err(e) => {
                tracing::warn!(company_url, "Unreadable company payload: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl RoleLookup for ProxycurlClient {
    async fn find_role(
        &self,
        company_url: &str,
        role: &str,
    ) -> Result<Option<RoleMatch>, ServiceError> {
        let result = self
            .roles
            .call_with_query(
                Method::GET,
                "/find/company/role/",
                &[
                    ("company_name", company_url),
                    ("role", role),
                    ("enrich_profile", "skip"),
                ],
                None,
            )
            .await;

        match result {
            Ok(value) => Ok(value
                .get("linkedin_profile_url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(|url| RoleMatch {
                    profile_url: url.to_string(),
                    role: role.to_string(),
                })),
            Err(ServiceError::Remote { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ── Wire payloads ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExperience {
    title: Option<String>,
    company: Option<String>,
    description: Option<String>,
    starts_at: Option<RawDate>,
    ends_at: Option<RawDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEducation {
    school: Option<String>,
    degree_name: Option<String>,
    field_of_study: Option<String>,
    starts_at: Option<RawDate>,
    ends_at: Option<RawDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProfile {
    full_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    headline: Option<String>,
    summary: Option<String>,
    city: Option<String>,
    experiences: Option<Vec<RawExperience>>,
    education: Option<Vec<RawEducation>>,
    skills: Option<Vec<String>>,
    personal_emails: Option<Vec<String>>,
    personal_numbers: Option<Vec<String>>,
}

impl RawProfile {
    /// `None` when the payload names nobody.
    fn into_profile(self) -> Option<Profile> {
        let first_name = self.first_name.unwrap_or_default();
        let last_name = self.last_name.unwrap_or_default();
        let full_name = match self.full_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => format!("{first_name} {last_name}").trim().to_string(),
        };
        if full_name.is_empty() {
            return None;
        }

        let experiences = self.experiences.unwrap_or_default();
        let current = experiences.first();
        let title = current.and_then(|e| non_empty(e.title.clone()));
        let company = current.and_then(|e| non_empty(e.company.clone()));
        let hired_date = current
            .and_then(|e| e.starts_at.as_ref())
            .and_then(|d| NaiveDate::from_ymd_opt(d.year?, d.month.unwrap_or(1), d.day.unwrap_or(1)));

        let experience = experiences
            .into_iter()
            .map(|e| ExperienceEntry {
                title: e.title.unwrap_or_default(),
                company: e.company.unwrap_or_default(),
                description: non_empty(e.description),
                start_year: e.starts_at.as_ref().and_then(|d| d.year),
                start_month: e.starts_at.as_ref().and_then(|d| d.month),
                end_year: e.ends_at.as_ref().and_then(|d| d.year),
                end_month: e.ends_at.as_ref().and_then(|d| d.month),
                is_current: e.ends_at.is_none(),
            })
            .collect();

        let education = self
            .education
            .unwrap_or_default()
            .into_iter()
            .map(|e| EducationEntry {
                school: e.school.unwrap_or_default(),
                degree: non_empty(e.degree_name),
                field: non_empty(e.field_of_study),
                start_year: e.starts_at.and_then(|d| d.year),
                end_year: e.ends_at.and_then(|d| d.year),
            })
            .collect();

        Some(Profile {
            full_name,
            first_name,
            last_name,
            headline: non_empty(self.headline),
            summary: non_empty(self.summary),
            location: non_empty(self.city),
            title,
            company,
            hired_date,
            education,
            experience,
            skills: self.skills.unwrap_or_default(),
            personal_emails: self.personal_emails.unwrap_or_default(),
            personal_numbers: self.personal_numbers.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHq {
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUpdate {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCompany {
    name: Option<String>,
    description: Option<String>,
    industry: Option<String>,
    specialities: Option<Vec<String>>,
    website: Option<String>,
    company_size_on_linkedin: Option<Value>,
    hq: Option<RawHq>,
    founded_year: Option<i32>,
    tagline: Option<String>,
    follower_count: Option<i64>,
    updates: Option<Vec<RawUpdate>>,
}

impl From<RawCompany> for CompanyProfile {
    fn from(raw: RawCompany) -> Self {
        let company_size = raw.company_size_on_linkedin.and_then(|v| match v {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        });
        let recent_updates = raw
            .updates
            .unwrap_or_default()
            .into_iter()
            .take(MAX_UPDATES)
            .filter_map(|u| non_empty(u.text))
            .map(|text| text.chars().take(MAX_UPDATE_CHARS).collect())
            .collect();

        Self {
            name: non_empty(raw.name),
            description: non_empty(raw.description),
            industry: non_empty(raw.industry),
            specialities: raw.specialities.unwrap_or_default(),
            website: non_empty(raw.website),
            company_size,
            headquarters: raw.hq.and_then(|hq| non_empty(hq.city)),
            founded_year: raw.founded_year,
            tagline: non_empty(raw.tagline),
            follower_count: raw.follower_count,
            recent_updates,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
