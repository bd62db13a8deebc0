//! Two-tier relevance scoring.
//!
//! The pre-score gates enrichment spend and only looks at what discovery
//! already knows (title, source, concurrent signals). The full score runs on
//! the enriched profile and gates notification. Both return the capped total
//! together with a per-component breakdown under stable keys.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::model::{LeadSource, Profile, RoleType, Score};

pub const TITLE_RELEVANCE: &str = "title_relevance";
pub const SOURCE_QUALITY: &str = "source_quality";
pub const HIRING_SIGNAL: &str = "hiring_signal";
pub const NEWS_BUZZ: &str = "news_buzz";

pub const TITLE_MATCH: &str = "title_match";
pub const EDUCATION: &str = "education";
pub const SKILLS: &str = "skills";
pub const RECENCY: &str = "recency";
pub const COMPANY_MATCH: &str = "company_match";

const STRONG_TITLES: &[&str] = &[
    "head of ai",
    "head of data",
    "head of machine learning",
    "chief data officer",
    "chief analytics officer",
    "chief ai officer",
    "vp of ai",
    "vp of data",
    "vp data",
    "vp ai",
    "director of ai",
    "director of data science",
    "director of analytics",
    "ai lead",
    "data science lead",
    "ml lead",
];

const MODERATE_TITLES: &[&str] = &[
    "cto",
    "chief technology officer",
    "head of analytics",
    "head of engineering",
    "data engineer",
    "machine learning engineer",
    "data strategy",
    "digital transformation",
    "partner",
    "operating partner",
];

const SENIORITY: &[&str] = &["head", "chief", "vp", "director", "lead", "partner"];

/// Full-score seniority markers. `partner` only counts at discovery.
const FULL_SENIORITY: &[&str] = &["head", "lead", "director", "vp", "chief"];

static AI_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(ai|artificial.intelligence|machine.learning|data.science|ml|nlp|deep.learning|analytics|data.platform|data.strategy)\b",
    )
    .expect("valid regex")
});

const FULL_TITLE_KEYWORDS: &[&str] = &[
    "ai",
    "artificial intelligence",
    "machine learning",
    "data science",
    "data lead",
    "head of data",
    "cdo",
    "chief data",
    "ml",
    "analytics",
];

const EDUCATION_KEYWORDS: &[&str] = &[
    "machine learning",
    "data science",
    "artificial intelligence",
    "computer science",
    "statistics",
];

const SKILL_KEYWORDS: &[&str] = &[
    "python",
    "machine learning",
    "deep learning",
    "tensorflow",
    "pytorch",
    "nlp",
    "data science",
    "sql",
    "spark",
    "aws",
    "azure",
    "gcp",
];

/// Per-source weight; unknown sources get [`UNKNOWN_SOURCE_WEIGHT`].
pub fn source_weight(source: &LeadSource) -> f64 {
    match source {
        LeadSource::PeopleSearch => 0.25,
        LeadSource::Manual => 0.20,
        LeadSource::NewsMonitor => 0.15,
        LeadSource::JobMonitor => 0.10,
        LeadSource::Other(_) => UNKNOWN_SOURCE_WEIGHT,
    }
}

pub const UNKNOWN_SOURCE_WEIGHT: f64 = 0.05;

/// Keywords up to this length are acronyms and must stand alone.
const ACRONYM_MAX_LEN: usize = 3;

/// Substring match, except short acronyms (`cto`, `ai`, `vp`) which must sit
/// on word boundaries so "Director" does not read as "CTO".
fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.len() > ACRONYM_MAX_LEN {
        return text.contains(phrase);
    }
    let bytes = text.as_bytes();
    text.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        before_ok && after_ok
    })
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn finish(breakdown: BTreeMap<String, f64>) -> Score {
    let total = round2(breakdown.values().sum::<f64>().min(1.0));
    Score { total, breakdown }
}

/// Relevance scorer with its two decision thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    pub enrichment_threshold: f64,
    pub notification_threshold: f64,
}

impl ScoringEngine {
    pub fn new(enrichment_threshold: f64, notification_threshold: f64) -> Self {
        Self {
            enrichment_threshold,
            notification_threshold,
        }
    }

    /// Cheap estimate from discovery data alone.
    pub fn pre_score(
        &self,
        title: &str,
        source: &LeadSource,
        has_hiring_signal: bool,
        has_news_mention: bool,
    ) -> Score {
        let title = title.trim().to_lowercase();

        let mut title_score: f64 = if contains_any(&title, STRONG_TITLES) {
            0.40
        } else if contains_any(&title, MODERATE_TITLES) {
            0.20
        } else if AI_KEYWORDS.is_match(&title) {
            0.25
        } else {
            0.0
        };
        if contains_any(&title, SENIORITY) {
            title_score = (title_score + 0.10).min(0.40);
        }

        let mut breakdown = BTreeMap::new();
        breakdown.insert(TITLE_RELEVANCE.to_string(), round2(title_score));
        breakdown.insert(SOURCE_QUALITY.to_string(), source_weight(source));
        breakdown.insert(
            HIRING_SIGNAL.to_string(),
            if has_hiring_signal { 0.20 } else { 0.0 },
        );
        breakdown.insert(NEWS_BUZZ.to_string(), if has_news_mention { 0.15 } else { 0.0 });
        finish(breakdown)
    }

    /// Score of the enriched profile. `today` anchors hire recency.
    pub fn full_score(&self, profile: &Profile, firm_known: bool, today: NaiveDate) -> Score {
        let title = profile.title.as_deref().unwrap_or_default().to_lowercase();
        let headline = profile.headline.as_deref().unwrap_or_default().to_lowercase();

        let mut title_score: f64 = if contains_any(&title, FULL_TITLE_KEYWORDS)
            || contains_any(&headline, FULL_TITLE_KEYWORDS)
        {
            0.30
        } else {
            0.0
        };
        if contains_any(&title, FULL_SENIORITY) {
            title_score = (title_score + 0.05).min(0.30);
        }

        let education_score = if profile.education.iter().any(|e| {
            let text = format!(
                "{} {}",
                e.field.as_deref().unwrap_or_default(),
                e.degree.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            EDUCATION_KEYWORDS.iter().any(|kw| text.contains(kw))
        }) {
            0.15
        } else {
            0.0
        };

        let skills = profile.skills.join(", ").to_lowercase();
        let skill_matches = SKILL_KEYWORDS
            .iter()
            .filter(|kw| skills.contains(*kw))
            .count();
        let skill_score = match skill_matches {
            0 => 0.0,
            1 => 0.05,
            2 | 3 => 0.10,
            _ => 0.15,
        };

        let recency_score = profile
            .hired_date
            .map(|hired| recency(months_between(hired, today)))
            .unwrap_or(0.0);

        let company_score = if firm_known { 0.15 } else { 0.0 };

        let mut breakdown = BTreeMap::new();
        breakdown.insert(TITLE_MATCH.to_string(), round2(title_score));
        breakdown.insert(EDUCATION.to_string(), education_score);
        breakdown.insert(SKILLS.to_string(), skill_score);
        breakdown.insert(RECENCY.to_string(), recency_score);
        breakdown.insert(COMPANY_MATCH.to_string(), company_score);
        finish(breakdown)
    }

    pub fn should_enrich(&self, pre_score: &Score) -> bool {
        pre_score.total >= self.enrichment_threshold
    }

    pub fn should_notify(&self, full_score: &Score) -> bool {
        full_score.total >= self.notification_threshold
    }
}

/// Elapsed months at 30 days per month.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / 30.0
}

fn recency(months: f64) -> f64 {
    if months <= 3.0 {
        0.25
    } else if months <= 6.0 {
        0.20
    } else if months <= 12.0 {
        0.10
    } else if months <= 24.0 {
        0.05
    } else {
        0.0
    }
}

/// Role category from the title, falling back to AI skills.
pub fn classify_role_type(title: &str, skills: &[String]) -> RoleType {
    let t = title.to_lowercase();

    if contains_any(&t, &["chief technology", "cto"]) {
        return RoleType::Cto;
    }
    if contains_any(&t, &["chief data", "cdo"]) {
        return RoleType::Cdo;
    }
    if contains_any(&t, &["head of analytics", "analytics lead", "analytics director"]) {
        return RoleType::HeadOfAnalytics;
    }
    if contains_any(
        &t,
        &["ai", "artificial intelligence", "machine learning", "ml", "ai lead", "ai director"],
    ) {
        return RoleType::AiLead;
    }
    if contains_any(
        &t,
        &["data science", "data lead", "data director", "head of data", "vp data", "data strategy"],
    ) {
        return RoleType::DataLead;
    }

    let s = skills.join(", ").to_lowercase();
    let ai_skills = [
        "machine learning",
        "deep learning",
        "ai",
        "data science",
        "nlp",
        "tensorflow",
        "pytorch",
    ];
    if contains_any(&s, &ai_skills) {
        return RoleType::AiLead;
    }
    RoleType::Other
}
