//! Markdown research dossier, read by reviewers and fed to composition.

use std::fmt::Write;

use chrono::NaiveDate;

use super::model::{CompanyContext, ExperienceEntry, Profile};
use super::scoring::months_between;
use crate::services::EmailMatch;

const MAX_EXPERIENCE: usize = 5;
const MAX_DESCRIPTION: usize = 200;
const MAX_ABOUT: usize = 300;
const MAX_SUMMARY: usize = 500;

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn period(exp: &ExperienceEntry) -> String {
    let Some(start_year) = exp.start_year else {
        return String::new();
    };
    let mut out = match exp.start_month {
        Some(m) => format!("{m}/{start_year}"),
        None => start_year.to_string(),
    };
    if exp.is_current {
        out.push_str(" – Present");
    } else if let Some(end_year) = exp.end_year {
        match exp.end_month {
            Some(m) => {
                let _ = write!(out, " – {m}/{end_year}");
            }
            None => {
                let _ = write!(out, " – {end_year}");
            }
        }
    }
    out
}

/// Assemble the dossier. `today` anchors the "months ago" figure.
pub fn build_dossier(
    profile: &Profile,
    context: Option<&CompanyContext>,
    email: Option<&EmailMatch>,
    today: NaiveDate,
) -> String {
    let mut out = String::new();
    let na = "N/A";

    let _ = writeln!(out, "# {}", profile.full_name);
    if let Some(headline) = &profile.headline {
        let _ = writeln!(out, "**{headline}**");
    }
    out.push('\n');

    out.push_str("## Current Role\n");
    let _ = writeln!(out, "- **Title:** {}", profile.title.as_deref().unwrap_or(na));
    let _ = writeln!(out, "- **Company:** {}", profile.company.as_deref().unwrap_or(na));
    let _ = writeln!(out, "- **Location:** {}", profile.location.as_deref().unwrap_or(na));
    if let Some(hired) = profile.hired_date {
        let months = months_between(hired, today).floor().max(0.0) as i64;
        let _ = writeln!(
            out,
            "- **Started:** {} ({months} months ago)",
            hired.format("%B %Y")
        );
    }
    out.push('\n');

    if !profile.experience.is_empty() {
        out.push_str("## Experience\n");
        for exp in profile.experience.iter().take(MAX_EXPERIENCE) {
            let _ = writeln!(out, "- **{}** at {} ({})", exp.title, exp.company, period(exp));
            if let Some(desc) = &exp.description {
                let _ = writeln!(out, "  {}", clip(desc, MAX_DESCRIPTION));
            }
        }
        out.push('\n');
    }

    if !profile.education.is_empty() {
        out.push_str("## Education\n");
        for edu in &profile.education {
            let degree = [edu.degree.as_deref(), edu.field.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" in ");
            let years = match (edu.start_year, edu.end_year) {
                (Some(s), Some(e)) => format!("{s}–{e}"),
                (Some(s), None) => s.to_string(),
                _ => String::new(),
            };
            let _ = writeln!(out, "- **{degree}**, {} ({years})", edu.school);
        }
        out.push('\n');
    }

    if !profile.skills.is_empty() {
        out.push_str("## Skills\n");
        let _ = writeln!(out, "{}", profile.skills.join(", "));
        out.push('\n');
    }

    out.push_str("## Contact\n");
    if let Some(email) = email {
        let _ = writeln!(
            out,
            "- **Email:** {} (confidence: {}%)",
            email.address, email.confidence
        );
    }
    for personal in &profile.personal_emails {
        let _ = writeln!(out, "- **Personal email:** {personal}");
    }
    for phone in &profile.personal_numbers {
        let _ = writeln!(out, "- **Phone:** {phone}");
    }
    out.push('\n');

    if let Some(ctx) = context {
        out.push_str("## Company Context\n");
        let _ = writeln!(out, "- **Firm:** {}", ctx.firm_name);
        if let Some(aum) = &ctx.aum {
            let _ = writeln!(out, "- **AUM:** {aum}");
        }
        if !ctx.sectors.is_empty() {
            let _ = writeln!(out, "- **Sectors:** {}", ctx.sectors.join(", "));
        }
        if let Some(about) = ctx.profile.as_ref().and_then(|p| p.description.as_deref()) {
            let _ = writeln!(out, "- **About:** {}", clip(about, MAX_ABOUT));
        }
        out.push('\n');
    }

    if let Some(summary) = &profile.summary {
        out.push_str("## Profile Summary\n");
        let _ = writeln!(out, "{}", clip(summary, MAX_SUMMARY));
        out.push('\n');
    }

    out
}
