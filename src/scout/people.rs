//! People search: role holders at monitored firms.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::dedup::DedupGate;
use crate::error::Error;
use crate::services::RoleLookup;
use crate::services::proxycurl::TARGET_ROLES;
use crate::store::{Database, QueryType};

/// A role holder found at a firm, not yet enriched.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPerson {
    pub profile_url: String,
    pub role: String,
    pub firm_id: Uuid,
    pub firm_name: String,
}

pub struct PeopleSearch {
    roles: Option<Arc<dyn RoleLookup>>,
    db: Arc<dyn Database>,
    dedup: DedupGate,
}

impl PeopleSearch {
    pub fn new(roles: Option<Arc<dyn RoleLookup>>, db: Arc<dyn Database>, dedup: DedupGate) -> Self {
        Self { roles, db, dedup }
    }

    /// Look up every target role at each monitored firm with a company
    /// profile. Failed lookups are logged and skipped.
    pub async fn search_all_firms(&self, now: DateTime<Utc>) -> Result<Vec<DiscoveredPerson>, Error> {
        let Some(roles) = &self.roles else {
            tracing::warn!("PROXYCURL_API_KEY not set, skipping people search");
            return Ok(Vec::new());
        };

        let firms = self.db.list_monitored_firms().await?;
        let mut results = Vec::new();

        for firm in &firms {
            let Some(company_url) = firm.linkedin_url.as_deref() else {
                tracing::debug!(firm = %firm.name, "No company profile, skipping people search");
                continue;
            };
            let target = firm.id.to_string();
            if !self.dedup.should_scan(QueryType::People, &target, now).await? {
                continue;
            }

            let mut found = Vec::new();
            for role in TARGET_ROLES {
                match roles.find_role(company_url, role).await {
                    Ok(Some(hit)) => {
                        tracing::info!(firm = %firm.name, role, url = %hit.profile_url, "Role holder found");
                        found.push(DiscoveredPerson {
                            profile_url: hit.profile_url,
                            role: hit.role,
                            firm_id: firm.id,
                            firm_name: firm.name.clone(),
                        });
                    }
                    Ok(None) => tracing::debug!(firm = %firm.name, role, "No role holder"),
                    Err(e) => tracing::warn!(firm = %firm.name, role, "Role lookup failed: {e}"),
                }
            }

            self.dedup
                .record(QueryType::People, &target, found.len(), now)
                .await?;
            results.extend(found);
        }

        tracing::info!(people = results.len(), firms = firms.len(), "People search complete");
        Ok(results)
    }
}
