//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! shared behind an async mutex. Every statement holds the lock for its
//! whole call and a unit-of-work batch holds it from `BEGIN` to `COMMIT`,
//! so no other statement can join or observe an open transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::{ActivityAction, ActivityEntry};
use crate::error::{DatabaseError, ParseError};
use crate::outreach::model::{Approval, Channel, Decision, DeliveryIds, OutreachDraft};
use crate::prospects::model::{
    CompanyContext, EducationEntry, ExperienceEntry, Firm, LeadSource, Prospect, ProspectStatus,
    RoleType,
};
use crate::store::codec;
use crate::store::migrations;
use crate::store::traits::{Database, QueryType, SearchQuery, WriteOp};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Mutex<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn: Mutex::new(conn),
        })
    }

    async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_integer(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Map a write failure, keeping UNIQUE violations distinguishable.
fn write_err(context: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{context}: {msg}"))
    } else {
        DatabaseError::Query(format!("{context}: {msg}"))
    }
}

fn row_to_firm(row: &libsql::Row) -> Result<Firm, libsql::Error> {
    let id_str: String = row.get(0)?;
    let sectors_str: Option<String> = row.get(5).ok();
    let created_str: String = row.get(7)?;

    Ok(Firm {
        id: parse_uuid(&id_str),
        name: row.get(1)?,
        website: row.get(2).ok(),
        linkedin_url: row.get(3).ok(),
        aum: row.get(4).ok(),
        sectors: codec::decode_or_default("firm.sectors", sectors_str.as_deref()),
        monitoring_enabled: row.get::<i64>(6).unwrap_or(1) != 0,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_prospect(row: &libsql::Row) -> Result<Prospect, libsql::Error> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get::<String>(6).unwrap_or_else(|_| "other".into());
    let firm_str: Option<String> = row.get(7).ok();
    let breakdown_str: Option<String> = row.get(12).ok();
    let context_str: Option<String> = row.get(14).ok();
    let education_str: Option<String> = row.get(15).ok();
    let experience_str: Option<String> = row.get(16).ok();
    let skills_str: Option<String> = row.get(17).ok();
    let status_str: String = row.get(18)?;
    let source_str: String = row.get(19)?;
    let hired_str: Option<String> = row.get(20).ok();
    let created_str: String = row.get(21)?;
    let updated_str: String = row.get(22)?;

    let status: ProspectStatus = status_str.parse().unwrap_or_else(|e: String| {
        tracing::warn!(prospect_id = %id_str, "{e}");
        ProspectStatus::New
    });

    Ok(Prospect {
        id: parse_uuid(&id_str),
        full_name: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        title: row.get(4).ok(),
        headline: row.get(5).ok(),
        role_type: RoleType::parse(&role_str),
        firm_id: firm_str.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
        profile_url: row.get(8)?,
        email: row.get(9).ok(),
        email_confidence: row.get::<i64>(10).ok().map(|c| c.clamp(0, 100) as u32),
        relevance_score: row.get::<f64>(11).unwrap_or(0.0),
        score_breakdown: codec::decode_or_default::<BTreeMap<String, f64>>(
            "score_breakdown",
            breakdown_str.as_deref(),
        ),
        dossier: row.get(13).ok(),
        company_context: context_str
            .as_deref()
            .and_then(|raw| match codec::decode::<CompanyContext>("company_context", raw) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unreadable company context");
                    None
                }
            }),
        education: codec::decode_or_default::<Vec<EducationEntry>>(
            "education",
            education_str.as_deref(),
        ),
        experience: codec::decode_or_default::<Vec<ExperienceEntry>>(
            "experience",
            experience_str.as_deref(),
        ),
        skills: codec::decode_or_default("skills", skills_str.as_deref()),
        status,
        source: LeadSource::parse(&source_str),
        hired_date: hired_str
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_draft(row: &libsql::Row) -> Result<OutreachDraft, libsql::Error> {
    let id_str: String = row.get(0)?;
    let prospect_str: String = row.get(1)?;
    let channel_str: String = row.get(2)?;
    let approval_str: String = row.get(7)?;
    let approved_str: Option<String> = row.get(8).ok();
    let campaign_id: Option<String> = row.get(10).ok();
    let lead_id: Option<String> = row.get(11).ok();
    let sent_str: Option<String> = row.get(12).ok();
    let created_str: String = row.get(13)?;

    let delivery = match (campaign_id, lead_id) {
        (Some(campaign_id), Some(lead_id)) => Some(DeliveryIds {
            campaign_id,
            lead_id,
        }),
        _ => None,
    };

    Ok(OutreachDraft {
        id: parse_uuid(&id_str),
        prospect_id: parse_uuid(&prospect_str),
        channel: Channel::parse(&channel_str).unwrap_or(Channel::Email),
        sequence_step: row.get::<i64>(3).unwrap_or(1).max(1) as u32,
        subject: row.get(4).ok(),
        body: row.get(5)?,
        edited_body: row.get(6).ok(),
        approval: Approval::parse(&approval_str),
        approved_at: parse_optional_datetime(&approved_str),
        rejection_reason: row.get(9).ok(),
        delivery,
        sent_at: parse_optional_datetime(&sent_str),
        created_at: parse_datetime(&created_str),
    })
}

/// Unknown action tags are a decode error; the caller skips the row.
fn row_to_activity(row: &libsql::Row) -> Result<ActivityEntry, DatabaseError> {
    let column_err = |e: libsql::Error| DatabaseError::Query(format!("activity row: {e}"));
    let id_str: String = row.get(0).map_err(column_err)?;
    let prospect_str: Option<String> = row.get(1).ok();
    let action_str: String = row.get(2).map_err(column_err)?;
    let detail_str: String = row.get::<String>(3).unwrap_or_else(|_| "{}".into());
    let created_str: String = row.get(4).map_err(column_err)?;

    let action = ActivityAction::parse(&action_str).ok_or_else(|| ParseError::UnknownTag {
        field: "activity.action".into(),
        value: action_str.clone(),
    })?;

    Ok(ActivityEntry {
        id: parse_uuid(&id_str),
        prospect_id: prospect_str.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
        action,
        detail: serde_json::from_str(&detail_str).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_str),
    })
}

// ── Unit-of-work operations ─────────────────────────────────────────

async fn insert_prospect(conn: &Connection, p: &Prospect) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO prospects ({PROSPECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
        ),
        params![
            p.id.to_string(),
            p.full_name.as_str(),
            p.first_name.as_str(),
            p.last_name.as_str(),
            opt_text(p.title.as_deref()),
            opt_text(p.headline.as_deref()),
            p.role_type.as_str(),
            opt_text_owned(p.firm_id.map(|id| id.to_string())),
            p.profile_url.as_str(),
            opt_text(p.email.as_deref()),
            opt_integer(p.email_confidence.map(i64::from)),
            p.relevance_score,
            codec::encode("score_breakdown", &p.score_breakdown)?,
            opt_text(p.dossier.as_deref()),
            opt_text_owned(
                p.company_context
                    .as_ref()
                    .map(|ctx| codec::encode("company_context", ctx))
                    .transpose()?
            ),
            codec::encode("education", &p.education)?,
            codec::encode("experience", &p.experience)?,
            codec::encode("skills", &p.skills)?,
            p.status.as_str(),
            p.source.as_str(),
            opt_text_owned(p.hired_date.map(|d| d.format("%Y-%m-%d").to_string())),
            p.created_at.to_rfc3339(),
            p.updated_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| write_err("insert_prospect", e))?;
    Ok(())
}

async fn insert_draft(conn: &Connection, d: &OutreachDraft) -> Result<(), DatabaseError> {
    let (campaign_id, lead_id) = match &d.delivery {
        Some(ids) => (Some(ids.campaign_id.clone()), Some(ids.lead_id.clone())),
        None => (None, None),
    };
    conn.execute(
        &format!(
            "INSERT INTO outreach_drafts ({DRAFT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            d.id.to_string(),
            d.prospect_id.to_string(),
            d.channel.as_str(),
            d.sequence_step as i64,
            opt_text(d.subject.as_deref()),
            d.body.as_str(),
            opt_text(d.edited_body.as_deref()),
            d.approval.as_str(),
            opt_text_owned(d.approved_at.map(|t| t.to_rfc3339())),
            opt_text(d.rejection_reason.as_deref()),
            opt_text_owned(campaign_id),
            opt_text_owned(lead_id),
            opt_text_owned(d.sent_at.map(|t| t.to_rfc3339())),
            d.created_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| write_err("insert_draft", e))?;
    Ok(())
}

async fn append_activity(conn: &Connection, entry: &ActivityEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO activity_log (id, prospect_id, action, detail, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.id.to_string(),
            opt_text_owned(entry.prospect_id.map(|id| id.to_string())),
            entry.action.as_str(),
            entry.detail.to_string(),
            entry.created_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| write_err("append_activity", e))?;
    Ok(())
}

async fn apply_op(conn: &Connection, op: &WriteOp) -> Result<(), DatabaseError> {
    match op {
        WriteOp::InsertProspect(prospect) => insert_prospect(conn, prospect).await,
        WriteOp::InsertDraft(draft) => insert_draft(conn, draft).await,
        WriteOp::AppendActivity(entry) => append_activity(conn, entry).await,
        WriteOp::AdvanceProspect { id, from, to } => {
            if !from.can_transition_to(*to) {
                return Err(DatabaseError::Constraint(format!(
                    "illegal prospect transition {from} -> {to}"
                )));
            }
            let changed = conn
                .execute(
                    "UPDATE prospects SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                    params![to.as_str(), Utc::now().to_rfc3339(), id.to_string(), from.as_str()],
                )
                .await
                .map_err(|e| write_err("advance_prospect", e))?;
            if changed == 0 {
                debug!(prospect_id = %id, %from, %to, "Status already moved on, transition skipped");
            }
            Ok(())
        }
        WriteOp::OverrideStatus { id, from, to } => {
            if !from.can_transition_to(*to) {
                return Err(DatabaseError::Constraint(format!(
                    "illegal prospect transition {from} -> {to}"
                )));
            }
            let changed = conn
                .execute(
                    "UPDATE prospects SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                    params![to.as_str(), Utc::now().to_rfc3339(), id.to_string(), from.as_str()],
                )
                .await
                .map_err(|e| write_err("override_status", e))?;
            if changed == 0 {
                return Err(DatabaseError::Conflict {
                    entity: "prospect".into(),
                    id: id.to_string(),
                    reason: format!("status is no longer {from}"),
                });
            }
            Ok(())
        }
        WriteOp::DecideDraft { id, decision } => {
            let changed = match decision {
                Decision::Approve { at, edits } => conn
                    .execute(
                        "UPDATE outreach_drafts SET approval = 'approved', approved_at = ?1, subject = COALESCE(?2, subject), edited_body = ?3 WHERE id = ?4 AND approval = 'pending'",
                        params![
                            at.to_rfc3339(),
                            opt_text(edits.subject.as_deref()),
                            opt_text(edits.body.as_deref()),
                            id.to_string(),
                        ],
                    )
                    .await
                    .map_err(|e| write_err("decide_draft", e))?,
                Decision::Reject { reason } => conn
                    .execute(
                        "UPDATE outreach_drafts SET approval = 'rejected', rejection_reason = ?1 WHERE id = ?2 AND approval = 'pending'",
                        params![reason.as_str(), id.to_string()],
                    )
                    .await
                    .map_err(|e| write_err("decide_draft", e))?,
            };
            if changed == 0 {
                return Err(DatabaseError::Conflict {
                    entity: "outreach_draft".into(),
                    id: id.to_string(),
                    reason: "draft is not pending".into(),
                });
            }
            Ok(())
        }
        WriteOp::SetDelivery {
            draft_id,
            delivery,
            sent_at,
        } => {
            let changed = conn
                .execute(
                    "UPDATE outreach_drafts SET campaign_id = ?1, lead_id = ?2, sent_at = ?3 WHERE id = ?4",
                    params![
                        delivery.campaign_id.as_str(),
                        delivery.lead_id.as_str(),
                        sent_at.to_rfc3339(),
                        draft_id.to_string(),
                    ],
                )
                .await
                .map_err(|e| write_err("set_delivery", e))?;
            if changed == 0 {
                return Err(DatabaseError::not_found("outreach_draft", draft_id));
            }
            Ok(())
        }
        WriteOp::MarkSent { draft_id, sent_at } => {
            let changed = conn
                .execute(
                    "UPDATE outreach_drafts SET sent_at = ?1 WHERE id = ?2 AND approval = 'approved' AND sent_at IS NULL",
                    params![sent_at.to_rfc3339(), draft_id.to_string()],
                )
                .await
                .map_err(|e| write_err("mark_sent", e))?;
            if changed == 0 {
                return Err(DatabaseError::Conflict {
                    entity: "outreach_draft".into(),
                    id: draft_id.to_string(),
                    reason: "draft is not approved or was already sent".into(),
                });
            }
            Ok(())
        }
    }
}

// ── Trait implementation ────────────────────────────────────────────

const FIRM_COLUMNS: &str =
    "id, name, website, linkedin_url, aum, sectors, monitoring_enabled, created_at";

const PROSPECT_COLUMNS: &str = "id, full_name, first_name, last_name, title, headline, role_type, firm_id, profile_url, email, email_confidence, relevance_score, score_breakdown, dossier, company_context, education, experience, skills, status, source, hired_date, created_at, updated_at";

const DRAFT_COLUMNS: &str = "id, prospect_id, channel, sequence_step, subject, body, edited_body, approval, approved_at, rejection_reason, campaign_id, lead_id, sent_at, created_at";

impl LibSqlBackend {
    async fn query_firms(&self, sql: &str, ctx: &str) -> Result<Vec<Firm>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        let mut firms = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_firm(&row) {
                Ok(firm) => firms.push(firm),
                Err(e) => tracing::warn!("Skipping firm row: {e}"),
            }
        }
        Ok(firms)
    }

    async fn query_drafts(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
        ctx: &str,
    ) -> Result<Vec<OutreachDraft>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        let mut drafts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_draft(&row) {
                Ok(draft) => drafts.push(draft),
                Err(e) => tracing::warn!("Skipping draft row: {e}"),
            }
        }
        Ok(drafts)
    }

    async fn query_one_prospect(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
        ctx: &str,
    ) -> Result<Option<Prospect>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{ctx}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_prospect(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("{ctx} row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{ctx}: {e}"))),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        migrations::init_schema(&conn).await
    }

    // ── Firms ───────────────────────────────────────────────────────

    async fn insert_firm(&self, firm: &Firm) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn
            .execute(
                &format!("INSERT INTO firms ({FIRM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    firm.id.to_string(),
                    firm.name.as_str(),
                    opt_text(firm.website.as_deref()),
                    opt_text(firm.linkedin_url.as_deref()),
                    opt_text(firm.aum.as_deref()),
                    codec::encode("firm.sectors", &firm.sectors)?,
                    firm.monitoring_enabled as i64,
                    firm.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_err("insert_firm", e))?;
        Ok(())
    }

    async fn get_firm(&self, id: Uuid) -> Result<Option<Firm>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {FIRM_COLUMNS} FROM firms WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_firm: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_firm(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_firm row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_firm: {e}"))),
        }
    }

    async fn list_firms(&self) -> Result<Vec<Firm>, DatabaseError> {
        self.query_firms(
            &format!("SELECT {FIRM_COLUMNS} FROM firms ORDER BY created_at ASC, rowid ASC"),
            "list_firms",
        )
        .await
    }

    async fn list_monitored_firms(&self) -> Result<Vec<Firm>, DatabaseError> {
        self.query_firms(
            &format!(
                "SELECT {FIRM_COLUMNS} FROM firms WHERE monitoring_enabled = 1 ORDER BY created_at ASC, rowid ASC"
            ),
            "list_monitored_firms",
        )
        .await
    }

    async fn set_firm_monitoring(&self, id: Uuid, enabled: bool) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        let changed = conn
            .execute(
                "UPDATE firms SET monitoring_enabled = ?1 WHERE id = ?2",
                params![enabled as i64, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_firm_monitoring: {e}")))?;
        if changed == 0 {
            return Err(DatabaseError::not_found("firm", id));
        }
        Ok(())
    }

    // ── Prospects ───────────────────────────────────────────────────

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>, DatabaseError> {
        self.query_one_prospect(
            &format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE id = ?1"),
            params![id.to_string()],
            "get_prospect",
        )
        .await
    }

    async fn find_prospect_by_profile_url(
        &self,
        profile_url: &str,
    ) -> Result<Option<Prospect>, DatabaseError> {
        self.query_one_prospect(
            &format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE profile_url = ?1"),
            params![profile_url],
            "find_prospect_by_profile_url",
        )
        .await
    }

    async fn list_prospects_by_status(
        &self,
        status: ProspectStatus,
    ) -> Result<Vec<Prospect>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE status = ?1 ORDER BY created_at ASC"
                ),
                params![status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_prospects_by_status: {e}")))?;

        let mut prospects = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_prospect(&row) {
                Ok(p) => prospects.push(p),
                Err(e) => tracing::warn!("Skipping prospect row: {e}"),
            }
        }
        Ok(prospects)
    }

    // ── Drafts ──────────────────────────────────────────────────────

    async fn get_draft(&self, id: Uuid) -> Result<Option<OutreachDraft>, DatabaseError> {
        let drafts = self
            .query_drafts(
                &format!("SELECT {DRAFT_COLUMNS} FROM outreach_drafts WHERE id = ?1"),
                params![id.to_string()],
                "get_draft",
            )
            .await?;
        Ok(drafts.into_iter().next())
    }

    async fn list_drafts_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<OutreachDraft>, DatabaseError> {
        self.query_drafts(
            &format!(
                "SELECT {DRAFT_COLUMNS} FROM outreach_drafts WHERE prospect_id = ?1 ORDER BY sequence_step ASC, created_at ASC"
            ),
            params![prospect_id.to_string()],
            "list_drafts_for_prospect",
        )
        .await
    }

    async fn list_pending_drafts(&self) -> Result<Vec<OutreachDraft>, DatabaseError> {
        self.query_drafts(
            &format!(
                "SELECT {DRAFT_COLUMNS} FROM outreach_drafts WHERE approval = 'pending' ORDER BY created_at ASC"
            ),
            (),
            "list_pending_drafts",
        )
        .await
    }

    async fn list_approved_unsent(
        &self,
        channel: Channel,
    ) -> Result<Vec<OutreachDraft>, DatabaseError> {
        self.query_drafts(
            &format!(
                "SELECT {DRAFT_COLUMNS} FROM outreach_drafts WHERE approval = 'approved' AND sent_at IS NULL AND channel = ?1 ORDER BY approved_at ASC"
            ),
            params![channel.as_str()],
            "list_approved_unsent",
        )
        .await
    }

    async fn list_delivery_tracked(&self) -> Result<Vec<OutreachDraft>, DatabaseError> {
        self.query_drafts(
            &format!(
                "SELECT {DRAFT_COLUMNS} FROM outreach_drafts WHERE approval = 'approved' AND campaign_id IS NOT NULL AND lead_id IS NOT NULL ORDER BY prospect_id, sequence_step DESC"
            ),
            (),
            "list_delivery_tracked",
        )
        .await
    }

    // ── Activity ────────────────────────────────────────────────────

    async fn list_activity(
        &self,
        prospect_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, DatabaseError> {
        let sql = "SELECT id, prospect_id, action, detail, created_at FROM activity_log WHERE (?1 IS NULL OR prospect_id = ?1) ORDER BY created_at DESC, rowid DESC LIMIT ?2";
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                sql,
                params![opt_text_owned(prospect_id.map(|id| id.to_string())), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_activity: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_activity(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping activity row: {e}"),
            }
        }
        Ok(entries)
    }

    // ── Search queries ──────────────────────────────────────────────

    async fn get_search_query(
        &self,
        query_type: QueryType,
        target_id: &str,
    ) -> Result<Option<SearchQuery>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT query_type, target_id, result_count, last_run_at FROM search_queries WHERE query_type = ?1 AND target_id = ?2",
                params![query_type.as_str(), target_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_search_query: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let last_run: String = row
                    .get(3)
                    .map_err(|e| DatabaseError::Query(format!("get_search_query row parse: {e}")))?;
                Ok(Some(SearchQuery {
                    query_type: row.get::<String>(0).unwrap_or_default(),
                    target_id: row.get::<String>(1).unwrap_or_default(),
                    result_count: row.get::<i64>(2).unwrap_or(0),
                    last_run_at: parse_datetime(&last_run),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_search_query: {e}"))),
        }
    }

    async fn record_search_query(
        &self,
        query_type: QueryType,
        target_id: &str,
        result_count: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn
            .execute(
                "INSERT INTO search_queries (query_type, target_id, result_count, last_run_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(query_type, target_id) DO UPDATE SET result_count = excluded.result_count, last_run_at = excluded.last_run_at",
                params![query_type.as_str(), target_id, result_count, at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_search_query: {e}")))?;
        Ok(())
    }

    // ── Unit of work ────────────────────────────────────────────────

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<(), DatabaseError> {
        if ops.is_empty() {
            return Ok(());
        }
        let conn = self.conn().await;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin transaction: {e}")))?;

        for op in &ops {
            if let Err(e) = apply_op(&tx, op).await {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed: {rollback_err}");
                }
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;
        debug!(ops = ops.len(), "Unit of work committed");
        Ok(())
    }
}
