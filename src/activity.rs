//! Append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    AutoDiscovered,
    DraftCreated,
    DraftApproved,
    DraftRejected,
    DraftRegenerated,
    FollowupComposed,
    EmailSent,
    LinkedinConnectionSent,
    LinkedinMessageSent,
    ReplyReceived,
    StatusChanged,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoDiscovered => "auto_discovered",
            Self::DraftCreated => "draft_created",
            Self::DraftApproved => "draft_approved",
            Self::DraftRejected => "draft_rejected",
            Self::DraftRegenerated => "draft_regenerated",
            Self::FollowupComposed => "followup_composed",
            Self::EmailSent => "email_sent",
            Self::LinkedinConnectionSent => "linkedin_connection_sent",
            Self::LinkedinMessageSent => "linkedin_message_sent",
            Self::ReplyReceived => "reply_received",
            Self::StatusChanged => "status_changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "auto_discovered" => Self::AutoDiscovered,
            "draft_created" => Self::DraftCreated,
            "draft_approved" => Self::DraftApproved,
            "draft_rejected" => Self::DraftRejected,
            "draft_regenerated" => Self::DraftRegenerated,
            "followup_composed" => Self::FollowupComposed,
            "email_sent" => Self::EmailSent,
            "linkedin_connection_sent" => Self::LinkedinConnectionSent,
            "linkedin_message_sent" => Self::LinkedinMessageSent,
            "reply_received" => Self::ReplyReceived,
            "status_changed" => Self::StatusChanged,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub prospect_id: Option<Uuid>,
    pub action: ActivityAction,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(prospect_id: Option<Uuid>, action: ActivityAction, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            prospect_id,
            action,
            detail,
            created_at: Utc::now(),
        }
    }

    pub fn for_prospect(prospect_id: Uuid, action: ActivityAction, detail: serde_json::Value) -> Self {
        Self::new(Some(prospect_id), action, detail)
    }
}
