//! Outreach draft model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of steps in the email cadence.
pub const MAX_SEQUENCE_STEPS: u32 = 4;

/// Outreach channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Sent automatically through the delivery service.
    Email,
    /// Sent by a human out-of-band and confirmed with "mark sent".
    LinkedinManual,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::LinkedinManual => "linkedin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "linkedin" => Some(Self::LinkedinManual),
            _ => None,
        }
    }

    pub fn is_automatable(&self) -> bool {
        matches!(self, Self::Email)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval tri-state. Decided exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    Pending,
    Approved,
    Rejected,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// External campaign and lead references from the delivery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryIds {
    pub campaign_id: String,
    pub lead_id: String,
}

/// An AI-drafted outreach message awaiting or past human review.
#[derive(Debug, Clone, PartialEq)]
pub struct OutreachDraft {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub channel: Channel,
    pub sequence_step: u32,
    pub subject: Option<String>,
    pub body: String,
    /// Human edit; wins over `body` when sending.
    pub edited_body: Option<String>,
    pub approval: Approval,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub delivery: Option<DeliveryIds>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutreachDraft {
    pub fn pending(
        prospect_id: Uuid,
        channel: Channel,
        sequence_step: u32,
        subject: Option<String>,
        body: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prospect_id,
            channel,
            sequence_step,
            subject,
            body,
            edited_body: None,
            approval: Approval::Pending,
            approved_at: None,
            rejection_reason: None,
            delivery: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Carry delivery ids forward so a later send reuses the campaign.
    pub fn with_delivery(mut self, delivery: Option<DeliveryIds>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Body to send: the human edit if present.
    pub fn effective_body(&self) -> &str {
        self.edited_body.as_deref().unwrap_or(&self.body)
    }
}

/// Optional reviewer edits supplied with an approval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftEdits {
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// How a pending draft is being decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve {
        at: DateTime<Utc>,
        edits: DraftEdits,
    },
    Reject {
        reason: String,
    },
}

impl Decision {
    pub fn approval(&self) -> Approval {
        match self {
            Self::Approve { .. } => Approval::Approved,
            Self::Reject { .. } => Approval::Rejected,
        }
    }
}
