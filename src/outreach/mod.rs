//! Outreach: composition, review, delivery and follow-up cadence.

pub mod composer;
pub mod drafts;
pub mod model;
pub mod prompts;
pub mod sender;
pub mod sequence;

pub use composer::Composer;
pub use drafts::{DraftStateMachine, ManualAction, ManualActionKind};
pub use model::{Approval, Channel, DraftEdits, OutreachDraft};
pub use sender::{ExternalSendAdapter, SendOutcome};
pub use sequence::{ProgressionSummary, SequenceScheduler, SequenceStatus, SyncSummary};
