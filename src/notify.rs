//! Domain events and local notification delivery.
//!
//! Business logic publishes a [`DomainEvent`] to the [`Outbox`] after its
//! transaction commits. A dispatcher task drains the outbox into a
//! [`NotificationSink`]; sink failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Something a human may want to hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    NewLead {
        prospect_id: Uuid,
        name: String,
        title: Option<String>,
        score: f64,
    },
    DraftApproved {
        draft_id: Uuid,
        prospect_id: Uuid,
        name: String,
    },
    EmailSent {
        draft_id: Uuid,
        prospect_id: Uuid,
        name: String,
        step: u32,
    },
    DraftsNeedReview {
        count: usize,
    },
    ReplyReceived {
        prospect_id: Uuid,
        name: String,
    },
}

impl DomainEvent {
    pub fn title(&self) -> &'static str {
        match self {
            Self::NewLead { .. } => "New lead",
            Self::DraftApproved { .. } => "Draft approved",
            Self::EmailSent { .. } => "Email sent",
            Self::DraftsNeedReview { .. } => "Drafts need review",
            Self::ReplyReceived { .. } => "Reply received",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NewLead {
                name, title, score, ..
            } => match title {
                Some(title) => format!("{name} ({title}) scored {score:.2}"),
                None => format!("{name} scored {score:.2}"),
            },
            Self::DraftApproved { name, .. } => format!("Outreach to {name} approved"),
            Self::EmailSent { name, step, .. } => format!("Step {step} sent to {name}"),
            Self::DraftsNeedReview { count } => {
                format!("{count} draft(s) waiting for review")
            }
            Self::ReplyReceived { name, .. } => format!("{name} replied"),
        }
    }
}

/// Publishing side of the event queue. Cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<DomainEvent>,
}

impl Outbox {
    /// Create an outbox and the receiver the dispatcher drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an event without waiting. A full or closed queue drops it.
    pub fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("Notification dropped: {e}");
        }
    }
}

/// Fire-and-forget notification delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<(), std::io::Error>;
}

/// Writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<(), std::io::Error> {
        tracing::info!(title, "{message}");
        Ok(())
    }
}

/// macOS desktop banner via `osascript`; logs on other platforms.
pub struct DesktopNotifier;

#[async_trait]
impl NotificationSink for DesktopNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<(), std::io::Error> {
        if !cfg!(target_os = "macos") {
            return LogNotifier.notify(title, message).await;
        }
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(message),
            escape_applescript(title)
        );
        let status = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .status()
            .await?;
        if !status.success() {
            return Err(std::io::Error::other(format!("osascript exited with {status}")));
        }
        Ok(())
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Drain the outbox into `sink` until every publisher is dropped.
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<DomainEvent>,
    sink: Arc<dyn NotificationSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink.notify(event.title(), &event.message()).await {
                tracing::warn!(title = event.title(), "Notification failed: {e}");
            }
        }
        tracing::debug!("Notification dispatcher stopped");
    })
}
