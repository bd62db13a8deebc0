//! AI composition of outreach messages.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::prompts::{self, Sender};
use crate::error::LlmError;
use crate::llm::LlmProvider;

const EMAIL_MAX_TOKENS: u64 = 2048;
const LINKEDIN_MAX_TOKENS: u64 = 256;
const TEMPERATURE: f64 = 0.7;

/// Hard limit on connection request notes.
pub const LINKEDIN_NOTE_LIMIT: usize = 280;

static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SUBJECT:[ \t]*(.+)").expect("valid regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)BODY:[ \t]*\r?\n(.*)").expect("valid regex"));

/// A composed email.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedEmail {
    pub subject: String,
    pub body: String,
}

impl ComposedEmail {
    /// Context handed to the next step's prompt.
    pub fn as_previous(subject: Option<&str>, body: &str) -> String {
        format!("Subject: {}\n\n{}", subject.unwrap_or_default(), body)
    }
}

/// Split `SUBJECT:` / `BODY:` output. Without markers the whole text is the body.
pub fn parse_email_response(text: &str) -> ComposedEmail {
    let subject = SUBJECT_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    let body = BODY_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| text.trim().to_string());
    ComposedEmail { subject, body }
}

/// Cut a connection note to the platform limit.
pub fn fit_linkedin_note(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= LINKEDIN_NOTE_LIMIT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(LINKEDIN_NOTE_LIMIT - 3).collect();
    clipped.push_str("...");
    clipped
}

/// Writes outreach through the configured provider. Without a provider every
/// call fails with [`LlmError::MissingCredential`].
pub struct Composer {
    llm: Option<Arc<dyn LlmProvider>>,
    sender: Sender,
}

impl Composer {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, sender: Sender) -> Self {
        Self { llm, sender }
    }

    pub fn is_enabled(&self) -> bool {
        self.llm.is_some()
    }

    async fn generate(&self, prompt: &str, max_tokens: u64) -> Result<String, LlmError> {
        let llm = self.llm.as_ref().ok_or(LlmError::MissingCredential)?;
        let system = prompts::system_prompt(&self.sender);
        llm.generate(&system, prompt, max_tokens, TEMPERATURE).await
    }

    /// Compose email `step`; `previous` is the prior step's content.
    pub async fn compose_email(
        &self,
        dossier: &str,
        step: u32,
        previous: Option<&str>,
    ) -> Result<ComposedEmail, LlmError> {
        let prompt = prompts::email_prompt(step, dossier, previous, &self.sender);
        let text = self.generate(&prompt, EMAIL_MAX_TOKENS).await?;
        let email = parse_email_response(&text);
        tracing::info!(
            step,
            subject = %email.subject,
            chars = email.body.len(),
            "Composed email"
        );
        Ok(email)
    }

    pub async fn compose_linkedin_connection(&self, dossier: &str) -> Result<String, LlmError> {
        let prompt = prompts::linkedin_connection_prompt(dossier);
        let text = self.generate(&prompt, LINKEDIN_MAX_TOKENS).await?;
        Ok(fit_linkedin_note(&text))
    }

    pub async fn compose_linkedin_message(&self, dossier: &str) -> Result<String, LlmError> {
        let prompt = prompts::linkedin_message_prompt(dossier, &self.sender);
        let text = self.generate(&prompt, LINKEDIN_MAX_TOKENS).await?;
        Ok(text.trim().to_string())
    }
}
