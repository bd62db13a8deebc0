//! Error types for the prospect engine.

use std::time::Duration;

use uuid::Uuid;

use crate::prospects::model::ProspectStatus;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A conditional write found the row in a different state than expected.
    #[error("Conflicting write on {entity} {id}: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Undecodable stored value: {0}")]
    Decode(#[from] ParseError),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// True when the error came from a UNIQUE index rejecting the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Constraint(msg) if msg.contains("UNIQUE"))
    }
}

/// Errors from external collaborators (enrichment, email discovery,
/// scraping actors, delivery).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} rate limited after {attempts} retries: {path}")]
    RateLimited {
        service: String,
        path: String,
        attempts: u32,
    },

    #[error("{service} returned {status}: {body}")]
    Remote {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {reason}")]
    Http { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} is not configured (missing credential)")]
    MissingCredential { service: String },

    #[error("{service} job {run_id} cancelled")]
    Cancelled { service: String, run_id: String },

    #[error("{service} job {run_id} did not finish within {waited:?}")]
    TimedOut {
        service: String,
        run_id: String,
        waited: Duration,
    },

    #[error("{service} job {run_id} ended with status {status}")]
    JobFailed {
        service: String,
        run_id: String,
        status: String,
    },
}

/// AI generation errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("AI generation is not configured (missing credential)")]
    MissingCredential,
}

/// Draft lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("Draft {0} not found")]
    NotFound(Uuid),

    #[error("Prospect {0} not found")]
    ProspectNotFound(Uuid),

    #[error("Draft {id} was already {decision}")]
    AlreadyDecided { id: Uuid, decision: String },

    #[error("Draft {0} is not approved")]
    NotApproved(Uuid),

    #[error("Prospect {0} has no dossier to compose from")]
    MissingDossier(Uuid),

    #[error("Prospect {0} has no email address")]
    MissingEmail(Uuid),

    #[error("Draft {id} is on the {channel} channel")]
    WrongChannel { id: Uuid, channel: String },

    #[error("Step {step} of prospect {prospect_id} cannot be sent before step {} is delivered", .step - 1)]
    PriorStepUnsent { prospect_id: Uuid, step: u32 },

    #[error("A pending {channel} draft for step {step} already exists")]
    DuplicatePending { channel: String, step: u32 },
}

/// Administrative prospect status changes.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Prospect {0} not found")]
    ProspectNotFound(Uuid),

    #[error("Prospect {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: Uuid,
        from: ProspectStatus,
        to: ProspectStatus,
    },
}

/// Stored structured payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed {field}: {reason}")]
    Json { field: String, reason: String },

    #[error("Unsupported {field} record version {version}")]
    UnsupportedVersion { field: String, version: u64 },

    #[error("Unknown {field} tag '{value}'")]
    UnknownTag { field: String, value: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
