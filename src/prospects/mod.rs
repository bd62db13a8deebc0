//! Prospects: data model, relevance scoring and research dossiers.

pub mod dossier;
pub mod model;
pub mod scoring;

pub use model::{Firm, LeadSource, Prospect, ProspectStatus, RoleType};
pub use scoring::ScoringEngine;
