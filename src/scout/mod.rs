//! Lead discovery: news, job and people sources feeding the enrichment
//! pipeline through the dedup gate.

pub mod dedup;
pub mod jobs;
pub mod news;
pub mod people;
pub mod pipeline;

pub use dedup::DedupGate;
pub use jobs::{JobMonitor, JobPosting};
pub use news::{FirmArticle, NewsMonitor};
pub use people::{DiscoveredPerson, PeopleSearch};
pub use pipeline::{EnrichmentPipeline, LeadHints, LeadIdentity, LeadOutcome, ScanSummary, Scout};
