//! Persistence layer: libSQL-backed storage for firms, prospects, drafts,
//! the activity log and dedup records.

pub mod codec;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, QueryType, SearchQuery, WriteOp};
