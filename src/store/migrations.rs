//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS firms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                website TEXT,
                linkedin_url TEXT,
                aum TEXT,
                sectors TEXT,
                monitoring_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prospects (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                title TEXT,
                headline TEXT,
                role_type TEXT NOT NULL DEFAULT 'other',
                firm_id TEXT,
                profile_url TEXT NOT NULL UNIQUE,
                email TEXT,
                email_confidence INTEGER,
                relevance_score REAL NOT NULL DEFAULT 0,
                score_breakdown TEXT,
                dossier TEXT,
                company_context TEXT,
                education TEXT,
                experience TEXT,
                skills TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                source TEXT NOT NULL,
                hired_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_prospects_status ON prospects(status);

            CREATE TABLE IF NOT EXISTS outreach_drafts (
                id TEXT PRIMARY KEY,
                prospect_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                sequence_step INTEGER NOT NULL,
                subject TEXT,
                body TEXT NOT NULL,
                edited_body TEXT,
                approval TEXT NOT NULL DEFAULT 'pending',
                approved_at TEXT,
                rejection_reason TEXT,
                campaign_id TEXT,
                lead_id TEXT,
                sent_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_drafts_prospect ON outreach_drafts(prospect_id);
            CREATE INDEX IF NOT EXISTS idx_drafts_approval ON outreach_drafts(approval);

            CREATE TABLE IF NOT EXISTS activity_log (
                id TEXT PRIMARY KEY,
                prospect_id TEXT,
                action TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_prospect ON activity_log(prospect_id);

            CREATE TABLE IF NOT EXISTS search_queries (
                query_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                result_count INTEGER NOT NULL DEFAULT 0,
                last_run_at TEXT NOT NULL,
                PRIMARY KEY (query_type, target_id)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "single_pending_draft_per_step",
        sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_drafts_one_pending
                ON outreach_drafts(prospect_id, channel, sequence_step)
                WHERE approval = 'pending';
        "#,
    },
    Migration {
        version: 3,
        name: "activity_log_append_only",
        sql: r#"
            CREATE TRIGGER IF NOT EXISTS activity_log_no_update
                BEFORE UPDATE ON activity_log
                BEGIN SELECT RAISE(ABORT, 'activity_log is append-only'); END;
            CREATE TRIGGER IF NOT EXISTS activity_log_no_delete
                BEFORE DELETE ON activity_log
                BEGIN SELECT RAISE(ABORT, 'activity_log is append-only'); END;
        "#,
    },
];

/// Create the migrations table and apply everything newer than the stored version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

/// Entry point used by backends when opening a database.
pub async fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    run_migrations(conn).await
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
