// src/common/migrations.rs
//! Versioned schema migrations.
//!
//! Each step runs in its own transaction and records its version in
//! `schema_migrations`, so startup only applies what is missing.
//! Timestamps are UTC unix seconds.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How long a connection waits for another writer before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "payment_ledger",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS pending_payments (
                reference TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                amount INTEGER NOT NULL CHECK (amount > 0),
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                display_name TEXT NOT NULL
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_payments_requester ON pending_payments(requester_id)",
            "CREATE INDEX IF NOT EXISTS idx_pending_payments_expires ON pending_payments(expires_at)",
            r#"
            CREATE TABLE IF NOT EXISTS verified_payments (
                reference TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                verified_at INTEGER NOT NULL,
                display_name TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_verified_payments_requester ON verified_payments(requester_id, verified_at DESC)",
        ],
    },
    Migration {
        version: 2,
        name: "access_tokens",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS access_tokens (
                token TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                used INTEGER NOT NULL DEFAULT 0 CHECK (used IN (0, 1)),
                redeemed_at INTEGER
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_access_tokens_owner ON access_tokens(owner_id, used)",
        ],
    },
    Migration {
        version: 3,
        name: "join_records",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS join_records (
                member_id TEXT PRIMARY KEY,
                status TEXT NOT NULL CHECK (status IN ('pending', 'pre_approved', 'approved', 'declined')),
                decided_by TEXT,
                decided_at INTEGER,
                updated_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_join_records_status ON join_records(status, updated_at)",
        ],
    },
    Migration {
        version: 4,
        name: "system_settings",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS system_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                updated_by TEXT
            )
            "#],
    },
    Migration {
        version: 5,
        name: "access_token_claims",
        statements: &["ALTER TABLE access_tokens ADD COLUMN redeeming_at INTEGER"],
    },
];

/// Options for `database_url`: created on demand, WAL journal, bounded busy wait.
pub fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(tune(SqliteConnectOptions::from_str(database_url)?))
}

fn tune(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
}

/// Latest schema version this binary knows about
pub fn latest_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;

        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    info!(version = latest_version(), "Database schema is up to date");
    Ok(())
}

/// Highest applied migration version, 0 for a fresh database
pub async fn current_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (version,): (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Single-connection in-memory database with the full schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    run_migrations(&pool).await.expect("migrations apply");
    pool
}

/// File-backed database shared by `max_connections` connections, schema applied.
#[cfg(test)]
pub async fn file_pool(path: &std::path::Path, max_connections: u32) -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(tune(SqliteConnectOptions::new().filename(path)))
        .await
        .expect("file database");
    run_migrations(&pool).await.expect("migrations apply");
    pool
}
