//! Per-user token usage, persisted in SQLite.
//!
//! Counters only grow until an administrator resets them; the assistant
//! compares them against a ceiling before each completion.


use herald_core::{error::HeraldError, shellexpand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Token usage table backed by SQLite.
#[derive(Clone)]
pub struct QuotaStore {
    pool: SqlitePool,
}

impl QuotaStore {
    /// Open (or create) the database at `db_path`, running migrations.
    pub async fn new(db_path: &str) -> Result<Self, HeraldError> {
        let db_path = shellexpand(db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HeraldError::Storage(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| HeraldError::Storage(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| HeraldError::Storage(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Quota store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), HeraldError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| HeraldError::Storage(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[(
            "001_token_usage",
            include_str!("../../migrations/001_token_usage.sql"),
        )];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        HeraldError::Storage(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| HeraldError::Storage(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    HeraldError::Storage(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }

    /// Tokens used so far by `user_id` (0 if never seen).
    pub async fn usage(&self, user_id: i64) -> Result<i64, HeraldError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT tokens FROM token_usage WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HeraldError::Storage(format!("query failed: {e}")))?;

        Ok(row.map(|(t,)| t).unwrap_or(0))
    }

    /// Add `tokens` to a user's counter. Returns the new total.
    pub async fn add_usage(&self, user_id: i64, tokens: i64) -> Result<i64, HeraldError> {
        let (total,): (i64,) = sqlx::query_as(
            "INSERT INTO token_usage (user_id, tokens) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET tokens = tokens + excluded.tokens, \
             updated_at = datetime('now') \
             RETURNING tokens",
        )
        .bind(user_id)
        .bind(tokens)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HeraldError::Storage(format!("upsert usage failed: {e}")))?;

        Ok(total)
    }

    /// Reset a user's counter to zero. Returns `false` if the user has no row.
    pub async fn reset(&self, user_id: i64) -> Result<bool, HeraldError> {
        let result = sqlx::query(
            "UPDATE token_usage SET tokens = 0, updated_at = datetime('now') WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HeraldError::Storage(format!("reset failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// All counters, highest usage first.
    pub async fn all(&self) -> Result<Vec<(i64, i64)>, HeraldError> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT user_id, tokens FROM token_usage ORDER BY tokens DESC, user_id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| HeraldError::Storage(format!("query failed: {e}")))?;

        Ok(rows)
    }
}
