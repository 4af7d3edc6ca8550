//! SQLite storage: pool construction, migrations, users, and settings.
//!
//! Task CRUD lives in [`crate::tasks::TaskStore`]; reward-bearing mutations
//! live in [`crate::scoring::ScoringEngine`] and [`crate::sweeper::Sweeper`].
//! All of them share this pool, so every multi-statement operation can run
//! as one SQLite transaction.

use anyhow::{Context as _, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::{path::Path, str::FromStr};

use crate::error::{CoreError, CoreResult};
use crate::model::{new_id, now_ts, UserRow};

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (or create) the on-disk database under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("habitd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. A single-connection pool so every
    /// handle sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("failed to run database migrations")?;
        Ok(())
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(&self, max_health: i64) -> CoreResult<UserRow> {
        if max_health <= 0 {
            return Err(CoreError::Validation(
                "max_health must be positive".into(),
            ));
        }
        let id = new_id();
        sqlx::query(
            "INSERT INTO users (id, experience, coins, health, max_health, level, created_at) \
             VALUES (?, 0, 0, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(max_health)
        .bind(max_health)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        self.get_user(&id).await
    }

    pub async fn get_user(&self, id: &str) -> CoreResult<UserRow> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
    }

    // ─── Settings ───────────────────────────────────────────────────────────

    pub async fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Delete activity log entries older than `days` days and return the
    /// count. Retention is an external concern; the core never calls this on
    /// its own. Pass `0` to skip pruning.
    pub async fn prune_activity(&self, days: u32) -> CoreResult<u64> {
        if days == 0 {
            return Ok(0);
        }
        let cutoff = now_ts() - i64::from(days) * 86_400;
        let n = sqlx::query("DELETE FROM activity_log WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(n)
    }

    /// Run SQLite VACUUM to reclaim disk space after pruning.
    pub async fn vacuum(&self) -> CoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
