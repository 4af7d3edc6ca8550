//! Append-only activity log.
//!
//! Every state-changing action (score, check, miss) appends one entry. The
//! append helper is generic over the executor so the scoring engine and
//! sweeper can call it inside their own transactions.

use sqlx::{Sqlite, SqlitePool};

use crate::error::CoreResult;
use crate::model::{new_id, now_ts, ActivityLogRow, LogAction};

/// Append one entry. `value` is the signed XP/coin/health delta applied.
pub async fn append<'e, E>(
    exec: E,
    owner_id: &str,
    task_id: &str,
    task_kind: &str,
    action: LogAction,
    value: i64,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO activity_log (id, owner_id, task_id, task_kind, action, value, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(owner_id)
    .bind(task_id)
    .bind(task_kind)
    .bind(action.as_str())
    .bind(value)
    .bind(now_ts())
    .execute(exec)
    .await?;
    Ok(())
}

/// Newest-first activity for a user, for statistics views.
pub async fn list(pool: &SqlitePool, owner_id: &str, limit: i64) -> CoreResult<Vec<ActivityLogRow>> {
    Ok(sqlx::query_as(
        "SELECT * FROM activity_log WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}
