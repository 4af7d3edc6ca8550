//! Scoring engine: the only write path for reward-bearing transitions.
//!
//! Each operation runs as one SQLite transaction — task mutation, user
//! mutation, and activity-log append commit together or roll back together.
//! Preconditions (existence, ownership, direction flags, current completion
//! state) are re-validated against current state inside the transaction, so
//! check calls are safe to retry; `score_habit` is inherently additive and
//! callers must dedupe retries at the transport layer.

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::activity;
use crate::error::{CoreError, CoreResult};
use crate::model::{now_ts, Direction, LogAction, Priority, TaskKind, TaskRow, UserRow};
use crate::rewards::{clamped_health, coin_share, level_for, magnitude};

/// Result of a score/check call: the updated task, the signed reward that
/// was applied, and the owner's updated attributes — enough for the caller
/// to render feedback without a second fetch.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub task: TaskRow,
    pub reward: i64,
    pub user: UserRow,
}

#[derive(Clone)]
pub struct ScoringEngine {
    pool: SqlitePool,
}

impl ScoringEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Score a habit up or down.
    ///
    /// A disabled direction is a true no-op: counters, user attributes, and
    /// the activity log are untouched, and the current state comes back with
    /// reward 0.
    pub async fn score_habit(
        &self,
        owner_id: &str,
        habit_id: &str,
        direction: Direction,
    ) -> CoreResult<ScoreOutcome> {
        let mut tx = self.pool.begin().await?;
        let task = fetch_kind(&mut tx, habit_id, TaskKind::Habit).await?;
        if task.owner_id != owner_id {
            return Err(CoreError::Forbidden);
        }

        let enabled = match direction {
            Direction::Up => task.allows_up,
            Direction::Down => task.allows_down,
        };
        if !enabled {
            let user = fetch_user(&mut tx, owner_id).await?;
            return Ok(ScoreOutcome { task, reward: 0, user });
        }

        let priority = parse_priority(&task.priority)?;
        let (reward, action) = match direction {
            Direction::Up => (magnitude(priority), LogAction::ScoredUp),
            Direction::Down => (-magnitude(priority), LogAction::ScoredDown),
        };

        match direction {
            Direction::Up => {
                sqlx::query(
                    "UPDATE tasks SET up_count = up_count + 1, strength = strength + 1 \
                     WHERE id = ?",
                )
                .bind(habit_id)
                .execute(&mut *tx)
                .await?;
            }
            Direction::Down => {
                sqlx::query(
                    "UPDATE tasks SET down_count = down_count + 1, strength = strength - 1 \
                     WHERE id = ?",
                )
                .bind(habit_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let user = fetch_user(&mut tx, owner_id).await?;
        let user = apply_reward(&mut tx, user, reward).await?;
        activity::append(&mut *tx, owner_id, habit_id, &task.kind, action, reward).await?;

        let task = refetch(&mut tx, habit_id).await?;
        tx.commit().await?;
        Ok(ScoreOutcome { task, reward, user })
    }

    /// Set a daily's completion flag.
    ///
    /// Idempotent: if the flag does not change, current state comes back
    /// with reward 0 and no log entry. Un-checking decrements the streak
    /// (floored at 0) but does not penalize health.
    pub async fn check_daily(
        &self,
        owner_id: &str,
        daily_id: &str,
        completed: bool,
    ) -> CoreResult<ScoreOutcome> {
        let mut tx = self.pool.begin().await?;
        let task = fetch_kind(&mut tx, daily_id, TaskKind::Daily).await?;
        if task.owner_id != owner_id {
            return Err(CoreError::Forbidden);
        }

        if task.completed == completed {
            let user = fetch_user(&mut tx, owner_id).await?;
            return Ok(ScoreOutcome { task, reward: 0, user });
        }

        let priority = parse_priority(&task.priority)?;
        let (reward, action, streak, last_completed_at) = if completed {
            (
                magnitude(priority),
                LogAction::Completed,
                task.streak + 1,
                Some(now_ts()),
            )
        } else {
            (
                0,
                LogAction::Uncompleted,
                (task.streak - 1).max(0),
                task.last_completed_at,
            )
        };

        sqlx::query("UPDATE tasks SET completed = ?, streak = ?, last_completed_at = ? WHERE id = ?")
            .bind(completed)
            .bind(streak)
            .bind(last_completed_at)
            .bind(daily_id)
            .execute(&mut *tx)
            .await?;

        let user = fetch_user(&mut tx, owner_id).await?;
        let user = apply_reward(&mut tx, user, reward).await?;
        activity::append(&mut *tx, owner_id, daily_id, &task.kind, action, reward).await?;

        let task = refetch(&mut tx, daily_id).await?;
        tx.commit().await?;
        Ok(ScoreOutcome { task, reward, user })
    }

    /// Set a todo's completion flag.
    ///
    /// Completion pays the reward once; un-checking clears `completed_at`
    /// without reversing the reward.
    pub async fn check_todo(
        &self,
        owner_id: &str,
        todo_id: &str,
        completed: bool,
    ) -> CoreResult<ScoreOutcome> {
        let mut tx = self.pool.begin().await?;
        let task = fetch_kind(&mut tx, todo_id, TaskKind::Todo).await?;
        if task.owner_id != owner_id {
            return Err(CoreError::Forbidden);
        }

        if task.completed == completed {
            let user = fetch_user(&mut tx, owner_id).await?;
            return Ok(ScoreOutcome { task, reward: 0, user });
        }

        let priority = parse_priority(&task.priority)?;
        let (reward, action, completed_at) = if completed {
            (magnitude(priority), LogAction::Completed, Some(now_ts()))
        } else {
            (0, LogAction::Uncompleted, None)
        };

        sqlx::query("UPDATE tasks SET completed = ?, completed_at = ? WHERE id = ?")
            .bind(completed)
            .bind(completed_at)
            .bind(todo_id)
            .execute(&mut *tx)
            .await?;

        let user = fetch_user(&mut tx, owner_id).await?;
        let user = apply_reward(&mut tx, user, reward).await?;
        activity::append(&mut *tx, owner_id, todo_id, &task.kind, action, reward).await?;

        let task = refetch(&mut tx, todo_id).await?;
        tx.commit().await?;
        Ok(ScoreOutcome { task, reward, user })
    }
}

// ─── Shared transaction steps ─────────────────────────────────────────────────

async fn fetch_kind(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    kind: TaskKind,
) -> CoreResult<TaskRow> {
    let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    // A wrong-kind id does not resolve for this operation.
    row.filter(|t| t.kind == kind.as_str())
        .ok_or_else(|| CoreError::NotFound(format!("{} {id}", kind.as_str())))
}

async fn refetch(tx: &mut Transaction<'_, Sqlite>, id: &str) -> CoreResult<TaskRow> {
    Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_one(&mut **tx)
        .await?)
}

async fn fetch_user(tx: &mut Transaction<'_, Sqlite>, id: &str) -> CoreResult<UserRow> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
}

/// Apply a signed reward to the user inside the caller's transaction.
///
/// Positive rewards credit experience and coins (and recompute level);
/// negative rewards subtract health, clamped to [0, max_health]. Zero is a
/// no-op.
pub(crate) async fn apply_reward(
    tx: &mut Transaction<'_, Sqlite>,
    mut user: UserRow,
    reward: i64,
) -> CoreResult<UserRow> {
    if reward > 0 {
        user.experience += reward;
        user.coins += coin_share(reward);
        user.level = level_for(user.experience);
        sqlx::query("UPDATE users SET experience = ?, coins = ?, level = ? WHERE id = ?")
            .bind(user.experience)
            .bind(user.coins)
            .bind(user.level)
            .bind(&user.id)
            .execute(&mut **tx)
            .await?;
    } else if reward < 0 {
        user.health = clamped_health(user.health, reward, user.max_health);
        sqlx::query("UPDATE users SET health = ? WHERE id = ?")
            .bind(user.health)
            .bind(&user.id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(user)
}

fn parse_priority(s: &str) -> CoreResult<Priority> {
    Priority::parse(s).ok_or_else(|| CoreError::Validation(format!("unknown priority {s}")))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::tasks::{NewHabit, TaskStore};

    async fn setup() -> (Storage, TaskStore, ScoringEngine, String) {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user(50).await.unwrap();
        let store = TaskStore::new(storage.pool());
        let engine = ScoringEngine::new(storage.pool());
        (storage, store, engine, user.id)
    }

    #[tokio::test]
    async fn score_missing_habit_is_not_found() {
        let (_s, _store, engine, owner) = setup().await;
        assert!(matches!(
            engine.score_habit(&owner, "nope", Direction::Up).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn score_foreign_habit_is_forbidden() {
        let (storage, store, engine, owner) = setup().await;
        let other = storage.create_user(50).await.unwrap();
        let h = store
            .create_habit(
                &owner,
                NewHabit {
                    title: "stretch".into(),
                    notes: None,
                    priority: Priority::Easy,
                    allows_up: true,
                    allows_down: true,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            engine.score_habit(&other.id, &h.id, Direction::Up).await,
            Err(CoreError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn disabled_direction_is_a_true_noop() {
        let (storage, store, engine, owner) = setup().await;
        let h = store
            .create_habit(
                &owner,
                NewHabit {
                    title: "no junk food".into(),
                    notes: None,
                    priority: Priority::Hard,
                    allows_up: false,
                    allows_down: true,
                },
            )
            .await
            .unwrap();

        let out = engine.score_habit(&owner, &h.id, Direction::Up).await.unwrap();
        assert_eq!(out.reward, 0);
        assert_eq!(out.task.up_count, 0);
        assert_eq!(out.task.strength, 0);
        assert_eq!(out.user.experience, 0);
        // nothing logged on a true no-op
        let log = crate::activity::list(&storage.pool(), &owner, 10).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn daily_id_does_not_resolve_as_habit() {
        let (_s, store, engine, owner) = setup().await;
        let d = store
            .create_daily(
                &owner,
                crate::tasks::NewDaily {
                    title: "journal".into(),
                    notes: None,
                    priority: Priority::Easy,
                    active_weekdays: crate::model::Weekdays::all(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            engine.score_habit(&owner, &d.id, Direction::Up).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
