//! Task store: CRUD for the three task variants plus manual reordering and
//! the reminder-window read used by an external dispatcher.
//!
//! Every read/write is keyed by the calling user; a task owned by someone
//! else is `Forbidden`. Direct edits here never touch counters, streaks,
//! completion flags, or user attributes — those mutate only through the
//! scoring engine and the sweeper.

use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::model::{new_id, now_ts, Priority, TaskKind, TaskRow, Weekdays};

// ─── Create params ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewHabit {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Priority,
    pub allows_up: bool,
    pub allows_down: bool,
}

#[derive(Debug, Clone)]
pub struct NewDaily {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Priority,
    pub active_weekdays: Weekdays,
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Priority,
    pub due_at: Option<i64>,
}

/// Non-reward edit. `None` fields are left unchanged; for the nullable
/// columns, `Some(None)` clears the stored value. Kind-specific fields
/// applied to the wrong kind are a validation error.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub reminder_enabled: Option<bool>,
    pub reminder_at: Option<Option<i64>>,
    // habit
    pub allows_up: Option<bool>,
    pub allows_down: Option<bool>,
    // daily
    pub active_weekdays: Option<Weekdays>,
    // todo
    pub due_at: Option<Option<i64>>,
}

impl TaskPatch {
    fn touches_habit(&self) -> bool {
        self.allows_up.is_some() || self.allows_down.is_some()
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Create ─────────────────────────────────────────────────────────────

    pub async fn create_habit(&self, owner_id: &str, new: NewHabit) -> CoreResult<TaskRow> {
        validate_title(&new.title)?;
        if !new.allows_up && !new.allows_down {
            return Err(CoreError::Validation(
                "habit must allow at least one scoring direction".into(),
            ));
        }
        self.insert(owner_id, TaskKind::Habit, &new.title, new.notes.as_deref(), new.priority, |q| {
            q.push_habit(new.allows_up, new.allows_down)
        })
        .await
    }

    pub async fn create_daily(&self, owner_id: &str, new: NewDaily) -> CoreResult<TaskRow> {
        validate_title(&new.title)?;
        self.insert(owner_id, TaskKind::Daily, &new.title, new.notes.as_deref(), new.priority, |q| {
            q.push_daily(new.active_weekdays)
        })
        .await
    }

    pub async fn create_todo(&self, owner_id: &str, new: NewTodo) -> CoreResult<TaskRow> {
        validate_title(&new.title)?;
        self.insert(owner_id, TaskKind::Todo, &new.title, new.notes.as_deref(), new.priority, |q| {
            q.push_todo(new.due_at)
        })
        .await
    }

    /// Shared insert path: verifies the owner exists, assigns the next
    /// position for (owner, kind), and writes the variant columns.
    async fn insert(
        &self,
        owner_id: &str,
        kind: TaskKind,
        title: &str,
        notes: Option<&str>,
        priority: Priority,
        variant: impl FnOnce(VariantCols) -> VariantCols,
    ) -> CoreResult<TaskRow> {
        let cols = variant(VariantCols::default());
        let mut tx = self.pool.begin().await?;

        let owner_exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner_exists.is_none() {
            return Err(CoreError::NotFound(format!("user {owner_id}")));
        }

        let (position,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM tasks WHERE owner_id = ? AND kind = ?",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let id = new_id();
        sqlx::query(
            "INSERT INTO tasks \
             (id, owner_id, kind, title, notes, priority, position, created_at, \
              allows_up, allows_down, active_weekdays, due_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(title)
        .bind(notes)
        .bind(priority.as_str())
        .bind(position)
        .bind(now_ts())
        .bind(cols.allows_up)
        .bind(cols.allows_down)
        .bind(cols.active_weekdays.encode())
        .bind(cols.due_at)
        .execute(&mut *tx)
        .await?;

        let row = fetch_required(&mut tx, &id).await?;
        tx.commit().await?;
        Ok(row)
    }

    // ─── Read ───────────────────────────────────────────────────────────────

    /// Fetch a task, enforcing ownership.
    pub async fn get(&self, owner_id: &str, id: &str) -> CoreResult<TaskRow> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| CoreError::NotFound(format!("task {id}")))?;
        if row.owner_id != owner_id {
            return Err(CoreError::Forbidden);
        }
        Ok(row)
    }

    /// A user's tasks of one kind, in manual order.
    pub async fn list(&self, owner_id: &str, kind: TaskKind) -> CoreResult<Vec<TaskRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tasks WHERE owner_id = ? AND kind = ? \
             ORDER BY position ASC, created_at ASC",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Tasks with an enabled reminder falling in `[from, until)`, for the
    /// external reminder dispatcher. The core does not send notifications.
    pub async fn reminders_between(&self, from: i64, until: i64) -> CoreResult<Vec<TaskRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tasks \
             WHERE reminder_enabled = 1 AND reminder_at >= ? AND reminder_at < ? \
             ORDER BY reminder_at ASC",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?)
    }

    // ─── Update / delete ────────────────────────────────────────────────────

    /// Apply a non-reward edit. Enforces the habit direction invariant: a
    /// patch may never leave both directions disabled.
    pub async fn update(&self, owner_id: &str, id: &str, patch: TaskPatch) -> CoreResult<TaskRow> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let mut tx = self.pool.begin().await?;
        let current = fetch_required(&mut tx, id).await?;
        if current.owner_id != owner_id {
            return Err(CoreError::Forbidden);
        }

        let kind = current
            .task_kind()
            .ok_or_else(|| CoreError::Validation(format!("unknown task kind {}", current.kind)))?;
        if patch.touches_habit() && kind != TaskKind::Habit {
            return Err(CoreError::Validation(
                "scoring directions apply only to habits".into(),
            ));
        }
        if patch.active_weekdays.is_some() && kind != TaskKind::Daily {
            return Err(CoreError::Validation(
                "weekday schedules apply only to dailies".into(),
            ));
        }
        if patch.due_at.is_some() && kind != TaskKind::Todo {
            return Err(CoreError::Validation(
                "due dates apply only to todos".into(),
            ));
        }

        let allows_up = patch.allows_up.unwrap_or(current.allows_up);
        let allows_down = patch.allows_down.unwrap_or(current.allows_down);
        if kind == TaskKind::Habit && !allows_up && !allows_down {
            return Err(CoreError::InvalidTransition(
                "cannot disable both scoring directions".into(),
            ));
        }

        let title = patch.title.unwrap_or(current.title);
        let notes = patch.notes.unwrap_or(current.notes);
        let priority = patch
            .priority
            .map(|p| p.as_str().to_string())
            .unwrap_or(current.priority);
        let reminder_enabled = patch.reminder_enabled.unwrap_or(current.reminder_enabled);
        let reminder_at = patch.reminder_at.unwrap_or(current.reminder_at);
        let active_weekdays = patch
            .active_weekdays
            .map(|w| w.encode())
            .unwrap_or(current.active_weekdays);
        let due_at = patch.due_at.unwrap_or(current.due_at);

        sqlx::query(
            "UPDATE tasks SET title = ?, notes = ?, priority = ?, reminder_enabled = ?, \
             reminder_at = ?, allows_up = ?, allows_down = ?, active_weekdays = ?, due_at = ? \
             WHERE id = ?",
        )
        .bind(&title)
        .bind(&notes)
        .bind(&priority)
        .bind(reminder_enabled)
        .bind(reminder_at)
        .bind(allows_up)
        .bind(allows_down)
        .bind(&active_weekdays)
        .bind(due_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row = fetch_required(&mut tx, id).await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> CoreResult<()> {
        // Ownership check first so a foreign id reports Forbidden, not success.
        self.get(owner_id, id).await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rewrite `position` for a user's tasks of one kind to match the given
    /// id sequence. Every task of (owner, kind) must appear exactly once;
    /// a duplicate, missing, or foreign id rolls the whole reorder back.
    pub async fn reorder(&self, owner_id: &str, kind: TaskKind, ids: &[String]) -> CoreResult<()> {
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(CoreError::Validation(format!("duplicate id {id}")));
            }
        }

        let mut tx = self.pool.begin().await?;
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE owner_id = ? AND kind = ?")
                .bind(owner_id)
                .bind(kind.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if count != ids.len() as i64 {
            return Err(CoreError::Validation(format!(
                "reorder must list all {count} {} tasks, got {}",
                kind.as_str(),
                ids.len()
            )));
        }
        for (i, id) in ids.iter().enumerate() {
            let n = sqlx::query(
                "UPDATE tasks SET position = ? WHERE id = ? AND owner_id = ? AND kind = ?",
            )
            .bind((i + 1) as i64)
            .bind(id)
            .bind(owner_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if n == 0 {
                return Err(CoreError::NotFound(format!("task {id}")));
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn validate_title(title: &str) -> CoreResult<()> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation("title must not be empty".into()));
    }
    Ok(())
}

async fn fetch_required(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
) -> CoreResult<TaskRow> {
    sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {id}")))
}

/// Variant column values for the shared insert path. Defaults are the
/// schema defaults; each kind overrides its own group.
struct VariantCols {
    allows_up: bool,
    allows_down: bool,
    active_weekdays: Weekdays,
    due_at: Option<i64>,
}

impl Default for VariantCols {
    fn default() -> Self {
        Self {
            allows_up: true,
            allows_down: true,
            active_weekdays: Weekdays::all(),
            due_at: None,
        }
    }
}

impl VariantCols {
    fn push_habit(mut self, allows_up: bool, allows_down: bool) -> Self {
        self.allows_up = allows_up;
        self.allows_down = allows_down;
        self
    }

    fn push_daily(mut self, weekdays: Weekdays) -> Self {
        self.active_weekdays = weekdays;
        self
    }

    fn push_todo(mut self, due_at: Option<i64>) -> Self {
        self.due_at = due_at;
        self
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn setup() -> (Storage, TaskStore, String) {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user(50).await.unwrap();
        let store = TaskStore::new(storage.pool());
        (storage, store, user.id)
    }

    fn habit(title: &str) -> NewHabit {
        NewHabit {
            title: title.into(),
            notes: None,
            priority: Priority::Medium,
            allows_up: true,
            allows_down: true,
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_positions_per_kind() {
        let (_s, store, owner) = setup().await;
        let h1 = store.create_habit(&owner, habit("a")).await.unwrap();
        let h2 = store.create_habit(&owner, habit("b")).await.unwrap();
        let d1 = store
            .create_daily(
                &owner,
                NewDaily {
                    title: "c".into(),
                    notes: None,
                    priority: Priority::Easy,
                    active_weekdays: Weekdays::all(),
                },
            )
            .await
            .unwrap();
        assert_eq!(h1.position, 1);
        assert_eq!(h2.position, 2);
        // positions are per (owner, kind)
        assert_eq!(d1.position, 1);
    }

    #[tokio::test]
    async fn weekday_schedule_round_trips() {
        let (_s, store, owner) = setup().await;
        let days = Weekdays([true, false, true, false, true, false, true]);
        let daily = store
            .create_daily(
                &owner,
                NewDaily {
                    title: "water plants".into(),
                    notes: None,
                    priority: Priority::Easy,
                    active_weekdays: days,
                },
            )
            .await
            .unwrap();
        let fetched = store.get(&owner, &daily.id).await.unwrap();
        assert_eq!(fetched.weekdays(), Some(days));
    }

    #[tokio::test]
    async fn get_enforces_ownership() {
        let (storage, store, owner) = setup().await;
        let other = storage.create_user(50).await.unwrap();
        let h = store.create_habit(&owner, habit("x")).await.unwrap();
        assert!(matches!(
            store.get(&other.id, &h.id).await,
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(
            store.get(&owner, "missing").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_cannot_disable_both_directions() {
        let (_s, store, owner) = setup().await;
        let h = store.create_habit(&owner, habit("x")).await.unwrap();
        let ok = store
            .update(
                &owner,
                &h.id,
                TaskPatch {
                    allows_down: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(ok.allows_up && !ok.allows_down);

        let err = store
            .update(
                &owner,
                &h.id,
                TaskPatch {
                    allows_up: Some(false),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(err, Err(CoreError::InvalidTransition(_))));
        // state untouched by the rejected patch
        let after = store.get(&owner, &h.id).await.unwrap();
        assert!(after.allows_up);
    }

    #[tokio::test]
    async fn create_habit_rejects_both_directions_disabled() {
        let (_s, store, owner) = setup().await;
        let err = store
            .create_habit(
                &owner,
                NewHabit {
                    title: "x".into(),
                    notes: None,
                    priority: Priority::Easy,
                    allows_up: false,
                    allows_down: false,
                },
            )
            .await;
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn update_rejects_wrong_kind_fields() {
        let (_s, store, owner) = setup().await;
        let h = store.create_habit(&owner, habit("x")).await.unwrap();
        let err = store
            .update(
                &owner,
                &h.id,
                TaskPatch {
                    due_at: Some(Some(123)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn reorder_rewrites_positions() {
        let (_s, store, owner) = setup().await;
        let a = store.create_habit(&owner, habit("a")).await.unwrap();
        let b = store.create_habit(&owner, habit("b")).await.unwrap();
        let c = store.create_habit(&owner, habit("c")).await.unwrap();

        store
            .reorder(
                &owner,
                TaskKind::Habit,
                &[c.id.clone(), a.id.clone(), b.id.clone()],
            )
            .await
            .unwrap();

        let listed = store.list(&owner, TaskKind::Habit).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn reorder_with_foreign_id_rolls_back() {
        let (storage, store, owner) = setup().await;
        let other = storage.create_user(50).await.unwrap();
        let a = store.create_habit(&owner, habit("a")).await.unwrap();
        store.create_habit(&owner, habit("b")).await.unwrap();
        let foreign = store.create_habit(&other.id, habit("f")).await.unwrap();

        let err = store
            .reorder(&owner, TaskKind::Habit, &[foreign.id.clone(), a.id.clone()])
            .await;
        assert!(matches!(err, Err(CoreError::NotFound(_))));
        // original order untouched
        let after = store.get(&owner, &a.id).await.unwrap();
        assert_eq!(after.position, 1);
    }

    #[tokio::test]
    async fn reorder_rejects_duplicate_and_partial_id_lists() {
        let (_s, store, owner) = setup().await;
        let a = store.create_habit(&owner, habit("a")).await.unwrap();
        let b = store.create_habit(&owner, habit("b")).await.unwrap();

        let dup = store
            .reorder(&owner, TaskKind::Habit, &[a.id.clone(), a.id.clone()])
            .await;
        assert!(matches!(dup, Err(CoreError::Validation(_))));

        let partial = store.reorder(&owner, TaskKind::Habit, &[b.id.clone()]).await;
        assert!(matches!(partial, Err(CoreError::Validation(_))));

        // order untouched by the rejected calls
        let listed = store.list(&owner, TaskKind::Habit).await.unwrap();
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
    }

    #[tokio::test]
    async fn patch_clears_nullable_fields() {
        let (_s, store, owner) = setup().await;
        let t = store
            .create_todo(
                &owner,
                NewTodo {
                    title: "call dentist".into(),
                    notes: Some("ask about invoice".into()),
                    priority: Priority::Easy,
                    due_at: Some(5_000),
                },
            )
            .await
            .unwrap();
        store
            .update(
                &owner,
                &t.id,
                TaskPatch {
                    reminder_enabled: Some(true),
                    reminder_at: Some(Some(4_000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let cleared = store
            .update(
                &owner,
                &t.id,
                TaskPatch {
                    notes: Some(None),
                    due_at: Some(None),
                    reminder_enabled: Some(false),
                    reminder_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.notes, None);
        assert_eq!(cleared.due_at, None);
        assert!(!cleared.reminder_enabled);
        assert_eq!(cleared.reminder_at, None);
        assert!(store.reminders_between(0, 10_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reminders_window_query() {
        let (_s, store, owner) = setup().await;
        let t = store
            .create_todo(
                &owner,
                NewTodo {
                    title: "call dentist".into(),
                    notes: None,
                    priority: Priority::Easy,
                    due_at: None,
                },
            )
            .await
            .unwrap();
        store
            .update(
                &owner,
                &t.id,
                TaskPatch {
                    reminder_enabled: Some(true),
                    reminder_at: Some(Some(1_000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let hits = store.reminders_between(900, 1_100).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, t.id);
        assert!(store.reminders_between(1_001, 2_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_task() {
        let (_s, store, owner) = setup().await;
        let h = store.create_habit(&owner, habit("x")).await.unwrap();
        store.delete(&owner, &h.id).await.unwrap();
        assert!(matches!(
            store.get(&owner, &h.id).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
