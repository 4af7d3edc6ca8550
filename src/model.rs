//! Core data model: users, the task tagged union, and activity log rows.
//!
//! All three task kinds live in one `tasks` table discriminated by `kind`;
//! kind-specific columns are simply unused by the other kinds. Timestamps are
//! unix epoch seconds.

use serde::{Deserialize, Serialize};

/// Generate a new UUID string for rows.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─── Enums ────────────────────────────────────────────────────────────────────

/// Task kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Habit,
    Daily,
    Todo,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Habit => "habit",
            TaskKind::Daily => "daily",
            TaskKind::Todo => "todo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "habit" => Some(TaskKind::Habit),
            "daily" => Some(TaskKind::Daily),
            "todo" => Some(TaskKind::Todo),
            _ => None,
        }
    }
}

/// Priority level driving reward/penalty magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Trivial,
    Easy,
    Medium,
    Hard,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Trivial => "trivial",
            Priority::Easy => "easy",
            Priority::Medium => "medium",
            Priority::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trivial" => Some(Priority::Trivial),
            "easy" => Some(Priority::Easy),
            "medium" => Some(Priority::Medium),
            "hard" => Some(Priority::Hard),
            _ => None,
        }
    }
}

/// Habit scoring direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Action recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    ScoredUp,
    ScoredDown,
    Completed,
    Uncompleted,
    Missed,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::ScoredUp => "scored_up",
            LogAction::ScoredDown => "scored_down",
            LogAction::Completed => "completed",
            LogAction::Uncompleted => "uncompleted",
            LogAction::Missed => "missed",
        }
    }
}

// ─── Weekday schedule ─────────────────────────────────────────────────────────

/// A Daily's weekday schedule: seven flags, index 0 = Sunday.
///
/// Persisted as a 7-char string of '0'/'1' so the array round-trips through
/// the database in index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekdays(pub [bool; 7]);

impl Weekdays {
    /// Every day active.
    pub fn all() -> Self {
        Weekdays([true; 7])
    }

    pub fn is_active(&self, weekday_idx: usize) -> bool {
        self.0.get(weekday_idx).copied().unwrap_or(false)
    }

    pub fn encode(&self) -> String {
        self.0.iter().map(|&b| if b { '1' } else { '0' }).collect()
    }

    pub fn decode(s: &str) -> Option<Self> {
        if s.len() != 7 {
            return None;
        }
        let mut days = [false; 7];
        for (i, c) in s.chars().enumerate() {
            days[i] = match c {
                '1' => true,
                '0' => false,
                _ => return None,
            };
        }
        Some(Weekdays(days))
    }
}

impl Default for Weekdays {
    fn default() -> Self {
        Weekdays::all()
    }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

/// A user's gamified attributes. Health is clamped to [0, max_health] on
/// every mutation; level is recomputed whenever experience changes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub experience: i64,
    pub coins: i64,
    pub health: i64,
    pub max_health: i64,
    pub level: i64,
    pub created_at: i64,
}

/// One task row. `kind` selects which of the variant field groups is live.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub title: String,
    pub notes: Option<String>,
    pub priority: String,
    pub position: i64,
    pub reminder_enabled: bool,
    pub reminder_at: Option<i64>,
    pub created_at: i64,
    // habit
    pub allows_up: bool,
    pub allows_down: bool,
    pub up_count: i64,
    pub down_count: i64,
    pub strength: i64,
    // daily
    pub completed: bool,
    pub streak: i64,
    pub active_weekdays: String,
    pub last_completed_at: Option<i64>,
    /// Date string of the last sweep that reset this Daily (idempotency marker).
    pub last_reset_on: Option<String>,
    // todo
    pub due_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TaskRow {
    pub fn task_kind(&self) -> Option<TaskKind> {
        TaskKind::parse(&self.kind)
    }

    pub fn weekdays(&self) -> Option<Weekdays> {
        Weekdays::decode(&self.active_weekdays)
    }
}

/// Append-only activity log entry; never mutated or deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogRow {
    pub id: String,
    pub owner_id: String,
    pub task_id: String,
    pub task_kind: String,
    pub action: String,
    pub value: i64,
    pub created_at: i64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
