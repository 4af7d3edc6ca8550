//! Daily reset sweeper.
//!
//! Once per day, at a fixed local boundary (midnight by default), every
//! Daily is re-evaluated against its weekday schedule: a due-but-uncompleted
//! Daily costs its owner health, and completion flags are reset for the next
//! cycle. The boundary closes the calendar day that just ended, so the sweep
//! triggered at midnight evaluates yesterday's schedule.
//!
//! Each Daily is swept in its own transaction (read, penalize, reset commit
//! together), and carries a `last_reset_on` date marker so re-triggering a
//! sweep for the same day never double-penalizes. The `sweep.last_run_on`
//! settings marker lets a restarted daemon catch up on a missed boundary.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::activity;
use crate::error::{CoreError, CoreResult};
use crate::model::{LogAction, Priority, TaskRow, UserRow};
use crate::rewards::magnitude;
use crate::scoring::apply_reward;
use crate::storage::Storage;

const LAST_RUN_KEY: &str = "sweep.last_run_on";

/// Counters from one sweep run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    /// Dailies reset for the next cycle.
    pub swept: u64,
    /// Subset of `swept` that were due and uncompleted (penalty applied).
    pub missed: u64,
    /// Dailies already swept for this date (or deleted mid-run).
    pub skipped: u64,
    /// Dailies whose sweep failed; logged and left for a re-trigger.
    pub failed: u64,
}

enum DailySweep {
    Reset,
    Missed,
    Skipped,
}

pub struct Sweeper {
    storage: Storage,
    reset_hour: u32,
    running: AtomicBool,
}

impl Sweeper {
    pub fn new(storage: Storage, reset_hour: u32) -> Self {
        Self {
            storage,
            reset_hour: reset_hour.min(23),
            running: AtomicBool::new(false),
        }
    }

    /// Background loop: catch up on a boundary missed while the daemon was
    /// down, then sleep until each next boundary and sweep the day it closes.
    pub async fn run_loop(self: Arc<Self>) {
        info!(reset_hour = self.reset_hour, "daily reset sweeper started");
        if let Err(e) = self.catch_up().await {
            warn!(err = %e, "sweep catch-up failed");
        }
        loop {
            let now = Local::now().naive_local();
            let boundary = next_boundary(now, self.reset_hour);
            let sleep_for = (boundary - now).to_std().unwrap_or_default();
            tokio::time::sleep(sleep_for).await;

            match self.sweep_once(eval_date(boundary)).await {
                Ok(stats) => {
                    info!(
                        swept = stats.swept,
                        missed = stats.missed,
                        failed = stats.failed,
                        "daily reset sweep finished"
                    );
                }
                Err(e) => warn!(err = %e, "daily reset sweep failed"),
            }
        }
    }

    /// Run a missed sweep after a restart. A fresh database just records the
    /// current boundary instead of penalizing days before install.
    pub async fn catch_up(&self) -> CoreResult<()> {
        let now = Local::now().naive_local();
        let expected = eval_date(prev_boundary(now, self.reset_hour));
        let expected_str = date_str(expected);
        match self.storage.get_setting(LAST_RUN_KEY).await? {
            None => {
                self.storage.set_setting(LAST_RUN_KEY, &expected_str).await?;
            }
            Some(last) if last != expected_str => {
                info!(last = %last, expected = %expected_str, "missed sweep boundary — catching up");
                self.sweep_once(expected).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Sweep the day closed by the most recent boundary. Used by the manual
    /// `sweep` command; safe alongside the background loop thanks to the
    /// overlap guard and per-day markers.
    pub async fn sweep_now(&self) -> CoreResult<SweepStats> {
        let now = Local::now().naive_local();
        self.sweep_once(eval_date(prev_boundary(now, self.reset_hour)))
            .await
    }

    /// Sweep every Daily for `date`. Safe to re-trigger for the same date.
    /// If a sweep is already in progress, this run is skipped and empty
    /// stats are returned.
    pub async fn sweep_once(&self, date: NaiveDate) -> CoreResult<SweepStats> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("sweep already in progress — skipping this trigger");
            return Ok(SweepStats::default());
        }
        let _running = RunningGuard(&self.running);

        let weekday = date.weekday().num_days_from_sunday() as usize;
        let date_str = date_str(date);
        let pool = self.storage.pool();

        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE kind = 'daily'")
            .fetch_all(&pool)
            .await?;

        let mut stats = SweepStats::default();
        for (id,) in ids {
            match self.sweep_daily(&id, &date_str, weekday).await {
                Ok(DailySweep::Missed) => {
                    stats.swept += 1;
                    stats.missed += 1;
                }
                Ok(DailySweep::Reset) => stats.swept += 1,
                Ok(DailySweep::Skipped) => stats.skipped += 1,
                Err(e) => {
                    warn!(task_id = %id, err = %e, "sweep failed for daily");
                    stats.failed += 1;
                }
            }
        }

        self.storage.set_setting(LAST_RUN_KEY, &date_str).await?;
        Ok(stats)
    }

    /// Read-penalize-reset for one Daily, atomically, so a concurrent check
    /// on the same Daily can never land a reward and a miss penalty for the
    /// same cycle.
    async fn sweep_daily(
        &self,
        id: &str,
        date_str: &str,
        weekday: usize,
    ) -> CoreResult<DailySweep> {
        let pool = self.storage.pool();
        let mut tx = pool.begin().await?;

        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let daily = match row {
            Some(d) => d,
            None => return Ok(DailySweep::Skipped), // deleted mid-sweep
        };
        if daily.last_reset_on.as_deref() == Some(date_str) {
            return Ok(DailySweep::Skipped);
        }

        let due = daily
            .weekdays()
            .map(|w| w.is_active(weekday))
            .unwrap_or(false);

        let mut missed = false;
        if due && !daily.completed {
            let priority = Priority::parse(&daily.priority).ok_or_else(|| {
                CoreError::Validation(format!("unknown priority {}", daily.priority))
            })?;
            let penalty = magnitude(priority);
            let owner: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
                .bind(&daily.owner_id)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(owner) = owner {
                apply_reward(&mut tx, owner, -penalty).await?;
                activity::append(
                    &mut *tx,
                    &daily.owner_id,
                    &daily.id,
                    &daily.kind,
                    LogAction::Missed,
                    -penalty,
                )
                .await?;
                missed = true;
            }
        }

        // Dailies not due on this date are reset too, so the next due day
        // starts fresh.
        sqlx::query("UPDATE tasks SET completed = 0, last_reset_on = ? WHERE id = ?")
            .bind(date_str)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(if missed {
            DailySweep::Missed
        } else {
            DailySweep::Reset
        })
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ─── Boundary arithmetic ──────────────────────────────────────────────────────

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn boundary_at(date: NaiveDate, reset_hour: u32) -> NaiveDateTime {
    date.and_hms_opt(reset_hour.min(23), 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// The next boundary strictly after `now`.
fn next_boundary(now: NaiveDateTime, reset_hour: u32) -> NaiveDateTime {
    let today = boundary_at(now.date(), reset_hour);
    if now < today {
        today
    } else {
        today + Duration::days(1)
    }
}

/// The most recent boundary at or before `now`.
fn prev_boundary(now: NaiveDateTime, reset_hour: u32) -> NaiveDateTime {
    let today = boundary_at(now.date(), reset_hour);
    if now >= today {
        today
    } else {
        today - Duration::days(1)
    }
}

/// The calendar day a boundary closes.
fn eval_date(boundary: NaiveDateTime) -> NaiveDate {
    boundary.date() - Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn boundary_arithmetic_at_midnight() {
        let now = dt("2026-08-30 14:00:00");
        assert_eq!(next_boundary(now, 0), dt("2026-08-31 00:00:00"));
        assert_eq!(prev_boundary(now, 0), dt("2026-08-30 00:00:00"));
        // midnight boundary on the 31st closes the 30th
        assert_eq!(
            eval_date(dt("2026-08-31 00:00:00")),
            NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
        );
    }

    #[test]
    fn boundary_arithmetic_with_late_reset_hour() {
        let now = dt("2026-08-30 02:00:00");
        assert_eq!(next_boundary(now, 4), dt("2026-08-30 04:00:00"));
        assert_eq!(prev_boundary(now, 4), dt("2026-08-29 04:00:00"));
    }
}
